use std::time::Instant;

/// One decoded camera frame in tightly packed RGBA8.
#[derive(Clone, Debug)]
pub struct VideoFrame {
    /// RGBA pixel data, `width * height * 4` bytes, rows top to bottom.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic frame counter assigned by the source.
    pub sequence: u64,
    pub captured_at: Instant,
}

impl VideoFrame {
    /// Wraps raw RGBA bytes. Returns `None` when the buffer length does not
    /// match the dimensions.
    pub fn from_rgba(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Option<Self> {
        let expected = (width as usize) * (height as usize) * 4;
        if data.len() != expected {
            return None;
        }
        Some(Self {
            data,
            width,
            height,
            sequence,
            captured_at: Instant::now(),
        })
    }

    /// Frame filled with a single colour.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(pixels * 4);
        for _ in 0..pixels {
            data.extend_from_slice(&rgba);
        }
        Self {
            data,
            width,
            height,
            sequence: 0,
            captured_at: Instant::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// RGBA value at `(x, y)`, clamped to the frame edges.
    pub fn pixel(&self, x: i64, y: i64) -> [u8; 4] {
        if self.is_empty() {
            return [0, 0, 0, 0];
        }
        let x = x.clamp(0, i64::from(self.width) - 1) as usize;
        let y = y.clamp(0, i64::from(self.height) - 1) as usize;
        let idx = (y * self.width as usize + x) * 4;
        [
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ]
    }

    /// Nearest-neighbour downscale so the frame fits within `max_width`x`max_height`,
    /// preserving aspect ratio. Frames already within bounds are returned unchanged.
    pub fn fit_within(self, max_width: u32, max_height: u32) -> Self {
        if max_width == 0 || max_height == 0 {
            return self;
        }
        if self.width <= max_width && self.height <= max_height {
            return self;
        }

        let scale = f64::min(
            f64::from(max_width) / f64::from(self.width),
            f64::from(max_height) / f64::from(self.height),
        );
        let target_width = ((f64::from(self.width) * scale).floor() as u32).max(1);
        let target_height = ((f64::from(self.height) * scale).floor() as u32).max(1);

        let mut output = vec![0u8; (target_width as usize) * (target_height as usize) * 4];
        let x_ratio = self.width as f32 / target_width as f32;
        let y_ratio = self.height as f32 / target_height as f32;

        for y in 0..target_height {
            for x in 0..target_width {
                let src_x = ((x as f32 * x_ratio) as u32).min(self.width - 1);
                let src_y = ((y as f32 * y_ratio) as u32).min(self.height - 1);
                let src_idx = ((src_y * self.width + src_x) * 4) as usize;
                let dst_idx = ((y * target_width + x) * 4) as usize;
                output[dst_idx..dst_idx + 4].copy_from_slice(&self.data[src_idx..src_idx + 4]);
            }
        }

        Self {
            data: output,
            width: target_width,
            height: target_height,
            sequence: self.sequence,
            captured_at: self.captured_at,
        }
    }
}
