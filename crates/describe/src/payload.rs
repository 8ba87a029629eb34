use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use camera::VideoFrame;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use serde::Serialize;

const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("frame has no pixels")]
    EmptyFrame,
    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
    #[error("JPEG quality {0} is outside 1..=100")]
    Quality(u8),
    #[error("failed to encode JPEG: {0}")]
    Jpeg(#[from] image::ImageError),
}

/// A still frame encoded for the description service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    data_url: String,
    width: u32,
    height: u32,
}

impl ImagePayload {
    /// Encodes the raw RGBA frame as a JPEG data URL. Alpha is discarded.
    pub fn from_frame(frame: &VideoFrame, quality: u8) -> Result<Self, EncodeError> {
        if frame.is_empty() {
            return Err(EncodeError::EmptyFrame);
        }
        if !(1..=100).contains(&quality) {
            return Err(EncodeError::Quality(quality));
        }
        let expected = (frame.width as usize) * (frame.height as usize) * 4;
        if frame.data.len() != expected {
            return Err(EncodeError::BufferSize {
                expected,
                actual: frame.data.len(),
            });
        }

        let rgb: Vec<u8> = frame
            .data
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();

        let mut jpeg = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut jpeg, quality).encode(
            &rgb,
            frame.width,
            frame.height,
            ExtendedColorType::Rgb8,
        )?;
        let jpeg = jpeg.into_inner();

        let mut data_url = String::with_capacity(DATA_URL_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
        data_url.push_str(DATA_URL_PREFIX);
        STANDARD.encode_string(&jpeg, &mut data_url);

        tracing::debug!(
            width = frame.width,
            height = frame.height,
            jpeg_bytes = jpeg.len(),
            "encoded frame for description"
        );
        Ok(Self {
            data_url,
            width: frame.width,
            height: frame.height,
        })
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// JSON request body: `{"image": "<data url>"}`.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&RequestBody {
            image: &self.data_url,
        })
    }
}

#[derive(Serialize)]
struct RequestBody<'a> {
    image: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> VideoFrame {
        let mut data = Vec::new();
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x * 16) as u8, (y * 16) as u8, 128, 255]);
            }
        }
        VideoFrame::from_rgba(data, width, height, 0).unwrap()
    }

    #[test]
    fn encodes_decodable_jpeg_data_url() {
        let payload = ImagePayload::from_frame(&gradient(16, 8), 80).unwrap();
        let encoded = payload
            .data_url()
            .strip_prefix("data:image/jpeg;base64,")
            .expect("jpeg data url");
        let bytes = STANDARD.decode(encoded).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8], "JPEG SOI marker");
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
        assert_eq!(payload.dimensions(), (16, 8));
    }

    #[test]
    fn json_body_has_single_image_field() {
        let payload = ImagePayload::from_frame(&gradient(4, 4), 80).unwrap();
        let body: serde_json::Value = serde_json::from_slice(&payload.to_json().unwrap()).unwrap();
        let object = body.as_object().unwrap();
        assert_eq!(object.len(), 1);
        assert_eq!(object["image"].as_str(), Some(payload.data_url()));
    }

    #[test]
    fn rejects_empty_and_malformed_frames() {
        let empty = VideoFrame::solid(0, 0, [0; 4]);
        assert!(matches!(
            ImagePayload::from_frame(&empty, 80),
            Err(EncodeError::EmptyFrame)
        ));
        let mut short = VideoFrame::solid(2, 2, [0; 4]);
        short.data.pop();
        assert!(matches!(
            ImagePayload::from_frame(&short, 80),
            Err(EncodeError::BufferSize { .. })
        ));
        assert!(matches!(
            ImagePayload::from_frame(&gradient(2, 2), 0),
            Err(EncodeError::Quality(0))
        ));
    }
}
