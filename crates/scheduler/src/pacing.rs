use std::time::{Duration, Instant};

/// Whether a frame may be accepted `elapsed` after the previous one.
pub fn frame_due(elapsed: Duration, interval: Duration) -> bool {
    elapsed >= interval
}

/// Throttles a fast tick source down to a target frame rate.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Duration,
    last_accepted: Option<Instant>,
}

impl FramePacer {
    /// `target_fps` must be positive; the caller validates it.
    pub fn new(target_fps: f32) -> Self {
        Self {
            interval: Duration::from_secs_f64(1.0 / f64::from(target_fps)),
            last_accepted: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Accepts the tick at `now` if the interval has elapsed, recording it as
    /// the latest accepted frame. The first tick is always accepted.
    pub fn try_accept(&mut self, now: Instant) -> bool {
        let due = match self.last_accepted {
            Some(last) => frame_due(now.saturating_duration_since(last), self.interval),
            None => true,
        };
        if due {
            self.last_accepted = Some(now);
        }
        due
    }

    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}
