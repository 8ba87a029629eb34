use std::sync::Mutex;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use shiftconfig::DescribeSettings;

use crate::payload::ImagePayload;
use crate::transport::{DescriptionTransport, TransportError};

/// Fixed-delay retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts made after the first one fails.
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&DescribeSettings::default())
    }
}

impl From<&DescribeSettings> for RetryPolicy {
    fn from(settings: &DescribeSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            delay: settings.retry_delay,
        }
    }
}

/// Owner side of a cancellation signal.
#[derive(Debug)]
pub struct Canceller {
    sender: Mutex<Option<Sender<()>>>,
}

impl Canceller {
    /// Wakes every sleeping token. Idempotent.
    pub fn cancel(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }
}

/// Observer side: sleeps that end early once the [`Canceller`] fires.
#[derive(Debug, Clone)]
pub struct CancelToken {
    receiver: Receiver<()>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.receiver.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleeps for `duration`. Returns `false` if cancelled before it elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        match self.receiver.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => true,
            Err(RecvTimeoutError::Disconnected) | Ok(()) => false,
        }
    }
}

pub fn cancellation() -> (Canceller, CancelToken) {
    let (sender, receiver) = crossbeam_channel::bounded(0);
    (
        Canceller {
            sender: Mutex::new(Some(sender)),
        },
        CancelToken { receiver },
    )
}

#[derive(Debug)]
pub struct Delivery {
    pub audio: Vec<u8>,
    pub attempts: u32,
}

#[derive(Debug)]
pub enum RetryFailure {
    /// The last attempt failed, or the failure was not retryable.
    Exhausted { attempts: u32, error: TransportError },
    /// Shut down while waiting to retry.
    Cancelled { attempts: u32 },
}

/// Posts `payload`, retrying retryable failures up to the policy's budget.
pub fn send_with_retry<T>(
    transport: &T,
    payload: &ImagePayload,
    policy: &RetryPolicy,
    cancel: &CancelToken,
) -> Result<Delivery, RetryFailure>
where
    T: DescriptionTransport + ?Sized,
{
    let max_attempts = policy.max_attempts();
    let mut attempts = 0;
    loop {
        attempts += 1;
        tracing::info!(attempt = attempts, max_attempts, "requesting description");
        let error = match transport.post(payload) {
            Ok(audio) => return Ok(Delivery { audio, attempts }),
            Err(error) => error,
        };

        let retryable = error.is_retryable();
        tracing::warn!(
            attempt = attempts,
            max_attempts,
            retryable,
            error = %error,
            "description attempt failed"
        );
        if !retryable || attempts >= max_attempts {
            return Err(RetryFailure::Exhausted { attempts, error });
        }
        if !cancel.sleep(policy.delay) {
            tracing::info!(attempt = attempts, "description retry cancelled");
            return Err(RetryFailure::Cancelled { attempts });
        }
    }
}
