use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Url;

use crate::payload::ImagePayload;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("description service responded with status {0}")]
    Status(u16),
    #[error("failed to read response body: {0}")]
    Body(String),
    #[error("failed to serialise request: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl TransportError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Network failures, timeouts, 5xx and 429 are retried. Every other status
    /// and any local failure is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Timeout(_) | TransportError::Connect(_) | TransportError::Body(_) => {
                true
            }
            TransportError::Status(status) => *status >= 500 || *status == 429,
            TransportError::Serialize(_)
            | TransportError::InvalidEndpoint(_)
            | TransportError::Client(_) => false,
        }
    }
}

/// Delivers an image to the description service and returns the audio bytes.
pub trait DescriptionTransport: Send + Sync {
    fn post(&self, payload: &ImagePayload) -> Result<Vec<u8>, TransportError>;
}

/// JSON-over-HTTP transport with a per-attempt timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, TransportError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|err| TransportError::InvalidEndpoint(format!("{endpoint}: {err}")))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TransportError::Client(err.to_string()))?;
        Ok(Self {
            http,
            endpoint,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn classify(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else {
            TransportError::Connect(err.to_string())
        }
    }
}

impl DescriptionTransport for HttpTransport {
    fn post(&self, payload: &ImagePayload) -> Result<Vec<u8>, TransportError> {
        let body = payload.to_json()?;
        let response = self
            .http
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "audio/mpeg")
            .body(body)
            .send()
            .map_err(|err| self.classify(err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        let audio = response.bytes().map_err(|err| {
            if err.is_timeout() {
                TransportError::Timeout(self.timeout)
            } else {
                TransportError::Body(err.to_string())
            }
        })?;
        tracing::debug!(url = %self.endpoint, status = status.as_u16(), bytes = audio.len(), "description received");
        Ok(audio.to_vec())
    }
}
