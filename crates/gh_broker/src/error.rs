use std::fmt;

use http::StatusCode;

/// Terminal non-success status returned by GitHub after retries were exhausted
/// or ruled out.
#[derive(Debug)]
pub struct HttpStatusError {
    pub status: StatusCode,
    pub endpoint: String,
}

impl HttpStatusError {
    pub fn new(status: StatusCode, endpoint: impl Into<String>) -> Self {
        Self {
            status,
            endpoint: endpoint.into(),
        }
    }

    /// 4xx responses other than 403/429 never succeed on retry.
    pub fn is_retryable(&self) -> bool {
        !self.status.is_client_error()
            || self.status == StatusCode::FORBIDDEN
            || self.status == StatusCode::TOO_MANY_REQUESTS
    }
}

impl fmt::Display for HttpStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.endpoint.is_empty() {
            write!(f, "unexpected status {}", self.status)
        } else {
            write!(f, "unexpected status {} for {}", self.status, self.endpoint)
        }
    }
}

impl std::error::Error for HttpStatusError {}
