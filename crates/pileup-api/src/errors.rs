//! Error types for the Pileup HTTP client.

use serde::Deserialize;

/// Failures of a snapshot read or the registration write.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ApiError {
    /// The identifier is already waiting in the queue.
    #[error("already in queue: {0}")]
    Duplicate(String),

    /// The queue is at capacity.
    #[error("queue full: {0}")]
    QueueFull(String),

    /// The operator has the system switched off.
    #[error("system inactive: {0}")]
    SystemInactive(String),

    /// Any other 4xx rejection.
    #[error("rejected ({status}): {detail}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Server-provided detail text.
        detail: String,
    },

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// 5xx response.
    #[error("server error ({status}): {detail}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Server-provided detail text.
        detail: String,
    },

    /// Connection-level failure before a response arrived.
    #[error("network error: {0}")]
    Network(String),

    /// The request exceeded the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The response body did not match the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

impl ApiError {
    /// Classify a non-success response from its status and raw body.
    ///
    /// FastAPI wraps messages as `{"detail": "..."}`; validation failures
    /// carry a list under `detail` instead, which is kept as JSON text.
    pub fn from_response(status: u16, body: &str) -> Self {
        let detail = match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody {
                detail: serde_json::Value::String(s),
            }) => s,
            Ok(ErrorBody { detail }) => detail.to_string(),
            Err(_) => body.trim().to_string(),
        };
        let lowered = detail.to_lowercase();

        match status {
            404 => Self::NotFound(detail),
            408 | 504 => Self::Timeout,
            500..=599 => Self::Server { status, detail },
            _ if lowered.contains("already in queue") => Self::Duplicate(detail),
            _ if lowered.contains("queue is full") => Self::QueueFull(detail),
            _ if lowered.contains("not active") || lowered.contains("inactive") => {
                Self::SystemInactive(detail)
            }
            _ => Self::Rejected { status, detail },
        }
    }

    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout | Self::Server { .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn duplicate_detail() {
        let err = ApiError::from_response(400, r#"{"detail":"Callsign already in queue"}"#);
        assert_matches!(err, ApiError::Duplicate(ref d) if d == "Callsign already in queue");
    }

    #[test]
    fn queue_full_detail() {
        let err =
            ApiError::from_response(400, r#"{"detail":"Queue is full. Maximum queue size is 4"}"#);
        assert_matches!(err, ApiError::QueueFull(_));
    }

    #[test]
    fn inactive_detail() {
        let err = ApiError::from_response(403, r#"{"detail":"System is not active"}"#);
        assert_matches!(err, ApiError::SystemInactive(_));
    }

    #[test]
    fn other_rejection_keeps_status() {
        let err = ApiError::from_response(400, r#"{"detail":"Callsign is required"}"#);
        assert_matches!(err, ApiError::Rejected { status: 400, ref detail } if detail == "Callsign is required");
    }

    #[test]
    fn validation_list_detail_is_stringified() {
        let err = ApiError::from_response(422, r#"{"detail":[{"loc":["body","callsign"]}]}"#);
        assert_matches!(err, ApiError::Rejected { status: 422, ref detail } if detail.contains("callsign"));
    }

    #[test]
    fn server_error_plain_body() {
        let err = ApiError::from_response(500, "Internal Server Error");
        assert_matches!(err, ApiError::Server { status: 500, ref detail } if detail == "Internal Server Error");
        assert!(err.is_transient());
    }

    #[test]
    fn not_found() {
        let err = ApiError::from_response(404, r#"{"detail":"Callsign not found in queue"}"#);
        assert_matches!(err, ApiError::NotFound(_));
        assert!(!err.is_transient());
    }
}
