//! Error types for the catalog and streaming-availability collaborators.
//!
//! Every failure a surface can observe is classified into one of these kinds.
//! Classification decides two things: whether the coordinator retries, and
//! which human-readable message is attached once the request settles failed.

#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("request timed out")]
    Timeout,
    #[error("network unreachable: {0}")]
    Network(String),
    #[error("rate limited by upstream")]
    RateLimited,
    #[error("resource not found")]
    NotFound,
    #[error("unauthorized (check API key)")]
    Unauthorized,
    #[error("upstream server error ({status})")]
    Server { status: u16 },
    #[error("unexpected status ({status})")]
    Status { status: u16 },
    /// Superseded by a newer request or torn down. Never surfaced to callers.
    #[error("request cancelled")]
    Cancelled,
    /// Rejected locally before anything was sent.
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("failed to parse response from {url}: {message}")]
    ParseFailed {
        status: u16,
        url: String,
        message: String,
    },
}

impl ApiError {
    /// Classify an HTTP status code. Returns `None` for success codes.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            401 => Some(Self::Unauthorized),
            404 => Some(Self::NotFound),
            429 => Some(Self::RateLimited),
            500..=599 => Some(Self::Server { status }),
            _ => Some(Self::Status { status }),
        }
    }

    /// Classify a transport-level reqwest error.
    ///
    /// Request URLs carry the API key as a query parameter, so the query is
    /// stripped from anything kept on the error.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        if let Some(status) = err.status()
            && let Some(classified) = Self::from_status(status.as_u16())
        {
            return classified;
        }
        if err.is_decode() {
            let url = err
                .url()
                .map(|u| {
                    let mut u = u.clone();
                    u.set_query(None);
                    u.to_string()
                })
                .unwrap_or_default();
            return Self::ParseFailed {
                status: 0,
                url,
                message: err.without_url().to_string(),
            };
        }
        Self::Network(err.without_url().to_string())
    }

    /// Transient kinds are retried by the coordinator; the rest settle immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Network(_) | Self::RateLimited | Self::Server { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The HTTP status behind this error, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited => Some(429),
            Self::NotFound => Some(404),
            Self::Unauthorized => Some(401),
            Self::Server { status } | Self::Status { status } => Some(*status),
            Self::ParseFailed { status, .. } if *status != 0 => Some(*status),
            _ => None,
        }
    }

    /// Message shown to the user once a request has settled failed.
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout => "Request timeout. Please check your internet connection.".to_owned(),
            Self::Network(_) => "Network error. Please check your internet connection.".to_owned(),
            Self::Unauthorized => "Invalid API key. Please check your configuration.".to_owned(),
            Self::NotFound => "Requested resource not found.".to_owned(),
            Self::RateLimited => "Too many requests. Please try again later.".to_owned(),
            Self::Server { status: 503 } => {
                "Service unavailable. Please try again later.".to_owned()
            }
            Self::Server { status: 500 } => "Server error. Please try again later.".to_owned(),
            Self::Server { status } | Self::Status { status } => {
                format!("An error occurred ({status})")
            }
            Self::Cancelled => "Request cancelled.".to_owned(),
            Self::Validation(reason) => reason.clone(),
            Self::ParseFailed { .. } => "Received an unexpected response.".to_owned(),
        }
    }
}

/// Error details a surface exposes once a request has settled failed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ErrorInfo {
    pub message: String,
    pub status: Option<u16>,
    pub retryable: bool,
}

impl From<&ApiError> for ErrorInfo {
    fn from(err: &ApiError) -> Self {
        Self {
            message: err.user_message(),
            status: err.status(),
            retryable: err.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(ApiError::from_status(200).is_none());
        assert!(matches!(ApiError::from_status(401), Some(ApiError::Unauthorized)));
        assert!(matches!(ApiError::from_status(404), Some(ApiError::NotFound)));
        assert!(matches!(ApiError::from_status(429), Some(ApiError::RateLimited)));
        assert!(matches!(
            ApiError::from_status(502),
            Some(ApiError::Server { status: 502 })
        ));
        assert!(matches!(
            ApiError::from_status(418),
            Some(ApiError::Status { status: 418 })
        ));
    }

    #[test]
    fn retryable_kinds() {
        assert!(ApiError::Timeout.is_retryable());
        assert!(ApiError::Network("reset".into()).is_retryable());
        assert!(ApiError::RateLimited.is_retryable());
        assert!(ApiError::Server { status: 500 }.is_retryable());

        assert!(!ApiError::NotFound.is_retryable());
        assert!(!ApiError::Unauthorized.is_retryable());
        assert!(!ApiError::Cancelled.is_retryable());
        assert!(!ApiError::Validation("empty".into()).is_retryable());
        assert!(!ApiError::Status { status: 400 }.is_retryable());
    }

    #[test]
    fn user_messages_match_status() {
        assert_eq!(
            ApiError::Unauthorized.user_message(),
            "Invalid API key. Please check your configuration."
        );
        assert_eq!(
            ApiError::Server { status: 503 }.user_message(),
            "Service unavailable. Please try again later."
        );
        assert_eq!(
            ApiError::Status { status: 418 }.user_message(),
            "An error occurred (418)"
        );
    }

    #[test]
    fn error_info_carries_status() {
        let info = ErrorInfo::from(&ApiError::NotFound);
        assert_eq!(info.status, Some(404));
        assert!(!info.retryable);
        assert_eq!(info.message, "Requested resource not found.");
    }
}
