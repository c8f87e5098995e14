//! Errors raised at the HTTP boundary.

use reqwest::StatusCode;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("not authorized: {message}")]
    Unauthorized { message: String },

    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("server returned {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("failed to decode {context}: {source}")]
    Decode {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl ApiError {
    /// Maps a failed response onto the taxonomy, keeping the server's message.
    pub fn from_status(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unauthorized { message },
            StatusCode::NOT_FOUND => Self::NotFound { message },
            _ => Self::Status { status, message },
        }
    }

    /// Human-readable text suitable for a transient notification.
    pub fn message(&self) -> String {
        match self {
            Self::Unauthorized { message }
            | Self::NotFound { message }
            | Self::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED),
            Self::NotFound { .. } => Some(StatusCode::NOT_FOUND),
            Self::Status { status, .. } => Some(*status),
            Self::Http(err) => err.status(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::ApiError;

    #[test]
    fn status_codes_map_to_variants() {
        assert!(ApiError::from_status(StatusCode::UNAUTHORIZED, "x".into()).is_unauthorized());
        assert!(ApiError::from_status(StatusCode::FORBIDDEN, "x".into()).is_unauthorized());
        assert!(matches!(
            ApiError::from_status(StatusCode::NOT_FOUND, "gone".into()),
            ApiError::NotFound { .. }
        ));
        let err = ApiError::from_status(StatusCode::BAD_REQUEST, "Title is required".into());
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(err.message(), "Title is required");
    }
}
