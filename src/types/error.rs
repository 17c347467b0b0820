//! Error types for Cadence
//!
//! Persistence failures are fatal to the operation that hit them. Mail and
//! push failures are transient: callers log them and carry on.

use hyper::StatusCode;

/// Main error type for Cadence operations
#[derive(Debug, thiserror::Error)]
pub enum CadenceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Mail delivery failed: {0}")]
    Mail(String),

    #[error("Live push failed: {0}")]
    Push(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CadenceError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Mail(_) => StatusCode::BAD_GATEWAY,
            Self::Push(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::WebSocket(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable kind for JSON error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Mail(_) | Self::Push(_) => "transient_dependency_failure",
            Self::Database(_) | Self::Conflict(_) => "persistence_failure",
            Self::WebSocket(_) => "websocket",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether this is a dependency failure that callers absorb
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Mail(_) | Self::Push(_))
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (status, body.to_string())
    }
}

impl From<std::io::Error> for CadenceError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for CadenceError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for CadenceError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for CadenceError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(err.to_string())
    }
}

impl From<mongodb::error::Error> for CadenceError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<reqwest::Error> for CadenceError {
    fn from(err: reqwest::Error) -> Self {
        Self::Mail(err.to_string())
    }
}

/// Result type alias for Cadence operations
pub type Result<T> = std::result::Result<T, CadenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(CadenceError::Mail("smtp down".into()).is_transient());
        assert!(CadenceError::Push("socket closed".into()).is_transient());
        assert!(!CadenceError::Database("timeout".into()).is_transient());
        assert!(!CadenceError::NotFound("schedule".into()).is_transient());
    }

    #[test]
    fn test_error_body() {
        let (status, body) = CadenceError::NotFound("no schedule".into()).into_status_code_and_body();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("\"error\":\"not_found\""));
        assert!(body.contains("no schedule"));
    }
}
