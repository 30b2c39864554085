//! Error types shared across the sync core.
//!
//! DESIGN
//! ======
//! One `thiserror` enum per concern. Every enum implements [`ErrorCode`] so
//! notices and logs carry a stable, grepable code. Backend failures never
//! escape the session; they are logged or turned into a [`crate::Notice`].

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code and retryable flag for structured notices.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// OBJECT
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("field `{field}` of object {id} is immutable")]
    ImmutableField { id: String, field: &'static str },
    #[error("patch does not fit object {id}: {reason}")]
    InvalidPatch { id: String, reason: String },
}

impl ErrorCode for ObjectError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ImmutableField { .. } => "E_IMMUTABLE_FIELD",
            Self::InvalidPatch { .. } => "E_INVALID_PATCH",
        }
    }
}

// =============================================================================
// API
// =============================================================================

/// Errors produced by backend calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request could not be sent or timed out.
    #[error("API request failed: {0}")]
    Request(String),

    /// The backend returned a non-success HTTP status.
    #[error("API response error: status {status}")]
    Status { status: u16, body: String },

    /// The envelope said `success: false`.
    #[error("API rejected request: {0}")]
    Rejected(String),

    /// The response body was not the expected shape.
    #[error("API response parse failed: {0}")]
    Parse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The configured base URL cannot have path segments appended.
    #[error("invalid API base URL: {0}")]
    InvalidBaseUrl(String),
}

impl ErrorCode for ApiError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Request(_) => "E_API_REQUEST",
            Self::Status { .. } => "E_API_STATUS",
            Self::Rejected(_) => "E_API_REJECTED",
            Self::Parse(_) => "E_API_PARSE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
            Self::InvalidBaseUrl(_) => "E_API_BASE_URL",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Status { status: 429 | 500..=599, .. })
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket connect failed: {0}")]
    Connect(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("transport closed")]
    Closed,
}

impl ErrorCode for TransportError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Connect(_) => "E_WS_CONNECT",
            Self::Closed => "E_TRANSPORT_CLOSED",
        }
    }

    fn retryable(&self) -> bool {
        true
    }
}

// =============================================================================
// SESSION
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session task has stopped; no further commands are accepted.
    #[error("whiteboard session closed")]
    Closed,
}

impl ErrorCode for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Closed => "E_SESSION_CLOSED",
        }
    }
}

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Invalid { .. } => "E_CONFIG_INVALID",
        }
    }
}
