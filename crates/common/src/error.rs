use std::fmt;

/// Classification of embedding provider failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingErrorKind {
    /// Missing or rejected credentials
    Auth,
    /// Provider throttled the request
    RateLimit,
    /// Transport failure (connect, timeout, reset)
    Network,
    /// Provider-side 5xx failure
    Server,
    /// Provider rejected the payload
    InvalidRequest,
    /// Provider answered with something we cannot use
    InvalidResponse,
    /// Caller cancelled the operation
    Cancelled,
    /// Anything else
    Unknown,
}

impl EncodingErrorKind {
    /// Whether a retry with backoff may succeed
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimit | Self::Network | Self::Server)
    }

    /// Classify an HTTP status code returned by a provider
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            400..=499 => Self::InvalidRequest,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for EncodingErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auth => "auth",
            Self::RateLimit => "rate_limit",
            Self::Network => "network",
            Self::Server => "server",
            Self::InvalidRequest => "invalid_request",
            Self::InvalidResponse => "invalid_response",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Englishy error types
#[derive(Debug, thiserror::Error)]
pub enum EnglishyError {
    /// Input file does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input file extension is not one of csv/json/txt
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Malformed input content
    #[error("Parse error: {0}")]
    Parse(String),

    /// Embedding provider failure
    #[error("Encoding error ({kind}): {message}")]
    Encoding {
        kind: EncodingErrorKind,
        message: String,
    },

    /// Chunk/vector counts or vector dimensions disagree
    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        context: String,
    },

    /// Operation needs a built or loaded index
    #[error("Index not ready: {0}")]
    IndexNotReady(String),

    /// Persisted companion files disagree with each other
    #[error("Index corrupt: {0}")]
    IndexCorrupt(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General error (anyhow integration)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EnglishyError {
    /// Create not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create unsupported format error
    pub fn unsupported_format<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedFormat(msg.into())
    }

    /// Create parse error
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse(msg.into())
    }

    /// Create encoding error
    pub fn encoding<S: Into<String>>(kind: EncodingErrorKind, msg: S) -> Self {
        Self::Encoding {
            kind,
            message: msg.into(),
        }
    }

    /// Create dimension mismatch error
    pub fn dimension_mismatch<S: Into<String>>(expected: usize, actual: usize, context: S) -> Self {
        Self::DimensionMismatch {
            expected,
            actual,
            context: context.into(),
        }
    }

    /// Create index not ready error
    pub fn index_not_ready<S: Into<String>>(msg: S) -> Self {
        Self::IndexNotReady(msg.into())
    }

    /// Create index corrupt error
    pub fn index_corrupt<S: Into<String>>(msg: S) -> Self {
        Self::IndexCorrupt(msg.into())
    }

    /// Create config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Encoding failure kind, if this is an encoding error
    pub fn encoding_kind(&self) -> Option<EncodingErrorKind> {
        match self {
            Self::Encoding { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether retrying the failed operation may succeed
    pub fn is_retryable(&self) -> bool {
        self.encoding_kind().is_some_and(EncodingErrorKind::is_retryable)
    }
}
