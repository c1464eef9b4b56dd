//! Shared configuration, error types and logging for the Englishy workspace

pub mod config;
pub mod error;
pub mod logger;

// Re-export commonly used types
pub use config::{AppConfig, EmbeddingProviderKind};
pub use error::{EncodingErrorKind, EnglishyError};
pub type Result<T> = std::result::Result<T, EnglishyError>;
