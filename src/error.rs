//! Error types for the operating memory core

use thiserror::Error;

/// Result type alias for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;

#[derive(Error, Debug)]
pub enum MemoryError {

    // =============================
    // Core Memory Errors
    // =============================

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupted state: {0}")]
    CorruptedState(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    // =============================
    // Generation Client Errors
    // =============================

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider '{0}' timed out")]
    ProviderTimeout(String),

    #[error("No LLM providers configured")]
    NoProvidersConfigured,

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("UUID parse error: {0}")]
    UuidError(#[from] uuid::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
