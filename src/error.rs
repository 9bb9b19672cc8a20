//! Error types for agri-assist.
//!
//! External collaborators (weather, search, translation, the farm platform)
//! degrade at the call site and never surface raw errors to users; these
//! types cover the internal boundaries where propagation is still useful.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Session store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open store: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Stale write rejected for session {phone} (version {version})")]
    StaleWrite { phone: String, version: i64 },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Outbound delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send message to {to}: {reason}")]
    SendFailed { to: String, reason: String },
}

/// Text/vision generation errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Generation request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),
}

/// Errors from the remaining external providers (weather, search, media).
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider {provider} is not configured")]
    NotConfigured { provider: &'static str },

    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed {
        provider: &'static str,
        reason: String,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse {
        provider: &'static str,
        reason: String,
    },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
