//! Error types for the coaching core.

use crate::ratelimit::RateLimitExceeded;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Email error: {0}")]
    Email(#[from] EmailError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Rate limited: {0}")]
    RateLimited(#[from] RateLimitExceeded),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open store: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} for {key}")]
    NotFound { entity: String, key: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Therapist search backend errors.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search backend request failed: {reason}")]
    Backend { reason: String },

    #[error("Search backend timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Invalid response from search backend: {0}")]
    InvalidResponse(String),
}

/// Email delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Email rate limit exceeded (max {max_attempts} attempts per {window_hours} hours).")]
    QuotaExceeded {
        max_attempts: u32,
        window_hours: u32,
    },

    #[error("Invalid {field} address: {reason}")]
    InvalidAddress { field: String, reason: String },

    #[error("SMTP delivery failed: {reason}")]
    Transport { reason: String },

    #[error("Email audit query failed: {0}")]
    Audit(String),

    #[error("Email channel is not configured")]
    NotConfigured,
}

/// Text-generation collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("No text-generation provider configured")]
    NotConfigured,

    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider request timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

/// Result type alias for the coaching core.
pub type Result<T> = std::result::Result<T, Error>;
