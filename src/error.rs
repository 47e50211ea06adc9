//! Error types for the triage engine.

use std::time::Duration;

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// LLM gateway errors — the closed taxonomy exposed up-stack.
///
/// `RateLimited` and `Transient` are retried with backoff; the rest are
/// surfaced to the caller after at most one repair pass.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("Content filtered by provider policy")]
    ContentFiltered,

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Malformed response after repair: {0}")]
    MalformedResponse(String),

    #[error("Unexpected LLM failure: {0}")]
    Unexpected(String),
}

impl LlmError {
    /// Stable snake_case label, used in logs and fallback-task metadata.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ContentFiltered => "content_filtered",
            Self::RateLimited { .. } => "rate_limited",
            Self::Transient(_) => "transient",
            Self::BadRequest(_) => "bad_request",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Unexpected(_) => "unexpected",
        }
    }

    /// Whether the gateway should retry this error with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient(_))
    }
}

/// Prompt template errors — programmer defects, never recovered into
/// fallback artifacts.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    #[error("Template {template} missing required variable: {variable}")]
    MissingVariable { template: String, variable: String },

    #[error("Template {template} given undeclared variable: {variable}")]
    UndeclaredVariable { template: String, variable: String },

    #[error("Template {template} left unresolved placeholder: {placeholder}")]
    UnresolvedPlaceholder { template: String, placeholder: String },
}

/// Email provider errors.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider authentication failed: {0}")]
    Auth(String),

    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Provider request failed: {0}")]
    RequestFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pipeline-level errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Page {page} timed out after {timeout:?}")]
    PageTimeout { page: usize, timeout: Duration },

    #[error("Conversation {conversation} timed out after {timeout:?}")]
    ConversationTimeout {
        conversation: String,
        timeout: Duration,
    },

    #[error("Pipeline halted: {0}")]
    Halted(String),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
