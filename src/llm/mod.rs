//! LLM integration — the completion seam, the gateway, and the rig-core
//! backed production client.
//!
//! Everything above this module speaks [`LlmGateway`]; the raw transport
//! is behind the [`CompletionClient`] trait so tests can script responses.

pub mod gateway;
pub mod json_repair;
pub mod rig_client;

pub use gateway::{CallKind, GatewayOutcome, LlmGateway};
pub use rig_client::{LlmBackend, RigClient};

use async_trait::async_trait;

use crate::error::LlmError;

/// A single completion request against the underlying model.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System instructions.
    pub system: String,
    /// User content.
    pub user: String,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Raw model output.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
}

/// Abstract LLM transport. Implementations map their native error surface
/// into the [`LlmError`] taxonomy.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Model identifier, recorded as `model_version` on classifications.
    fn model_name(&self) -> &str;

    /// Run one completion.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}
