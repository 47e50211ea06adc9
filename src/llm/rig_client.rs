//! Production transport over rig-core.
//!
//! A single [`RigClient`] adapter bridges any rig `CompletionModel` to
//! the crate's [`CompletionClient`] seam; [`LlmBackend::connect`] picks
//! the hosted provider (Anthropic or OpenAI) and hands back a boxed
//! client. rig surfaces provider failures as opaque text, so the
//! adapter maps them onto the gateway taxonomy by keyword.

use std::sync::Arc;

use async_trait::async_trait;
use rig::client::CompletionClient as _;
use rig::completion::Prompt;
use secrecy::{ExposeSecret, SecretString};

use crate::error::LlmError;
use crate::llm::{CompletionClient, CompletionRequest, CompletionResponse};

/// Which hosted model family serves completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    pub fn label(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }

    /// Construct a ready-to-use completion client for this backend.
    pub fn connect(
        self,
        api_key: &SecretString,
        model: &str,
    ) -> Result<Arc<dyn CompletionClient>, LlmError> {
        let client: Arc<dyn CompletionClient> = match self {
            Self::Anthropic => {
                use rig::providers::anthropic;
                let provider: rig::client::Client<anthropic::client::AnthropicExt> =
                    anthropic::Client::new(api_key.expose_secret())
                        .map_err(|e| connect_error(self, e))?;
                Arc::new(RigClient::new(provider.completion_model(model), model))
            }
            Self::OpenAi => {
                use rig::providers::openai;
                let provider: rig::client::Client<openai::client::OpenAIResponsesExt> =
                    openai::Client::new(api_key.expose_secret())
                        .map_err(|e| connect_error(self, e))?;
                Arc::new(RigClient::new(provider.completion_model(model), model))
            }
        };
        tracing::info!(backend = self.label(), model, "LLM transport ready");
        Ok(client)
    }
}

impl std::str::FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(format!("unknown LLM backend: '{other}'")),
        }
    }
}

fn connect_error(backend: LlmBackend, detail: impl std::fmt::Display) -> LlmError {
    LlmError::Unexpected(format!(
        "could not build {} transport: {detail}",
        backend.label()
    ))
}

/// Adapter bridging a rig `CompletionModel` to the crate's
/// [`CompletionClient`] seam.
pub struct RigClient<M> {
    model: M,
    model_name: String,
}

impl<M> RigClient<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M> CompletionClient for RigClient<M>
where
    M: rig::completion::CompletionModel + Clone,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let agent = rig::agent::AgentBuilder::new(self.model.clone())
            .preamble(&request.system)
            .build();

        let content = agent
            .prompt(request.user.as_str())
            .await
            .map_err(|e| classify_provider_error(&e.to_string()))?;

        Ok(CompletionResponse { content })
    }
}

/// Map a provider error message onto the gateway taxonomy.
fn classify_provider_error(message: &str) -> LlmError {
    let lowered = message.to_ascii_lowercase();

    if lowered.contains("content filter")
        || lowered.contains("content_filter")
        || lowered.contains("content policy")
        || lowered.contains("responsibleaipolicy")
    {
        return LlmError::ContentFiltered;
    }
    if lowered.contains("429")
        || lowered.contains("rate limit")
        || lowered.contains("rate_limit")
        || lowered.contains("quota")
    {
        return LlmError::RateLimited { retry_after: None };
    }
    if lowered.contains("timeout")
        || lowered.contains("timed out")
        || lowered.contains("connection")
        || lowered.contains("overloaded")
        || lowered.contains("500")
        || lowered.contains("502")
        || lowered.contains("503")
        || lowered.contains("529")
    {
        return LlmError::Transient(message.to_string());
    }
    if lowered.contains("400")
        || lowered.contains("invalid_request")
        || lowered.contains("bad request")
    {
        return LlmError::BadRequest(message.to_string());
    }

    LlmError::Unexpected(message.to_string())
}
