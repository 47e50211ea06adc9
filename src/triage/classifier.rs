//! Classification engine — one representative message in, one
//! classification out.
//!
//! Gateway errors degrade into `error`/`content_filtered` classifications
//! so the pipeline keeps moving; template errors propagate because they
//! indicate a bug, not weather.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::{LlmError, TemplateError};
use crate::llm::{CallKind, LlmGateway};
use crate::mail::Message;
use crate::prompts::PromptRegistry;
use crate::settings::UserSettings;
use crate::triage::examples::ExampleStore;
use crate::triage::types::{Category, Classification, ClassificationStatus};

/// Worst-case body budget: 8,000 tokens at ~4 chars/token.
const MAX_BODY_CHARS: usize = 32_000;

/// Sentinel used when the model omits a confidence.
const UNKNOWN_CONFIDENCE: f64 = 0.5;

/// Few-shot examples included per classification.
const FEW_SHOT_LIMIT: usize = 3;

const TEMPLATE: &str = "classifier_with_explanation";

pub struct Classifier {
    gateway: Arc<LlmGateway>,
    registry: Arc<PromptRegistry>,
    examples: ExampleStore,
}

impl Classifier {
    pub fn new(
        gateway: Arc<LlmGateway>,
        registry: Arc<PromptRegistry>,
        examples: ExampleStore,
    ) -> Self {
        Self {
            gateway,
            registry,
            examples,
        }
    }

    /// Classify a representative message.
    ///
    /// Returns `Err` only for template errors; every gateway failure is
    /// absorbed into the classification's status.
    pub async fn classify(
        &self,
        message: &Message,
        settings: &UserSettings,
    ) -> Result<Classification, TemplateError> {
        let body = truncate_chars(&message.body_text, MAX_BODY_CHARS);

        // Few-shot selection is best-effort; a storage hiccup must not
        // block classification.
        let few_shot = match self
            .examples
            .select(&format!("{} {}", message.subject, body), FEW_SHOT_LIMIT)
            .await
        {
            Ok(examples) => ExampleStore::render_block(&examples),
            Err(e) => {
                warn!(error = %e, "Few-shot selection failed, classifying without examples");
                String::new()
            }
        };

        let rendered = self.registry.get_with_override(
            TEMPLATE,
            &[
                ("subject", message.subject.as_str()),
                ("sender", message.sender.as_str()),
                ("recipient", message.primary_recipient()),
                ("body", body.as_str()),
                ("job_role_context", settings.job_role_context.as_str()),
                (
                    "classification_rules",
                    settings.classification_rules.as_str(),
                ),
                ("username", settings.username.as_str()),
                ("few_shot_examples", few_shot.as_str()),
            ],
            settings.custom_prompt(TEMPLATE),
        )?;

        let outcome = match self
            .gateway
            .complete_json(&rendered, CallKind::Classification)
            .await
        {
            Ok(outcome) => outcome,
            Err(LlmError::ContentFiltered) => {
                debug!(message_id = %message.id, "Classification content-filtered");
                return Ok(self.content_filtered(message));
            }
            Err(e) => {
                warn!(
                    message_id = %message.id,
                    error_kind = e.kind(),
                    "Classification failed, message stays retryable"
                );
                return Ok(self.errored(message, &e));
            }
        };

        let value = outcome.value;
        let Some(category) = value
            .get("category")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<Category>().ok())
        else {
            // Unknown category is an extraction failure, never accepted.
            warn!(
                message_id = %message.id,
                "Model returned a category outside the closed set"
            );
            return Ok(self.errored(
                message,
                &LlmError::MalformedResponse("category outside the closed set".into()),
            ));
        };

        let confidence = value
            .get("confidence")
            .and_then(|v| v.as_f64())
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(UNKNOWN_CONFIDENCE);

        Ok(Classification {
            message_id: message.id.clone(),
            category,
            confidence,
            reasoning: string_field(&value, "reasoning"),
            one_line_summary: string_field(&value, "one_line_summary"),
            model_version: self.gateway.model_name().to_string(),
            predicted_at: Utc::now(),
            status: ClassificationStatus::Classified,
            error_kind: None,
        })
    }

    /// Placeholder classification for policy-blocked content, so the
    /// extractor produces a degraded task instead of the page crashing.
    fn content_filtered(&self, message: &Message) -> Classification {
        Classification {
            message_id: message.id.clone(),
            category: Category::Fyi,
            confidence: 0.0,
            reasoning: "blocked by content policy".into(),
            one_line_summary: "[content filtered]".into(),
            model_version: self.gateway.model_name().to_string(),
            predicted_at: Utc::now(),
            status: ClassificationStatus::ContentFiltered,
            error_kind: Some("content_filtered".into()),
        }
    }

    fn errored(&self, message: &Message, error: &LlmError) -> Classification {
        Classification {
            message_id: message.id.clone(),
            category: Category::Fyi,
            confidence: 0.0,
            reasoning: String::new(),
            one_line_summary: String::new(),
            model_version: self.gateway.model_name().to_string(),
            predicted_at: Utc::now(),
            status: ClassificationStatus::Error,
            error_kind: Some(error.kind().to_string()),
        }
    }
}

fn string_field(value: &serde_json::Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
