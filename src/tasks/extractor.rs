//! Artifact extractor — category-conditioned second-stage extraction.
//!
//! Dispatches each classified message to its category's prompt template
//! and materializes the result as a task. Every gateway failure degrades
//! into a fallback task carrying the same deterministic id, so a later
//! retry replaces it in place.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{LlmError, TemplateError};
use crate::llm::{CallKind, LlmGateway};
use crate::mail::Message;
use crate::prompts::PromptRegistry;
use crate::settings::UserSettings;
use crate::tasks::links::extract_links;
use crate::tasks::model::{Priority, Task};
use crate::triage::{Category, Classification, ClassificationStatus};

/// Body budget for extraction prompts.
const MAX_BODY_CHARS: usize = 32_000;

/// Reduced budget for low-signal work_relevant extraction.
const REDUCED_BODY_CHARS: usize = 8_000;

pub struct Extractor {
    gateway: Arc<LlmGateway>,
    registry: Arc<PromptRegistry>,
    extractor_version: String,
}

impl Extractor {
    pub fn new(
        gateway: Arc<LlmGateway>,
        registry: Arc<PromptRegistry>,
        extractor_version: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            registry,
            extractor_version: extractor_version.into(),
        }
    }

    pub fn version(&self) -> &str {
        &self.extractor_version
    }

    /// Extract tasks for a classified message.
    ///
    /// Emits zero tasks for `spam_to_delete`, one task for every other
    /// category. Gateway failures produce a fallback task; template
    /// errors propagate.
    pub async fn extract(
        &self,
        message: &Message,
        classification: &Classification,
        settings: &UserSettings,
    ) -> Result<Vec<Task>, TemplateError> {
        let category = classification.category;

        // Policy-blocked content never goes back to the model; emit the
        // placeholder directly.
        if classification.status == ClassificationStatus::ContentFiltered {
            return Ok(vec![self.placeholder_task(message, category)]);
        }

        if category == Category::SpamToDelete {
            debug!(message_id = %message.id, "Spam candidate, no task emitted");
            return Ok(Vec::new());
        }

        let result = match category {
            Category::RequiredPersonalAction | Category::TeamAction | Category::OptionalAction => {
                self.action_item(message, settings, category, MAX_BODY_CHARS)
                    .await
            }
            Category::WorkRelevant => {
                self.action_item(message, settings, category, REDUCED_BODY_CHARS)
                    .await
            }
            Category::JobListing => self.job_listing(message, settings).await,
            Category::OptionalEvent => self.event_relevance(message, settings).await,
            Category::Newsletter => self.newsletter(message, settings).await,
            Category::Fyi => self.fyi(message, settings).await,
            Category::SpamToDelete => unreachable!("handled above"),
        };

        match result {
            Ok(task) => Ok(vec![task]),
            Err(ExtractFailure::Template(e)) => Err(e),
            Err(ExtractFailure::Llm(e)) => {
                warn!(
                    message_id = %message.id,
                    category = category.label(),
                    error_kind = e.kind(),
                    "Extraction failed, emitting fallback task"
                );
                Ok(vec![self.fallback_task(message, category, &e)])
            }
        }
    }

    // ── Per-category extraction ─────────────────────────────────────

    async fn action_item(
        &self,
        message: &Message,
        settings: &UserSettings,
        category: Category,
        body_budget: usize,
    ) -> Result<Task, ExtractFailure> {
        let body = truncate_chars(&message.body_text, body_budget);
        let value = self
            .call(
                "summerize_action_item",
                &[
                    ("subject", message.subject.as_str()),
                    ("sender", message.sender.as_str()),
                    ("body", body.as_str()),
                    ("username", settings.username.as_str()),
                    ("job_role_context", settings.job_role_context.as_str()),
                ],
                settings,
            )
            .await?;

        let mut metadata = json!({
            "action_items": value.get("action_items").cloned().unwrap_or(json!([])),
        });
        if let Some(due) = value.get("due_date").and_then(|v| v.as_str()) {
            metadata["due_date"] = json!(due);
        }
        if category == Category::TeamAction {
            metadata["team_scope"] = json!(true);
        }

        Ok(self
            .task(message, category, &value, priority_for(category))
            .with_metadata(metadata))
    }

    async fn job_listing(
        &self,
        message: &Message,
        settings: &UserSettings,
    ) -> Result<Task, ExtractFailure> {
        let body = truncate_chars(&message.body_text, MAX_BODY_CHARS);
        let value = self
            .call(
                "job_listing_analysis",
                &[
                    ("subject", message.subject.as_str()),
                    ("sender", message.sender.as_str()),
                    ("body", body.as_str()),
                    ("job_role_context", settings.job_role_context.as_str()),
                    ("job_skills", settings.job_skills.as_str()),
                ],
                settings,
            )
            .await?;

        let metadata = json!({
            "qualification_match": value.get("qualification_match").cloned().unwrap_or(json!(0.0)),
            "key_requirements": value.get("key_requirements").cloned().unwrap_or(json!([])),
        });

        Ok(self
            .task(message, Category::JobListing, &value, Priority::Medium)
            .with_metadata(metadata))
    }

    async fn event_relevance(
        &self,
        message: &Message,
        settings: &UserSettings,
    ) -> Result<Task, ExtractFailure> {
        let body = truncate_chars(&message.body_text, MAX_BODY_CHARS);
        let value = self
            .call(
                "event_relevance",
                &[
                    ("subject", message.subject.as_str()),
                    ("sender", message.sender.as_str()),
                    ("body", body.as_str()),
                    ("job_role_context", settings.job_role_context.as_str()),
                ],
                settings,
            )
            .await?;

        let metadata = json!({
            "relevance": value.get("relevance_score").cloned().unwrap_or(json!(0.0)),
        });

        Ok(self
            .task(message, Category::OptionalEvent, &value, Priority::Low)
            .with_metadata(metadata))
    }

    async fn newsletter(
        &self,
        message: &Message,
        settings: &UserSettings,
    ) -> Result<Task, ExtractFailure> {
        let body = truncate_chars(&message.body_text, MAX_BODY_CHARS);
        let has_interests = !settings.newsletter_interests.trim().is_empty();
        let template = if has_interests {
            "newsletter_summary_custom"
        } else {
            "newsletter_summary"
        };

        let mut variables = vec![
            ("subject", message.subject.as_str()),
            ("sender", message.sender.as_str()),
            ("body", body.as_str()),
        ];
        if has_interests {
            variables.push(("custom_interests", settings.newsletter_interests.as_str()));
        }

        let value = self.call(template, &variables, settings).await?;

        let metadata = json!({
            "key_points": value.get("key_points").cloned().unwrap_or(json!([])),
            "links": extract_links(&message.body_text),
        });

        Ok(self
            .task(message, Category::Newsletter, &value, Priority::Low)
            .with_metadata(metadata))
    }

    async fn fyi(
        &self,
        message: &Message,
        settings: &UserSettings,
    ) -> Result<Task, ExtractFailure> {
        let body = truncate_chars(&message.body_text, MAX_BODY_CHARS);
        let value = self
            .call(
                "fyi_summary",
                &[
                    ("subject", message.subject.as_str()),
                    ("sender", message.sender.as_str()),
                    ("body", body.as_str()),
                    ("username", settings.username.as_str()),
                ],
                settings,
            )
            .await?;

        let summary = value
            .get("summary")
            .and_then(|v| v.as_str())
            .unwrap_or(&message.subject)
            .to_string();

        let metadata = json!({
            "links": extract_links(&message.body_text),
        });

        Ok(Task::new(
            &message.id,
            Category::Fyi,
            &self.extractor_version,
            &message.subject,
            Priority::Low,
        )
        .with_description(format!("• {summary}"))
        .with_metadata(metadata))
    }

    // ── Shared plumbing ─────────────────────────────────────────────

    async fn call(
        &self,
        template: &str,
        variables: &[(&str, &str)],
        settings: &UserSettings,
    ) -> Result<Value, ExtractFailure> {
        let rendered = self.registry.get_with_override(
            template,
            variables,
            settings.custom_prompt(template),
        )?;
        let outcome = self
            .gateway
            .complete_json(&rendered, CallKind::Extraction)
            .await?;
        Ok(outcome.value)
    }

    /// Base task from a response's title/summary fields.
    fn task(
        &self,
        message: &Message,
        category: Category,
        value: &Value,
        priority: Priority,
    ) -> Task {
        let title = value
            .get("title")
            .and_then(|v| v.as_str())
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&message.subject);
        let description = value
            .get("summary")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        Task::new(
            &message.id,
            category,
            &self.extractor_version,
            title,
            priority,
        )
        .with_description(description)
    }

    /// Degraded task emitted when the gateway fails. Keeps the
    /// deterministic id so a retry replaces it.
    fn fallback_task(&self, message: &Message, category: Category, error: &LlmError) -> Task {
        Task::new(
            &message.id,
            category,
            &self.extractor_version,
            &message.subject,
            priority_for(category),
        )
        .with_description(format!(
            "[AI service unavailable: {}] Review email manually.",
            error.kind()
        ))
        .with_metadata(json!({
            "error_kind": error.kind(),
            "occurred_at": Utc::now().to_rfc3339(),
        }))
    }

    /// Placeholder for content-filtered messages.
    fn placeholder_task(&self, message: &Message, category: Category) -> Task {
        Task::new(
            &message.id,
            category,
            &self.extractor_version,
            &message.subject,
            priority_for(category),
        )
        .with_description("[content filtered] Review email manually.".to_string())
        .with_metadata(json!({
            "error_kind": "content_filtered",
            "occurred_at": Utc::now().to_rfc3339(),
        }))
    }
}

/// Dispatch-table priority for a category.
fn priority_for(category: Category) -> Priority {
    match category {
        Category::RequiredPersonalAction => Priority::High,
        Category::TeamAction | Category::OptionalAction | Category::JobListing => {
            Priority::Medium
        }
        Category::OptionalEvent
        | Category::WorkRelevant
        | Category::Fyi
        | Category::Newsletter
        | Category::SpamToDelete => Priority::Low,
    }
}

enum ExtractFailure {
    Template(TemplateError),
    Llm(LlmError),
}

impl From<TemplateError> for ExtractFailure {
    fn from(e: TemplateError) -> Self {
        Self::Template(e)
    }
}

impl From<LlmError> for ExtractFailure {
    fn from(e: LlmError) -> Self {
        Self::Llm(e)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
