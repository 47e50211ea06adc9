//! Pipeline scheduler — pages conversations through classify → extract →
//! persist, with cooperative cancellation and bounded cross-page
//! parallelism.
//!
//! Within a page conversations are processed serially; the representative
//! is classified first and its label propagates to siblings. All
//! suspension points sit at gateway calls, so cancellation checkpoints
//! land between operations, never mid-call.

use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Semaphore, broadcast};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::error::{Error, PipelineError, ProviderError};
use crate::ledger::AccuracyLedger;
use crate::llm::{CallKind, LlmGateway};
use crate::mail::{Conversation, EmailProvider, Message, group_conversations};
use crate::prompts::PromptRegistry;
use crate::settings::UserSettings;
use crate::store::Database;
use crate::tasks::{Extractor, Task};
use crate::triage::{Category, Classification, ClassificationStatus, Classifier};

/// Budget for one conversation (classification + extraction).
const CONVERSATION_TIMEOUT: Duration = Duration::from_secs(180);

/// Budget for one page.
const PAGE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// How many messages to pull from the provider per run.
const FETCH_LIMIT: usize = 500;

/// Pipeline stage, for progress display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStage {
    Fetched,
    Grouped,
    Classifying,
    Extracting,
    Persisted,
    Done,
}

impl ProgressStage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fetched => "fetched",
            Self::Grouped => "grouped",
            Self::Classifying => "classifying",
            Self::Extracting => "extracting",
            Self::Persisted => "persisted",
            Self::Done => "done",
        }
    }
}

/// Progress report for one page. Consumers decide how to render.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub page_index: usize,
    pub current: usize,
    pub total: usize,
    pub stage: ProgressStage,
    pub eta_hint: Option<Duration>,
}

/// Outcome of one page.
#[derive(Debug, Clone, Default)]
pub struct PageResult {
    pub page_index: usize,
    pub conversations: usize,
    pub classified: usize,
    pub tasks_created: usize,
    /// Content-filtered placeholders plus fallback tasks.
    pub degraded: usize,
    /// Messages left retryable after gateway errors.
    pub failed: usize,
    /// Message ids the provider should treat as delete candidates.
    pub delete_candidates: Vec<String>,
    /// True when cancellation or a timeout stopped the page early.
    pub partial: bool,
    /// True when the page was skipped via the memoization set.
    pub skipped: bool,
}

/// Outcome of a full run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub pages: Vec<PageResult>,
    pub total_messages: usize,
}

impl RunSummary {
    pub fn total_tasks(&self) -> usize {
        self.pages.iter().map(|p| p.tasks_created).sum()
    }

    pub fn total_classified(&self) -> usize {
        self.pages.iter().map(|p| p.classified).sum()
    }
}

pub struct PipelineScheduler {
    provider: Arc<dyn EmailProvider>,
    classifier: Arc<Classifier>,
    extractor: Arc<Extractor>,
    gateway: Arc<LlmGateway>,
    registry: Arc<PromptRegistry>,
    db: Arc<dyn Database>,
    ledger: Arc<AccuracyLedger>,
    config: PipelineConfig,
    cancelled: Arc<AtomicBool>,
    progress_tx: broadcast::Sender<ProgressEvent>,
    /// Fingerprints of pages already processed this run.
    completed_pages: Mutex<HashSet<u64>>,
    /// Gates cross-page parallelism (1..=4 permits).
    page_semaphore: Arc<Semaphore>,
}

impl PipelineScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn EmailProvider>,
        classifier: Arc<Classifier>,
        extractor: Arc<Extractor>,
        gateway: Arc<LlmGateway>,
        registry: Arc<PromptRegistry>,
        db: Arc<dyn Database>,
        ledger: Arc<AccuracyLedger>,
        config: PipelineConfig,
    ) -> Self {
        let (progress_tx, _) = broadcast::channel(256);
        let permits = config.parallel_pages.clamp(1, 4);
        Self {
            provider,
            classifier,
            extractor,
            gateway,
            registry,
            db,
            ledger,
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
            progress_tx,
            completed_pages: Mutex::new(HashSet::new()),
            page_semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Subscribe to progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress_tx.subscribe()
    }

    /// Handle for requesting cooperative cancellation.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Triage a folder end to end: fetch, page, classify, extract,
    /// persist.
    pub async fn run(
        &self,
        folder: &str,
        since: Option<DateTime<Utc>>,
        settings: &UserSettings,
    ) -> Result<RunSummary, Error> {
        let messages = self
            .provider
            .list_conversations(folder, FETCH_LIMIT, since)
            .await
            .map_err(|e| match e {
                ProviderError::Auth(reason) => {
                    // Nothing to triage without a mailbox; stop the run.
                    error!(reason = %reason, "Provider authentication failed, halting");
                    Error::Provider(ProviderError::Auth(reason))
                }
                other => Error::Provider(other),
            })?;

        let total_messages = messages.len();
        let conversations = group_conversations(messages);
        info!(
            folder,
            messages = total_messages,
            conversations = conversations.len(),
            page_size = self.config.page_size,
            "Starting triage run"
        );

        // Chunk conversations into pages, preserving newest-first order.
        let pages: Vec<Vec<Message>> = conversations
            .chunks(self.config.page_size.max(1))
            .map(|chunk| {
                chunk
                    .iter()
                    .flat_map(|c| c.messages.iter().cloned())
                    .collect()
            })
            .collect();

        let page_futures = pages.into_iter().enumerate().map(|(index, page)| {
            let settings = settings.clone();
            async move {
                let _permit = self
                    .page_semaphore
                    .acquire()
                    .await
                    .expect("page semaphore never closes");
                match tokio::time::timeout(PAGE_TIMEOUT, self.run_page(page, index, &settings))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        error!(page = index, "Page timed out, keeping partial progress");
                        Err(PipelineError::PageTimeout {
                            page: index,
                            timeout: PAGE_TIMEOUT,
                        })
                    }
                }
            }
        });

        let mut summary = RunSummary {
            total_messages,
            ..RunSummary::default()
        };
        for (index, outcome) in futures::future::join_all(page_futures)
            .await
            .into_iter()
            .enumerate()
        {
            match outcome {
                Ok(result) => summary.pages.push(result),
                Err(PipelineError::PageTimeout { page, .. }) => summary.pages.push(PageResult {
                    page_index: page,
                    partial: true,
                    ..PageResult::default()
                }),
                // Programmer defects terminate the run; prior pages'
                // persisted work is already durable.
                Err(e) => {
                    error!(page = index, error = %e, "Page failed hard");
                    return Err(Error::Pipeline(e));
                }
            }
        }

        info!(
            pages = summary.pages.len(),
            classified = summary.total_classified(),
            tasks = summary.total_tasks(),
            "Triage run complete"
        );
        Ok(summary)
    }

    /// Process one page of messages.
    pub async fn run_page(
        &self,
        messages: Vec<Message>,
        page_index: usize,
        settings: &UserSettings,
    ) -> Result<PageResult, PipelineError> {
        let fingerprint = page_fingerprint(&messages);
        {
            let completed = self.completed_pages.lock().await;
            if completed.contains(&fingerprint) {
                debug!(page = page_index, "Page already processed, skipping");
                return Ok(PageResult {
                    page_index,
                    skipped: true,
                    ..PageResult::default()
                });
            }
        }

        self.emit(page_index, 0, 0, ProgressStage::Fetched, None);
        let conversations = group_conversations(messages);
        let total = conversations.len();
        self.emit(page_index, 0, total, ProgressStage::Grouped, None);

        let mut result = PageResult {
            page_index,
            conversations: total,
            ..PageResult::default()
        };

        let started = Instant::now();
        for (index, conversation) in conversations.iter().enumerate() {
            // Cooperative checkpoint between conversations. The yield
            // lets a cancellation signal land before the next LLM call.
            tokio::task::yield_now().await;
            if self.cancelled.load(Ordering::SeqCst) {
                info!(page = page_index, processed = index, "Page cancelled");
                result.partial = true;
                break;
            }

            let eta = eta_hint(started.elapsed(), index, total);
            self.emit(page_index, index + 1, total, ProgressStage::Classifying, eta);

            match tokio::time::timeout(
                CONVERSATION_TIMEOUT,
                self.process_conversation(conversation, settings, page_index, index + 1, total),
            )
            .await
            {
                Ok(Ok(outcome)) => outcome.fold_into(&mut result),
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    warn!(
                        page = page_index,
                        conversation = %conversation.key,
                        message_id = %conversation.representative().id,
                        "Conversation timed out, recorded as failed"
                    );
                    result.failed += 1;
                }
            }
        }

        self.emit(page_index, total, total, ProgressStage::Persisted, None);
        if !result.partial {
            self.completed_pages.lock().await.insert(fingerprint);
        }
        self.emit(page_index, total, total, ProgressStage::Done, None);

        Ok(result)
    }

    /// Classify a conversation's representative, propagate the label,
    /// and extract tasks.
    async fn process_conversation(
        &self,
        conversation: &Conversation,
        settings: &UserSettings,
        page_index: usize,
        current: usize,
        total: usize,
    ) -> Result<ConversationOutcome, PipelineError> {
        let representative = conversation.representative();
        let model_version = self.gateway.model_name();
        let mut outcome = ConversationOutcome::default();

        // Reuse a prior classification for this (message, model) pair —
        // re-running a page must not spend quota again.
        let classification = match self
            .db
            .get_classification(&representative.id, model_version)
            .await?
        {
            Some(existing) => {
                debug!(
                    message_id = %representative.id,
                    "Classification already stored, reusing"
                );
                existing
            }
            None => {
                let fresh = self
                    .classifier
                    .classify(representative, settings)
                    .await
                    .map_err(PipelineError::Template)?;

                if fresh.status == ClassificationStatus::Error {
                    // Not persisted: the (message, model) key stays free
                    // so a later run can retry.
                    outcome.failed = 1;
                    return Ok(outcome);
                }

                self.persist_classification(conversation, &fresh).await?;
                self.ledger
                    .record_prediction(&representative.id, fresh.category, fresh.confidence)
                    .await?;
                fresh
            }
        };

        outcome.classified = 1;
        let content_filtered = classification.status == ClassificationStatus::ContentFiltered;

        if classification.category == Category::SpamToDelete {
            outcome
                .delete_candidates
                .extend(conversation.messages.iter().map(|m| m.id.clone()));
            return Ok(outcome);
        }

        // Skip extraction when a healthy task already exists; a fallback
        // task (error_kind in metadata) is replaced by a retry.
        let task_id = Task::derive_id(
            &representative.id,
            classification.category,
            self.extractor.version(),
        );
        if let Some(existing) = self.db.get_task(task_id).await?
            && existing.metadata.get("error_kind").is_none()
        {
            debug!(task_id = %task_id, "Task already materialized, skipping extraction");
            return Ok(outcome);
        }

        self.emit(page_index, current, total, ProgressStage::Extracting, None);
        let tasks = self
            .extractor
            .extract(representative, &classification, settings)
            .await
            .map_err(PipelineError::Template)?;

        let mut has_fallback = false;
        for task in &tasks {
            self.db.upsert_task(task).await?;
            has_fallback |= task.metadata.get("error_kind").is_some();
            outcome.tasks_created += 1;
        }
        // One degraded item per conversation, whether the placeholder
        // came from the content filter or a gateway failure.
        if content_filtered || has_fallback {
            outcome.degraded = 1;
        }

        Ok(outcome)
    }

    /// Persist the representative's classification and propagate it to
    /// every sibling message in the conversation.
    async fn persist_classification(
        &self,
        conversation: &Conversation,
        classification: &Classification,
    ) -> Result<(), PipelineError> {
        for message in &conversation.messages {
            let row = Classification {
                message_id: message.id.clone(),
                ..classification.clone()
            };
            self.db.insert_classification(&row).await?;
        }
        Ok(())
    }

    /// Cross-page inbox overview from stored one-line summaries.
    ///
    /// Optional and off the critical path; callers treat failures as
    /// missing, not fatal.
    pub async fn holistic_summary(&self, settings: &UserSettings) -> Result<String, Error> {
        let recent = self.db.list_recent_classified(100).await?;
        let summaries = recent
            .iter()
            .filter(|c| !c.one_line_summary.is_empty())
            .map(|c| format!("[{}] {}", c.category.label(), c.one_line_summary))
            .collect::<Vec<_>>()
            .join("\n");

        let rendered = self.registry.get(
            "holistic_inbox_analysis",
            &[
                ("summaries", summaries.as_str()),
                ("username", settings.username.as_str()),
                ("job_role_context", settings.job_role_context.as_str()),
            ],
        )?;
        let outcome = self
            .gateway
            .complete_json(&rendered, CallKind::Extraction)
            .await?;
        Ok(outcome
            .value
            .get("summary")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }

    fn emit(
        &self,
        page_index: usize,
        current: usize,
        total: usize,
        stage: ProgressStage,
        eta_hint: Option<Duration>,
    ) {
        // No receivers is fine; progress is advisory.
        let _ = self.progress_tx.send(ProgressEvent {
            page_index,
            current,
            total,
            stage,
            eta_hint,
        });
    }
}

/// Per-conversation tallies folded into the page result.
#[derive(Debug, Default)]
struct ConversationOutcome {
    classified: usize,
    tasks_created: usize,
    degraded: usize,
    failed: usize,
    delete_candidates: Vec<String>,
}

impl ConversationOutcome {
    fn fold_into(self, result: &mut PageResult) {
        result.classified += self.classified;
        result.tasks_created += self.tasks_created;
        result.degraded += self.degraded;
        result.failed += self.failed;
        result.delete_candidates.extend(self.delete_candidates);
    }
}

/// Deterministic fingerprint of a page's message ids, independent of
/// input order.
fn page_fingerprint(messages: &[Message]) -> u64 {
    let mut ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
    ids.sort_unstable();
    let mut hasher = DefaultHasher::new();
    ids.hash(&mut hasher);
    hasher.finish()
}

fn eta_hint(elapsed: Duration, completed: usize, total: usize) -> Option<Duration> {
    if completed == 0 || total <= completed {
        return None;
    }
    let per_conversation = elapsed / completed as u32;
    Some(per_conversation * (total - completed) as u32)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;
    use crate::config::GatewayConfig;
    use crate::error::LlmError;
    use crate::llm::{CompletionClient, CompletionRequest, CompletionResponse};
    use crate::mail::types::{Folder, Importance};
    use crate::store::{LibSqlBackend, TaskFilter};
    use crate::tasks::TaskStatus;
    use crate::triage::ExampleStore;

    struct ScriptedClient {
        script: StdMutex<Vec<Result<String, LlmError>>>,
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        fn model_name(&self) -> &str {
            "test-model"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                return Err(LlmError::Unexpected("script exhausted".into()));
            }
            script.remove(0).map(|content| CompletionResponse { content })
        }
    }

    struct StaticProvider {
        messages: Vec<Message>,
    }

    #[async_trait]
    impl EmailProvider for StaticProvider {
        async fn list_conversations(
            &self,
            folder: &str,
            limit: usize,
            _since: Option<DateTime<Utc>>,
        ) -> Result<Vec<Message>, ProviderError> {
            Ok(self
                .messages
                .iter()
                .filter(|m| m.folder == folder)
                .take(limit)
                .cloned()
                .collect())
        }

        async fn get_message(&self, id: &str) -> Result<Message, ProviderError> {
            self.messages
                .iter()
                .find(|m| m.id == id)
                .cloned()
                .ok_or_else(|| ProviderError::MessageNotFound(id.to_string()))
        }

        async fn mark_as_read(&self, _id: &str) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn move_message(&self, _id: &str, _folder: &str) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn list_folders(&self) -> Result<Vec<Folder>, ProviderError> {
            Ok(vec![])
        }
    }

    fn message(id: &str, conv: Option<&str>, subject: &str) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: conv.map(String::from),
            subject: subject.to_string(),
            sender: "alice@corp".into(),
            recipients: vec!["me@corp".into()],
            received_at: Utc::now(),
            body_text: "body text".into(),
            body_html: None,
            has_attachments: false,
            importance: Importance::Normal,
            folder: "Inbox".into(),
        }
    }

    async fn scheduler_with(
        script: Vec<Result<String, LlmError>>,
        messages: Vec<Message>,
    ) -> (Arc<PipelineScheduler>, Arc<dyn Database>) {
        let client = Arc::new(ScriptedClient {
            script: StdMutex::new(script),
        });
        let gateway = Arc::new(LlmGateway::new(
            client,
            GatewayConfig {
                min_delay_classification: Duration::from_millis(0),
                min_delay_extraction: Duration::from_millis(0),
                max_retries: 0,
                timeout: Duration::from_secs(5),
            },
        ));
        let registry = Arc::new(PromptRegistry::new(true));
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let classifier = Arc::new(Classifier::new(
            gateway.clone(),
            registry.clone(),
            ExampleStore::new(db.clone()),
        ));
        let extractor = Arc::new(Extractor::new(gateway.clone(), registry.clone(), "v1"));
        let ledger = Arc::new(AccuracyLedger::new(db.clone()));
        let provider = Arc::new(StaticProvider { messages });

        let scheduler = Arc::new(PipelineScheduler::new(
            provider,
            classifier,
            extractor,
            gateway,
            registry,
            db.clone(),
            ledger,
            PipelineConfig::default(),
        ));
        (scheduler, db)
    }

    fn settings() -> UserSettings {
        let mut settings = UserSettings::new("Sam");
        settings.job_role_context = "software engineer on storage".into();
        settings
    }

    const FYI_CLASSIFICATION: &str =
        r#"{"category": "fyi", "confidence": 0.8, "reasoning": "informational",
            "one_line_summary": "Deployment status update"}"#;
    const FYI_EXTRACTION: &str = r#"{"summary": "Deploy finished"}"#;

    #[tokio::test]
    async fn page_classifies_and_materializes() {
        let (scheduler, db) = scheduler_with(
            vec![Ok(FYI_CLASSIFICATION.into()), Ok(FYI_EXTRACTION.into())],
            vec![],
        )
        .await;

        let result = scheduler
            .run_page(vec![message("M1", None, "Deploy update")], 0, &settings())
            .await
            .unwrap();

        assert_eq!(result.conversations, 1);
        assert_eq!(result.classified, 1);
        assert_eq!(result.tasks_created, 1);
        assert_eq!(result.failed, 0);
        assert!(!result.partial);

        let classification = db
            .get_classification("M1", "test-model")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(classification.category, Category::Fyi);

        let tasks = db.query_tasks(&TaskFilter::default()).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Todo);
    }

    #[tokio::test]
    async fn label_propagates_to_siblings() {
        let (scheduler, db) = scheduler_with(
            vec![Ok(FYI_CLASSIFICATION.into()), Ok(FYI_EXTRACTION.into())],
            vec![],
        )
        .await;

        let mut older = message("M1", Some("thread-1"), "Re: update");
        older.received_at = Utc::now() - chrono::Duration::hours(2);
        let newer = message("M2", Some("thread-1"), "Re: update");

        scheduler
            .run_page(vec![older, newer], 0, &settings())
            .await
            .unwrap();

        // Both messages carry the representative's label
        for id in ["M1", "M2"] {
            let row = db
                .get_classification(id, "test-model")
                .await
                .unwrap()
                .unwrap();
            assert_eq!(row.category, Category::Fyi);
        }
        // But only one task, for the representative
        assert_eq!(db.count_tasks().await.unwrap(), 1);
        let tasks = db.query_tasks(&TaskFilter::default()).await.unwrap();
        assert_eq!(tasks[0].source_message_id, "M2");
    }

    #[tokio::test]
    async fn spam_collects_delete_candidates() {
        let (scheduler, db) = scheduler_with(
            vec![Ok(
                r#"{"category": "spam_to_delete", "confidence": 0.99,
                    "one_line_summary": "spam"}"#
                    .into(),
            )],
            vec![],
        )
        .await;

        let result = scheduler
            .run_page(vec![message("M1", None, "Cheap pills")], 0, &settings())
            .await
            .unwrap();

        assert_eq!(result.delete_candidates, vec!["M1".to_string()]);
        assert_eq!(result.tasks_created, 0);
        assert_eq!(db.count_tasks().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn error_classification_not_persisted_and_retryable() {
        let (scheduler, db) = scheduler_with(
            vec![Err(LlmError::Transient("503".into()))],
            vec![],
        )
        .await;

        let result = scheduler
            .run_page(vec![message("M1", None, "Hello")], 0, &settings())
            .await
            .unwrap();

        assert_eq!(result.failed, 1);
        assert_eq!(result.classified, 0);
        // The (message, model) key stays free for a retry
        assert!(db
            .get_classification("M1", "test-model")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn rerun_is_idempotent() {
        let (scheduler, db) = scheduler_with(
            vec![Ok(FYI_CLASSIFICATION.into()), Ok(FYI_EXTRACTION.into())],
            vec![],
        )
        .await;

        let page = vec![message("M1", None, "Deploy update")];
        scheduler
            .run_page(page.clone(), 0, &settings())
            .await
            .unwrap();
        let tasks_before = db.count_tasks().await.unwrap();
        let classifications_before = db.count_classifications().await.unwrap();

        // Second run: page is memoized, nothing re-runs, stores unchanged.
        let second = scheduler.run_page(page, 0, &settings()).await.unwrap();
        assert!(second.skipped);
        assert_eq!(db.count_tasks().await.unwrap(), tasks_before);
        assert_eq!(
            db.count_classifications().await.unwrap(),
            classifications_before
        );
    }

    #[tokio::test]
    async fn fresh_scheduler_reuses_stored_classification() {
        // Same inputs, new scheduler instance (empty memoization set):
        // the stored classification and healthy task short-circuit both
        // LLM stages. The script is empty — any call would error.
        let (first, db) = scheduler_with(
            vec![Ok(FYI_CLASSIFICATION.into()), Ok(FYI_EXTRACTION.into())],
            vec![],
        )
        .await;
        let page = vec![message("M1", None, "Deploy update")];
        first.run_page(page.clone(), 0, &settings()).await.unwrap();

        let client = Arc::new(ScriptedClient {
            script: StdMutex::new(vec![]),
        });
        let gateway = Arc::new(LlmGateway::new(
            client,
            GatewayConfig {
                min_delay_classification: Duration::from_millis(0),
                min_delay_extraction: Duration::from_millis(0),
                max_retries: 0,
                timeout: Duration::from_secs(5),
            },
        ));
        let registry = Arc::new(PromptRegistry::new(true));
        let classifier = Arc::new(Classifier::new(
            gateway.clone(),
            registry.clone(),
            ExampleStore::new(db.clone()),
        ));
        let extractor = Arc::new(Extractor::new(gateway.clone(), registry.clone(), "v1"));
        let second = PipelineScheduler::new(
            Arc::new(StaticProvider { messages: vec![] }),
            classifier,
            extractor,
            gateway,
            registry,
            db.clone(),
            Arc::new(AccuracyLedger::new(db.clone())),
            PipelineConfig::default(),
        );

        let result = second.run_page(page, 0, &settings()).await.unwrap();
        assert!(!result.skipped);
        assert_eq!(result.classified, 1);
        assert_eq!(result.tasks_created, 0);
        assert_eq!(db.count_tasks().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn content_filtered_page_reports_success_with_degraded_item() {
        let (scheduler, db) = scheduler_with(
            vec![Err(LlmError::ContentFiltered)],
            vec![],
        )
        .await;

        let result = scheduler
            .run_page(vec![message("M1", None, "Blocked")], 0, &settings())
            .await
            .unwrap();

        assert_eq!(result.classified, 1);
        assert_eq!(result.degraded, 1);
        assert_eq!(result.failed, 0);

        let classification = db
            .get_classification("M1", "test-model")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(classification.status, ClassificationStatus::ContentFiltered);
        assert_eq!(classification.confidence, 0.0);

        let tasks = db.query_tasks(&TaskFilter::default()).await.unwrap();
        assert!(tasks[0].description.contains("[content filtered]"));
    }

    #[tokio::test]
    async fn cancellation_keeps_partial_progress() {
        let (scheduler, db) = scheduler_with(
            vec![Ok(FYI_CLASSIFICATION.into()), Ok(FYI_EXTRACTION.into())],
            vec![],
        )
        .await;

        // Cancel after the first conversation by flipping the flag from a
        // progress listener.
        let mut progress = scheduler.subscribe();
        let cancel = scheduler.cancel_handle();
        let watcher = tokio::spawn(async move {
            while let Ok(event) = progress.recv().await {
                if event.stage == ProgressStage::Extracting {
                    cancel.store(true, Ordering::SeqCst);
                }
            }
        });

        let mut old = message("M2", None, "Second");
        old.received_at = Utc::now() - chrono::Duration::hours(1);
        let result = scheduler
            .run_page(
                vec![message("M1", None, "First"), old],
                0,
                &settings(),
            )
            .await
            .unwrap();
        watcher.abort();

        assert!(result.partial);
        assert_eq!(result.classified, 1);
        // First conversation's work is persisted
        assert_eq!(db.count_tasks().await.unwrap(), 1);
        assert!(db
            .get_classification("M1", "test-model")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn run_pages_whole_folder() {
        let (scheduler, db) = scheduler_with(
            vec![
                Ok(FYI_CLASSIFICATION.into()),
                Ok(FYI_EXTRACTION.into()),
                Ok(FYI_CLASSIFICATION.into()),
                Ok(FYI_EXTRACTION.into()),
            ],
            vec![
                message("M1", None, "First"),
                message("M2", None, "Second"),
            ],
        )
        .await;

        let summary = scheduler.run("Inbox", None, &settings()).await.unwrap();
        assert_eq!(summary.total_messages, 2);
        assert_eq!(summary.total_classified(), 2);
        assert_eq!(summary.total_tasks(), 2);
        assert_eq!(db.count_tasks().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn run_halts_on_auth_failure() {
        struct AuthFailProvider;

        #[async_trait]
        impl EmailProvider for AuthFailProvider {
            async fn list_conversations(
                &self,
                _folder: &str,
                _limit: usize,
                _since: Option<DateTime<Utc>>,
            ) -> Result<Vec<Message>, ProviderError> {
                Err(ProviderError::Auth("token expired".into()))
            }

            async fn get_message(&self, id: &str) -> Result<Message, ProviderError> {
                Err(ProviderError::MessageNotFound(id.to_string()))
            }

            async fn mark_as_read(&self, _id: &str) -> Result<(), ProviderError> {
                Ok(())
            }

            async fn move_message(
                &self,
                _id: &str,
                _folder: &str,
            ) -> Result<(), ProviderError> {
                Ok(())
            }

            async fn list_folders(&self) -> Result<Vec<Folder>, ProviderError> {
                Ok(vec![])
            }
        }

        let client = Arc::new(ScriptedClient {
            script: StdMutex::new(vec![]),
        });
        let gateway = Arc::new(LlmGateway::new(
            client,
            GatewayConfig::default(),
        ));
        let registry = Arc::new(PromptRegistry::new(true));
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let scheduler = PipelineScheduler::new(
            Arc::new(AuthFailProvider),
            Arc::new(Classifier::new(
                gateway.clone(),
                registry.clone(),
                ExampleStore::new(db.clone()),
            )),
            Arc::new(Extractor::new(gateway.clone(), registry.clone(), "v1")),
            gateway,
            registry,
            db.clone(),
            Arc::new(AccuracyLedger::new(db)),
            PipelineConfig::default(),
        );

        let err = scheduler.run("Inbox", None, &settings()).await.unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::Auth(_))));
    }

    #[tokio::test]
    async fn progress_events_cover_stages() {
        let (scheduler, _db) = scheduler_with(
            vec![Ok(FYI_CLASSIFICATION.into()), Ok(FYI_EXTRACTION.into())],
            vec![],
        )
        .await;

        let mut progress = scheduler.subscribe();
        scheduler
            .run_page(vec![message("M1", None, "Deploy")], 0, &settings())
            .await
            .unwrap();

        let mut stages = Vec::new();
        while let Ok(event) = progress.try_recv() {
            stages.push(event.stage);
        }
        assert!(stages.contains(&ProgressStage::Grouped));
        assert!(stages.contains(&ProgressStage::Classifying));
        assert!(stages.contains(&ProgressStage::Extracting));
        assert!(stages.contains(&ProgressStage::Done));
    }

    #[tokio::test]
    async fn holistic_summary_uses_stored_summaries() {
        let (scheduler, db) = scheduler_with(
            vec![Ok(r#"{"summary": "Mostly deploy chatter; one RFC needs review."}"#.into())],
            vec![],
        )
        .await;

        db.insert_classification(&Classification {
            message_id: "m1".into(),
            category: Category::Fyi,
            confidence: 0.8,
            reasoning: String::new(),
            one_line_summary: "Deploy finished".into(),
            model_version: "test-model".into(),
            predicted_at: Utc::now(),
            status: ClassificationStatus::Classified,
            error_kind: None,
        })
        .await
        .unwrap();

        let summary = scheduler.holistic_summary(&settings()).await.unwrap();
        assert!(summary.contains("RFC"));
    }
}
