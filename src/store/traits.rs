//! Unified `Database` trait — single async interface for all persistence.
//!
//! Covers classifications, tasks, resolutions, the accuracy ledger, and
//! user settings. One backend implements all of it; callers depend on
//! `Arc<dyn Database>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::ledger::AccuracyEvent;
use crate::settings::UserSettings;
use crate::tasks::{Resolution, ResolutionType, Task, TaskStatus};
use crate::triage::{Category, Classification};

/// Filter for task queries. All fields are conjunctive; `None` matches all.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub category: Option<Category>,
    pub status: Option<TaskStatus>,
    pub source_message_id: Option<String>,
}

/// Backend-agnostic database trait.
#[async_trait]
pub trait Database: Send + Sync {
    /// Initialize database schema (create all tables idempotently).
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Classifications ─────────────────────────────────────────────

    /// Insert a classification keyed on `(message_id, model_version)`.
    ///
    /// Insert-or-ignore: returns `true` if a row was written, `false` if
    /// the key already existed.
    async fn insert_classification(
        &self,
        classification: &Classification,
    ) -> Result<bool, DatabaseError>;

    /// Get the classification for a message under a specific model version.
    async fn get_classification(
        &self,
        message_id: &str,
        model_version: &str,
    ) -> Result<Option<Classification>, DatabaseError>;

    /// Count all classification rows.
    async fn count_classifications(&self) -> Result<i64, DatabaseError>;

    /// Most recent successfully-classified rows, newest first.
    async fn list_recent_classified(
        &self,
        limit: usize,
    ) -> Result<Vec<Classification>, DatabaseError>;

    // ── Tasks ───────────────────────────────────────────────────────

    /// Insert or replace a task by its deterministic id.
    async fn upsert_task(&self, task: &Task) -> Result<(), DatabaseError>;

    /// Get a task by id, including its latest resolution.
    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, DatabaseError>;

    /// Query tasks matching a filter, newest first.
    async fn query_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, DatabaseError>;

    /// Update only the status of a task.
    async fn update_task_status(
        &self,
        id: Uuid,
        status: TaskStatus,
    ) -> Result<(), DatabaseError>;

    /// Delete a task. Returns true if a row was deleted.
    async fn delete_task(&self, id: Uuid) -> Result<bool, DatabaseError>;

    /// Count all task rows.
    async fn count_tasks(&self) -> Result<i64, DatabaseError>;

    // ── Resolutions ─────────────────────────────────────────────────

    /// Append a resolution event. Never updates prior rows.
    async fn insert_resolution(&self, resolution: &Resolution) -> Result<(), DatabaseError>;

    /// Resolutions at or after `since`, newest first, optionally filtered
    /// by type.
    async fn list_resolutions_since(
        &self,
        since: DateTime<Utc>,
        filter: Option<ResolutionType>,
    ) -> Result<Vec<Resolution>, DatabaseError>;

    // ── Accuracy ledger ─────────────────────────────────────────────

    /// Append an accuracy event. Never updates prior rows.
    async fn insert_accuracy_event(&self, event: &AccuracyEvent) -> Result<(), DatabaseError>;

    /// Events at or after `since`, oldest first.
    async fn list_accuracy_events_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<AccuracyEvent>, DatabaseError>;

    /// Latest event for a message, if any.
    async fn latest_accuracy_event(
        &self,
        message_id: &str,
    ) -> Result<Option<AccuracyEvent>, DatabaseError>;

    /// Upsert the snapshot entry `message_id → latest actual_category`.
    async fn upsert_accuracy_snapshot(
        &self,
        message_id: &str,
        actual_category: Category,
    ) -> Result<(), DatabaseError>;

    /// Snapshot lookup for a message.
    async fn get_accuracy_snapshot(
        &self,
        message_id: &str,
    ) -> Result<Option<Category>, DatabaseError>;

    /// Delete events older than `before`. Returns the number removed.
    async fn prune_accuracy_events(
        &self,
        before: DateTime<Utc>,
    ) -> Result<usize, DatabaseError>;

    // ── Settings ────────────────────────────────────────────────────

    /// Get stored settings for a user.
    async fn get_user_settings(
        &self,
        username: &str,
    ) -> Result<Option<UserSettings>, DatabaseError>;

    /// Store settings for a user (full replace).
    async fn put_user_settings(&self, settings: &UserSettings) -> Result<(), DatabaseError>;
}
