//! Accuracy & resolution ledger — append-only records of predictions,
//! corrections, and task lifecycle events.
//!
//! Events are never mutated; a correction appends a new event and the
//! snapshot table tracks the latest ground truth per message.

pub mod metrics;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::Database;
use crate::tasks::{Resolution, ResolutionType, TaskStatus};
use crate::triage::Category;

pub use metrics::{CategoryMetrics, RunningMetrics, compute_metrics};

/// One prediction or correction event. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccuracyEvent {
    pub message_id: String,
    pub predicted_category: Category,
    /// Equals `predicted_category` iff not corrected.
    pub actual_category: Category,
    pub confidence: f64,
    pub occurred_at: DateTime<Utc>,
    pub session_id: Uuid,
}

/// The append-only ledger, source of truth for accuracy metrics and
/// resolution history.
pub struct AccuracyLedger {
    db: Arc<dyn Database>,
    /// Stamped on every event this ledger instance writes; one per
    /// pipeline run.
    session_id: Uuid,
}

impl AccuracyLedger {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            session_id: Uuid::new_v4(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Record a fresh prediction. `actual == predicted` until a
    /// correction arrives.
    pub async fn record_prediction(
        &self,
        message_id: &str,
        predicted_category: Category,
        confidence: f64,
    ) -> Result<(), DatabaseError> {
        let event = AccuracyEvent {
            message_id: message_id.to_string(),
            predicted_category,
            actual_category: predicted_category,
            confidence,
            occurred_at: Utc::now(),
            session_id: self.session_id,
        };
        self.db.insert_accuracy_event(&event).await?;
        self.db
            .upsert_accuracy_snapshot(message_id, predicted_category)
            .await?;
        debug!(
            message_id,
            category = predicted_category.label(),
            confidence,
            "Prediction recorded"
        );
        Ok(())
    }

    /// Record a user correction. Appends a new event carrying the
    /// original prediction and the corrected ground truth; never updates
    /// prior rows.
    pub async fn record_correction(
        &self,
        message_id: &str,
        actual_category: Category,
        corrected_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let prior = self
            .db
            .latest_accuracy_event(message_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "accuracy_event".into(),
                id: message_id.to_string(),
            })?;

        let event = AccuracyEvent {
            message_id: message_id.to_string(),
            predicted_category: prior.predicted_category,
            actual_category,
            confidence: prior.confidence,
            occurred_at: corrected_at,
            session_id: self.session_id,
        };
        self.db.insert_accuracy_event(&event).await?;
        self.db
            .upsert_accuracy_snapshot(message_id, actual_category)
            .await?;
        info!(
            message_id,
            predicted = prior.predicted_category.label(),
            actual = actual_category.label(),
            "Correction recorded"
        );
        Ok(())
    }

    /// Record a task resolution and apply its status effect.
    ///
    /// `completed` moves the task to `done`; `reopened` moves it back to
    /// `todo`; `dismissed`/`deferred` leave the status untouched — the
    /// resolution record itself is authoritative for those.
    pub async fn record_resolution(
        &self,
        task_id: Uuid,
        resolution_type: ResolutionType,
        notes: &str,
    ) -> Result<Resolution, DatabaseError> {
        let task = self
            .db
            .get_task(task_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "task".into(),
                id: task_id.to_string(),
            })?;

        let now = Utc::now();
        let resolution = Resolution {
            task_id,
            resolution_type,
            resolution_notes: notes.to_string(),
            resolved_at: now,
            task_age_days: (now - task.created_at).num_days(),
        };
        self.db.insert_resolution(&resolution).await?;

        match resolution_type {
            ResolutionType::Completed => {
                self.db.update_task_status(task_id, TaskStatus::Done).await?;
            }
            ResolutionType::Reopened => {
                self.db.update_task_status(task_id, TaskStatus::Todo).await?;
            }
            ResolutionType::Dismissed | ResolutionType::Deferred => {}
        }

        info!(
            task_id = %task_id,
            resolution = resolution_type.label(),
            age_days = resolution.task_age_days,
            "Resolution recorded"
        );
        Ok(resolution)
    }

    /// Rolling metrics over the trailing window.
    pub async fn running_metrics(&self, window_days: u32) -> Result<RunningMetrics, DatabaseError> {
        let since = Utc::now() - Duration::days(window_days as i64);
        let events = self.db.list_accuracy_events_since(since).await?;
        Ok(compute_metrics(&events))
    }

    /// Resolution history over the trailing window, newest first.
    pub async fn resolution_history(
        &self,
        window_days: u32,
        filter: Option<ResolutionType>,
    ) -> Result<Vec<Resolution>, DatabaseError> {
        let since = Utc::now() - Duration::days(window_days as i64);
        self.db.list_resolutions_since(since, filter).await
    }

    /// Drop raw events past the retention horizon. Returns the number
    /// removed.
    pub async fn prune(&self, retention_days: u32) -> Result<usize, DatabaseError> {
        let before = Utc::now() - Duration::days(retention_days as i64);
        let removed = self.db.prune_accuracy_events(before).await?;
        if removed > 0 {
            info!(removed, retention_days, "Pruned accuracy events");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;
    use crate::tasks::{Priority, Task};

    async fn ledger_with_db() -> (AccuracyLedger, Arc<dyn Database>) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        (AccuracyLedger::new(db.clone()), db)
    }

    #[tokio::test]
    async fn prediction_then_metrics() {
        let (ledger, _db) = ledger_with_db().await;
        ledger
            .record_prediction("m1", Category::RequiredPersonalAction, 0.9)
            .await
            .unwrap();

        let metrics = ledger.running_metrics(90).await.unwrap();
        assert_eq!(metrics.total, 1);
        assert_eq!(metrics.overall_accuracy, 1.0);
        assert_eq!(
            metrics.per_category[&Category::RequiredPersonalAction].tp,
            1
        );
    }

    #[tokio::test]
    async fn correction_appends_and_flips_counts() {
        let (ledger, db) = ledger_with_db().await;
        ledger
            .record_prediction("m1", Category::RequiredPersonalAction, 0.9)
            .await
            .unwrap();
        ledger
            .record_correction("m1", Category::Fyi, Utc::now())
            .await
            .unwrap();

        // Two immutable events on the log
        let events = db
            .list_accuracy_events_since(Utc::now() - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0].predicted_category,
            Category::RequiredPersonalAction
        );
        assert_eq!(events[1].actual_category, Category::Fyi);

        // Snapshot holds the latest ground truth
        let snapshot = db.get_accuracy_snapshot("m1").await.unwrap();
        assert_eq!(snapshot, Some(Category::Fyi));

        let metrics = ledger.running_metrics(90).await.unwrap();
        assert_eq!(
            metrics.per_category[&Category::RequiredPersonalAction].fp,
            1
        );
        assert_eq!(metrics.per_category[&Category::Fyi].fn_count, 1);
        assert_eq!(metrics.overall_accuracy, 0.0);
    }

    #[tokio::test]
    async fn correction_without_prediction_fails() {
        let (ledger, _db) = ledger_with_db().await;
        let err = ledger
            .record_correction("ghost", Category::Fyi, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn resolution_completed_closes_task() {
        let (ledger, db) = ledger_with_db().await;
        let task = Task::new("m1", Category::Fyi, "v1", "Read digest", Priority::Low);
        db.upsert_task(&task).await.unwrap();

        let resolution = ledger
            .record_resolution(task.id, ResolutionType::Completed, "done reading")
            .await
            .unwrap();
        assert_eq!(resolution.task_age_days, 0);

        let stored = db.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Done);
        assert_eq!(
            stored.resolution.unwrap().resolution_type,
            ResolutionType::Completed
        );
    }

    #[tokio::test]
    async fn reopen_moves_task_back_to_todo() {
        let (ledger, db) = ledger_with_db().await;
        let task = Task::new("m1", Category::Fyi, "v1", "Read digest", Priority::Low);
        db.upsert_task(&task).await.unwrap();

        ledger
            .record_resolution(task.id, ResolutionType::Completed, "")
            .await
            .unwrap();
        ledger
            .record_resolution(task.id, ResolutionType::Reopened, "not actually done")
            .await
            .unwrap();

        let stored = db.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Todo);

        let history = ledger.resolution_history(90, None).await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn resolution_history_filters_by_type() {
        let (ledger, db) = ledger_with_db().await;
        let a = Task::new("m1", Category::Fyi, "v1", "A", Priority::Low);
        let b = Task::new("m2", Category::Fyi, "v1", "B", Priority::Low);
        db.upsert_task(&a).await.unwrap();
        db.upsert_task(&b).await.unwrap();

        ledger
            .record_resolution(a.id, ResolutionType::Completed, "")
            .await
            .unwrap();
        ledger
            .record_resolution(b.id, ResolutionType::Dismissed, "noise")
            .await
            .unwrap();

        let dismissed = ledger
            .resolution_history(90, Some(ResolutionType::Dismissed))
            .await
            .unwrap();
        assert_eq!(dismissed.len(), 1);
        assert_eq!(dismissed[0].task_id, b.id);
    }

    #[tokio::test]
    async fn resolution_for_missing_task_fails() {
        let (ledger, _db) = ledger_with_db().await;
        let err = ledger
            .record_resolution(Uuid::new_v4(), ResolutionType::Completed, "")
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }
}
