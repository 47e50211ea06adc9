//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. A single connection is
//! reused for all operations; `libsql::Connection` is `Send + Sync` and
//! safe for concurrent async use.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::ledger::AccuracyEvent;
use crate::settings::UserSettings;
use crate::store::migrations;
use crate::store::traits::{Database, TaskFilter};
use crate::tasks::{Priority, Resolution, ResolutionType, Task, TaskStatus};
use crate::triage::{Category, Classification, ClassificationStatus};

/// libSQL database backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) the triage database at `path` and initialize
    /// the schema.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| open_err("creating the database directory", e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| open_err("opening the triage database", e))?;
        let conn = db
            .connect()
            .map_err(|e| open_err("connecting to the triage database", e))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(db = %path.display(), "Triage store ready");
        Ok(backend)
    }

    /// In-memory database for tests.
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| open_err("building the in-memory database", e))?;
        let conn = db
            .connect()
            .map_err(|e| open_err("connecting to the in-memory database", e))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

fn open_err(what: &str, e: impl std::fmt::Display) -> DatabaseError {
    DatabaseError::Pool(format!("{what} failed: {e}"))
}

// ── Helper functions ────────────────────────────────────────────────

fn query_err(e: libsql::Error) -> DatabaseError {
    DatabaseError::Query(e.to_string())
}

/// Parse an RFC 3339 datetime string written by this backend.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn parse_category(s: &str) -> Result<Category, DatabaseError> {
    s.parse()
        .map_err(|e: String| DatabaseError::Serialization(e))
}

/// Convert `Option<String>` to a libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn classification_status_to_str(status: ClassificationStatus) -> &'static str {
    status.label()
}

fn str_to_classification_status(s: &str) -> ClassificationStatus {
    match s {
        "classifying" => ClassificationStatus::Classifying,
        "classified" => ClassificationStatus::Classified,
        "error" => ClassificationStatus::Error,
        "content_filtered" => ClassificationStatus::ContentFiltered,
        _ => ClassificationStatus::Pending,
    }
}

fn str_to_priority(s: &str) -> Priority {
    match s {
        "high" => Priority::High,
        "low" => Priority::Low,
        _ => Priority::Medium,
    }
}

fn str_to_task_status(s: &str) -> TaskStatus {
    match s {
        "in_progress" => TaskStatus::InProgress,
        "done" => TaskStatus::Done,
        _ => TaskStatus::Todo,
    }
}

const CLASSIFICATION_COLUMNS: &str = "message_id, model_version, category, confidence, \
     reasoning, one_line_summary, predicted_at, status, error_kind";

fn row_to_classification(row: &libsql::Row) -> Result<Classification, DatabaseError> {
    let category_str: String = row.get(2).map_err(query_err)?;
    let predicted_str: String = row.get(6).map_err(query_err)?;
    let status_str: String = row.get(7).map_err(query_err)?;

    Ok(Classification {
        message_id: row.get(0).map_err(query_err)?,
        model_version: row.get(1).map_err(query_err)?,
        category: parse_category(&category_str)?,
        confidence: row.get(3).map_err(query_err)?,
        reasoning: row.get(4).map_err(query_err)?,
        one_line_summary: row.get(5).map_err(query_err)?,
        predicted_at: parse_datetime(&predicted_str),
        status: str_to_classification_status(&status_str),
        error_kind: row.get(8).ok(),
    })
}

const TASK_COLUMNS: &str = "id, source_message_id, category, title, description, priority, \
     status, metadata, created_at, updated_at";

fn row_to_task(row: &libsql::Row) -> Result<Task, DatabaseError> {
    let id_str: String = row.get(0).map_err(query_err)?;
    let category_str: String = row.get(2).map_err(query_err)?;
    let priority_str: String = row.get(5).map_err(query_err)?;
    let status_str: String = row.get(6).map_err(query_err)?;
    let metadata_str: String = row.get(7).map_err(query_err)?;
    let created_str: String = row.get(8).map_err(query_err)?;
    let updated_str: String = row.get(9).map_err(query_err)?;

    Ok(Task {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| DatabaseError::Serialization(format!("bad task id: {e}")))?,
        source_message_id: row.get(1).map_err(query_err)?,
        category: parse_category(&category_str)?,
        title: row.get(3).map_err(query_err)?,
        description: row.get(4).map_err(query_err)?,
        priority: str_to_priority(&priority_str),
        status: str_to_task_status(&status_str),
        metadata: serde_json::from_str(&metadata_str)
            .unwrap_or_else(|_| serde_json::json!({})),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
        resolution: None,
    })
}

const RESOLUTION_COLUMNS: &str =
    "task_id, resolution_type, resolution_notes, resolved_at, task_age_days";

fn row_to_resolution(row: &libsql::Row) -> Result<Resolution, DatabaseError> {
    let task_id_str: String = row.get(0).map_err(query_err)?;
    let type_str: String = row.get(1).map_err(query_err)?;
    let resolved_str: String = row.get(3).map_err(query_err)?;

    Ok(Resolution {
        task_id: Uuid::parse_str(&task_id_str)
            .map_err(|e| DatabaseError::Serialization(format!("bad task id: {e}")))?,
        resolution_type: type_str
            .parse()
            .map_err(DatabaseError::Serialization)?,
        resolution_notes: row.get(2).map_err(query_err)?,
        resolved_at: parse_datetime(&resolved_str),
        task_age_days: row.get(4).map_err(query_err)?,
    })
}

const EVENT_COLUMNS: &str =
    "message_id, predicted_category, actual_category, confidence, occurred_at, session_id";

fn row_to_event(row: &libsql::Row) -> Result<AccuracyEvent, DatabaseError> {
    let predicted_str: String = row.get(1).map_err(query_err)?;
    let actual_str: String = row.get(2).map_err(query_err)?;
    let occurred_str: String = row.get(4).map_err(query_err)?;
    let session_str: String = row.get(5).map_err(query_err)?;

    Ok(AccuracyEvent {
        message_id: row.get(0).map_err(query_err)?,
        predicted_category: parse_category(&predicted_str)?,
        actual_category: parse_category(&actual_str)?,
        confidence: row.get(3).map_err(query_err)?,
        occurred_at: parse_datetime(&occurred_str),
        session_id: Uuid::parse_str(&session_str).unwrap_or(Uuid::nil()),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::init_schema(self.conn()).await
    }

    // ── Classifications ─────────────────────────────────────────────

    async fn insert_classification(
        &self,
        classification: &Classification,
    ) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO classifications (message_id, model_version, category, \
                 confidence, reasoning, one_line_summary, predicted_at, status, error_kind) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    classification.message_id.clone(),
                    classification.model_version.clone(),
                    classification.category.label(),
                    classification.confidence,
                    classification.reasoning.clone(),
                    classification.one_line_summary.clone(),
                    classification.predicted_at.to_rfc3339(),
                    classification_status_to_str(classification.status),
                    opt_text_owned(classification.error_kind.clone()),
                ],
            )
            .await
            .map_err(query_err)?;

        debug!(
            message_id = %classification.message_id,
            inserted = affected > 0,
            "Classification write"
        );
        Ok(affected > 0)
    }

    async fn get_classification(
        &self,
        message_id: &str,
        model_version: &str,
    ) -> Result<Option<Classification>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CLASSIFICATION_COLUMNS} FROM classifications \
                     WHERE message_id = ?1 AND model_version = ?2"
                ),
                params![message_id, model_version],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_classification(&row)?)),
            None => Ok(None),
        }
    }

    async fn count_classifications(&self) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM classifications", ())
            .await
            .map_err(query_err)?;
        let row = rows
            .next()
            .await
            .map_err(query_err)?
            .ok_or_else(|| DatabaseError::Query("COUNT returned no rows".into()))?;
        row.get(0).map_err(query_err)
    }

    async fn list_recent_classified(
        &self,
        limit: usize,
    ) -> Result<Vec<Classification>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CLASSIFICATION_COLUMNS} FROM classifications \
                     WHERE status = 'classified' \
                     ORDER BY predicted_at DESC LIMIT ?1"
                ),
                params![limit as i64],
            )
            .await
            .map_err(query_err)?;

        let mut classifications = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            classifications.push(row_to_classification(&row)?);
        }
        Ok(classifications)
    }

    // ── Tasks ───────────────────────────────────────────────────────

    async fn upsert_task(&self, task: &Task) -> Result<(), DatabaseError> {
        // Last-writer-wins on the deterministic id. Lifecycle fields
        // (status, created_at) stay with the existing row so a re-run
        // replaces content without resetting user progress.
        self.conn()
            .execute(
                "INSERT INTO tasks (id, source_message_id, category, title, description, \
                 priority, status, metadata, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
                 ON CONFLICT(id) DO UPDATE SET \
                 title = excluded.title, \
                 description = excluded.description, \
                 priority = excluded.priority, \
                 metadata = excluded.metadata, \
                 updated_at = excluded.updated_at",
                params![
                    task.id.to_string(),
                    task.source_message_id.clone(),
                    task.category.label(),
                    task.title.clone(),
                    task.description.clone(),
                    task.priority.label(),
                    task.status.label(),
                    task.metadata.to_string(),
                    task.created_at.to_rfc3339(),
                    task.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(query_err)?;

        let Some(row) = rows.next().await.map_err(query_err)? else {
            return Ok(None);
        };
        let mut task = row_to_task(&row)?;

        // Attach the latest resolution, if one exists.
        let mut resolution_rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {RESOLUTION_COLUMNS} FROM task_resolutions \
                     WHERE task_id = ?1 ORDER BY resolved_at DESC, rowid DESC LIMIT 1"
                ),
                params![id.to_string()],
            )
            .await
            .map_err(query_err)?;
        if let Some(row) = resolution_rows.next().await.map_err(query_err)? {
            task.resolution = Some(row_to_resolution(&row)?);
        }

        Ok(Some(task))
    }

    async fn query_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks \
                     WHERE (?1 IS NULL OR category = ?1) \
                       AND (?2 IS NULL OR status = ?2) \
                       AND (?3 IS NULL OR source_message_id = ?3) \
                     ORDER BY created_at DESC"
                ),
                params![
                    opt_text_owned(filter.category.map(|c| c.label().to_string())),
                    opt_text_owned(filter.status.map(|s| s.label().to_string())),
                    opt_text_owned(filter.source_message_id.clone()),
                ],
            )
            .await
            .map_err(query_err)?;

        let mut tasks = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            tasks.push(row_to_task(&row)?);
        }
        Ok(tasks)
    }

    async fn update_task_status(
        &self,
        id: Uuid,
        status: TaskStatus,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![
                    status.label(),
                    Utc::now().to_rfc3339(),
                    id.to_string()
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn delete_task(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute("DELETE FROM tasks WHERE id = ?1", params![id.to_string()])
            .await
            .map_err(query_err)?;
        Ok(affected > 0)
    }

    async fn count_tasks(&self) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM tasks", ())
            .await
            .map_err(query_err)?;
        let row = rows
            .next()
            .await
            .map_err(query_err)?
            .ok_or_else(|| DatabaseError::Query("COUNT returned no rows".into()))?;
        row.get(0).map_err(query_err)
    }

    // ── Resolutions ─────────────────────────────────────────────────

    async fn insert_resolution(&self, resolution: &Resolution) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO task_resolutions (id, task_id, resolution_type, \
                 resolution_notes, resolved_at, task_age_days) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    Uuid::new_v4().to_string(),
                    resolution.task_id.to_string(),
                    resolution.resolution_type.label(),
                    resolution.resolution_notes.clone(),
                    resolution.resolved_at.to_rfc3339(),
                    resolution.task_age_days,
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn list_resolutions_since(
        &self,
        since: DateTime<Utc>,
        filter: Option<ResolutionType>,
    ) -> Result<Vec<Resolution>, DatabaseError> {
        let mut rows = match filter {
            Some(resolution_type) => self
                .conn()
                .query(
                    &format!(
                        "SELECT {RESOLUTION_COLUMNS} FROM task_resolutions \
                         WHERE resolved_at >= ?1 AND resolution_type = ?2 \
                         ORDER BY resolved_at DESC, rowid DESC"
                    ),
                    params![since.to_rfc3339(), resolution_type.label()],
                )
                .await
                .map_err(query_err)?,
            None => self
                .conn()
                .query(
                    &format!(
                        "SELECT {RESOLUTION_COLUMNS} FROM task_resolutions \
                         WHERE resolved_at >= ?1 \
                         ORDER BY resolved_at DESC, rowid DESC"
                    ),
                    params![since.to_rfc3339()],
                )
                .await
                .map_err(query_err)?,
        };

        let mut resolutions = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            resolutions.push(row_to_resolution(&row)?);
        }
        Ok(resolutions)
    }

    // ── Accuracy ledger ─────────────────────────────────────────────

    async fn insert_accuracy_event(&self, event: &AccuracyEvent) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO accuracy_events (id, message_id, predicted_category, \
                 actual_category, confidence, occurred_at, session_id) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    Uuid::new_v4().to_string(),
                    event.message_id.clone(),
                    event.predicted_category.label(),
                    event.actual_category.label(),
                    event.confidence,
                    event.occurred_at.to_rfc3339(),
                    event.session_id.to_string(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn list_accuracy_events_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<AccuracyEvent>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM accuracy_events \
                     WHERE occurred_at >= ?1 \
                     ORDER BY occurred_at ASC, rowid ASC"
                ),
                params![since.to_rfc3339()],
            )
            .await
            .map_err(query_err)?;

        let mut events = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            events.push(row_to_event(&row)?);
        }
        Ok(events)
    }

    async fn latest_accuracy_event(
        &self,
        message_id: &str,
    ) -> Result<Option<AccuracyEvent>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM accuracy_events \
                     WHERE message_id = ?1 \
                     ORDER BY occurred_at DESC, rowid DESC LIMIT 1"
                ),
                params![message_id],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_event(&row)?)),
            None => Ok(None),
        }
    }

    async fn upsert_accuracy_snapshot(
        &self,
        message_id: &str,
        actual_category: Category,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO accuracy_snapshots (message_id, actual_category, updated_at) \
                 VALUES (?1, ?2, ?3) \
                 ON CONFLICT(message_id) DO UPDATE SET \
                 actual_category = excluded.actual_category, \
                 updated_at = excluded.updated_at",
                params![
                    message_id,
                    actual_category.label(),
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn get_accuracy_snapshot(
        &self,
        message_id: &str,
    ) -> Result<Option<Category>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT actual_category FROM accuracy_snapshots WHERE message_id = ?1",
                params![message_id],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => {
                let category_str: String = row.get(0).map_err(query_err)?;
                Ok(Some(parse_category(&category_str)?))
            }
            None => Ok(None),
        }
    }

    async fn prune_accuracy_events(
        &self,
        before: DateTime<Utc>,
    ) -> Result<usize, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "DELETE FROM accuracy_events WHERE occurred_at < ?1",
                params![before.to_rfc3339()],
            )
            .await
            .map_err(query_err)?;
        Ok(affected as usize)
    }

    // ── Settings ────────────────────────────────────────────────────

    async fn get_user_settings(
        &self,
        username: &str,
    ) -> Result<Option<UserSettings>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT value FROM user_settings WHERE username = ?1",
                params![username],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => {
                let raw: String = row.get(0).map_err(query_err)?;
                serde_json::from_str(&raw)
                    .map(Some)
                    .map_err(|e| DatabaseError::Serialization(e.to_string()))
            }
            None => Ok(None),
        }
    }

    async fn put_user_settings(&self, settings: &UserSettings) -> Result<(), DatabaseError> {
        let value = serde_json::to_string(settings)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "INSERT INTO user_settings (username, value, updated_at) \
                 VALUES (?1, ?2, ?3) \
                 ON CONFLICT(username) DO UPDATE SET \
                 value = excluded.value, \
                 updated_at = excluded.updated_at",
                params![
                    settings.username.clone(),
                    value,
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }
}
