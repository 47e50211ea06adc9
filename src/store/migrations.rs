//! Database schema initialization.
//!
//! Single `init_schema()` function creates all tables idempotently using
//! `CREATE TABLE IF NOT EXISTS`. No migration tracking, no version table.

use libsql::Connection;

use crate::error::DatabaseError;

/// Complete schema — all 6 tables with current columns and indexes.
const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS classifications (
        message_id TEXT NOT NULL,
        model_version TEXT NOT NULL,
        category TEXT NOT NULL,
        confidence REAL NOT NULL,
        reasoning TEXT NOT NULL DEFAULT '',
        one_line_summary TEXT NOT NULL DEFAULT '',
        predicted_at TEXT NOT NULL,
        status TEXT NOT NULL,
        error_kind TEXT,
        PRIMARY KEY (message_id, model_version)
    );

    CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY,
        source_message_id TEXT NOT NULL,
        category TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        priority TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'todo',
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_tasks_source ON tasks(source_message_id, category);
    CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);

    CREATE TABLE IF NOT EXISTS task_resolutions (
        id TEXT PRIMARY KEY,
        task_id TEXT NOT NULL,
        resolution_type TEXT NOT NULL,
        resolution_notes TEXT NOT NULL DEFAULT '',
        resolved_at TEXT NOT NULL,
        task_age_days INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_task_resolutions_task ON task_resolutions(task_id);
    CREATE INDEX IF NOT EXISTS idx_task_resolutions_resolved ON task_resolutions(resolved_at);

    CREATE TABLE IF NOT EXISTS accuracy_events (
        id TEXT PRIMARY KEY,
        message_id TEXT NOT NULL,
        predicted_category TEXT NOT NULL,
        actual_category TEXT NOT NULL,
        confidence REAL NOT NULL,
        occurred_at TEXT NOT NULL,
        session_id TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_accuracy_events_occurred ON accuracy_events(occurred_at);
    CREATE INDEX IF NOT EXISTS idx_accuracy_events_message ON accuracy_events(message_id);

    CREATE TABLE IF NOT EXISTS accuracy_snapshots (
        message_id TEXT PRIMARY KEY,
        actual_category TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS user_settings (
        username TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
"#;

/// Create all tables and indexes idempotently.
///
/// Uses `CREATE TABLE IF NOT EXISTS` — safe to call on every startup.
pub async fn init_schema(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(SCHEMA)
        .await
        .map_err(|e| DatabaseError::Migration(format!("Schema initialization failed: {e}")))?;

    tracing::info!("Database schema initialized");
    Ok(())
}
