//! Task data model — materialized artifacts, lifecycle, and resolutions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::triage::Category;

/// Fixed namespace for deterministic task ids. Re-running extraction for
/// the same `(message, category, extractor_version)` triple always lands
/// on the same id.
const TASK_ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x8e, 0x41, 0xa6, 0x2b, 0x5c, 0x19, 0x4f, 0x0d, 0x9a, 0x77, 0x3d, 0xe2, 0x61, 0x0b, 0xc4,
    0x55,
]);

/// Task display priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn label(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Task lifecycle status. Forward-only (`todo → in_progress → done`);
/// the only way back to `todo` is an explicit user reopen, recorded as a
/// `reopened` resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }

    /// Whether moving to `next` is a legal forward transition.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Todo, TaskStatus::InProgress)
                | (Self::Todo, TaskStatus::Done)
                | (Self::InProgress, TaskStatus::Done)
        )
    }
}

/// A materialized artifact extracted from a classified message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Deterministic id: UUID v5 over
    /// `(source_message_id, category, extractor_version)`.
    pub id: Uuid,
    pub source_message_id: String,
    pub category: Category,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: TaskStatus,
    /// Category-specific payload: `key_points[]`, `links[]`,
    /// `action_items[]`, `due_date`, `relevance`, …
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Latest resolution, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
}

impl Task {
    /// Derive the deterministic id for a task.
    pub fn derive_id(source_message_id: &str, category: Category, extractor_version: &str) -> Uuid {
        let key = format!("{source_message_id}\n{}\n{extractor_version}", category.label());
        Uuid::new_v5(&TASK_ID_NAMESPACE, key.as_bytes())
    }

    /// Create a new task with a derived id and `todo` status.
    pub fn new(
        source_message_id: impl Into<String>,
        category: Category,
        extractor_version: &str,
        title: impl Into<String>,
        priority: Priority,
    ) -> Self {
        let source_message_id = source_message_id.into();
        let now = Utc::now();
        Self {
            id: Self::derive_id(&source_message_id, category, extractor_version),
            source_message_id,
            category,
            title: title.into(),
            description: String::new(),
            priority,
            status: TaskStatus::Todo,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
            resolution: None,
        }
    }

    /// Builder: set description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder: set metadata payload.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// How a task left (or re-entered) the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionType {
    Completed,
    Dismissed,
    Deferred,
    Reopened,
}

impl ResolutionType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Dismissed => "dismissed",
            Self::Deferred => "deferred",
            Self::Reopened => "reopened",
        }
    }
}

impl std::str::FromStr for ResolutionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "dismissed" => Ok(Self::Dismissed),
            "deferred" => Ok(Self::Deferred),
            "reopened" => Ok(Self::Reopened),
            other => Err(format!("unknown resolution type: '{other}'")),
        }
    }
}

/// A lifecycle event recorded when the user resolves (or reopens) a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub task_id: Uuid,
    pub resolution_type: ResolutionType,
    #[serde(default)]
    pub resolution_notes: String,
    pub resolved_at: DateTime<Utc>,
    /// Age of the task at resolution time, in whole days.
    pub task_age_days: i64,
}
