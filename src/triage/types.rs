//! Classification types — the closed category enum and the classification
//! record attached to a message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Actionable categories — a closed set of exactly nine values.
///
/// Values outside this set coming back from the model are treated as
/// extraction failures, never silently accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    RequiredPersonalAction,
    TeamAction,
    OptionalAction,
    JobListing,
    OptionalEvent,
    WorkRelevant,
    Fyi,
    Newsletter,
    SpamToDelete,
}

impl Category {
    /// All categories, in display order.
    pub const ALL: [Category; 9] = [
        Category::RequiredPersonalAction,
        Category::TeamAction,
        Category::OptionalAction,
        Category::JobListing,
        Category::OptionalEvent,
        Category::WorkRelevant,
        Category::Fyi,
        Category::Newsletter,
        Category::SpamToDelete,
    ];

    /// Stable snake_case label, used in prompts, logs, and task ids.
    pub fn label(&self) -> &'static str {
        match self {
            Self::RequiredPersonalAction => "required_personal_action",
            Self::TeamAction => "team_action",
            Self::OptionalAction => "optional_action",
            Self::JobListing => "job_listing",
            Self::OptionalEvent => "optional_event",
            Self::WorkRelevant => "work_relevant",
            Self::Fyi => "fyi",
            Self::Newsletter => "newsletter",
            Self::SpamToDelete => "spam_to_delete",
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.label() == s.trim())
            .ok_or_else(|| format!("unknown category: '{s}'"))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle status of a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationStatus {
    Pending,
    Classifying,
    Classified,
    Error,
    ContentFiltered,
}

impl ClassificationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Classifying => "classifying",
            Self::Classified => "classified",
            Self::Error => "error",
            Self::ContentFiltered => "content_filtered",
        }
    }
}

/// A message's current classification.
///
/// At most one current classification per `(message, model_version)`;
/// history lives in the accuracy ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub message_id: String,
    pub category: Category,
    /// Model confidence in `[0, 1]`. `0.5` is the unknown sentinel used
    /// when the model omits a confidence.
    pub confidence: f64,
    pub reasoning: String,
    pub one_line_summary: String,
    pub model_version: String,
    pub predicted_at: DateTime<Utc>,
    pub status: ClassificationStatus,
    /// Gateway error label when `status == Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl Classification {
    /// Integer percent for display: `round(confidence * 100)`.
    pub fn confidence_percent(&self) -> u8 {
        (self.confidence * 100.0).round().clamp(0.0, 100.0) as u8
    }
}
