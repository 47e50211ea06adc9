//! Confirmed-example store for few-shot augmentation.
//!
//! Prior classifications count as confirmed when the accuracy snapshot
//! still agrees with the prediction — a correction in the ledger removes
//! a message from the candidate pool.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::error::DatabaseError;
use crate::store::Database;
use crate::triage::Classification;

/// How many recent classifications to consider before ranking.
const CANDIDATE_POOL: usize = 50;

/// Words too common to signal topical overlap.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "you", "your", "this", "that", "from", "are", "was", "have",
    "has", "will", "not", "can", "please", "about", "all", "our", "out", "any",
];

pub struct ExampleStore {
    db: Arc<dyn Database>,
}

impl ExampleStore {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Select up to `limit` confirmed prior classifications ranked by
    /// keyword overlap with `query_text`. Zero-overlap candidates are
    /// dropped entirely.
    pub async fn select(
        &self,
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<Classification>, DatabaseError> {
        let candidates = self.db.list_recent_classified(CANDIDATE_POOL).await?;
        let query_keywords = keywords(query_text);

        let mut scored = Vec::new();
        for candidate in candidates {
            // A corrected prediction is not a usable example.
            if let Some(actual) = self
                .db
                .get_accuracy_snapshot(&candidate.message_id)
                .await?
                && actual != candidate.category
            {
                continue;
            }

            let example_text = format!("{} {}", candidate.one_line_summary, candidate.reasoning);
            let score = query_keywords.intersection(&keywords(&example_text)).count();
            if score > 0 {
                scored.push((score, candidate));
            }
        }

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.truncate(limit);
        debug!(selected = scored.len(), "Few-shot examples selected");
        Ok(scored.into_iter().map(|(_, c)| c).collect())
    }

    /// Render examples as a prompt block, or an empty string when there
    /// are none.
    pub fn render_block(examples: &[Classification]) -> String {
        if examples.is_empty() {
            return String::new();
        }
        let mut block = String::from("Previously confirmed classifications:\n");
        for example in examples {
            block.push_str(&format!(
                "- \"{}\" -> {}\n",
                example.one_line_summary,
                example.category.label()
            ));
        }
        block
    }
}

fn keywords(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.len() >= 3 && !STOPWORDS.contains(word))
        .map(String::from)
        .collect()
}
