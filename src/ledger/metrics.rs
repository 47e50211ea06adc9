//! Pure precision/recall/F1 computation over accuracy events.

use std::collections::HashMap;

use serde::Serialize;

use crate::ledger::AccuracyEvent;
use crate::triage::Category;

/// Per-category confusion counts and derived rates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub tp: u64,
    pub fp: u64,
    #[serde(rename = "fn")]
    pub fn_count: u64,
}

/// Rolling metrics over a window of accuracy events.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunningMetrics {
    pub per_category: HashMap<Category, CategoryMetrics>,
    pub overall_accuracy: f64,
    /// Distinct messages contributing to the window.
    pub total: u64,
}

/// Compute rolling metrics from events within a window.
///
/// For each message only its latest event counts: a prediction with no
/// later correction is a TP for its category; a corrected prediction is
/// an FP for the predicted category and an FN for the corrected-to
/// category. Zero denominators yield `0.0`, never NaN. Pure — identical
/// input always produces identical output.
pub fn compute_metrics(events: &[AccuracyEvent]) -> RunningMetrics {
    // Latest event per message wins. Events arrive oldest-first; on equal
    // timestamps the later append wins.
    let mut latest: HashMap<&str, &AccuracyEvent> = HashMap::new();
    for event in events {
        match latest.get(event.message_id.as_str()) {
            Some(existing) if existing.occurred_at > event.occurred_at => {}
            _ => {
                latest.insert(&event.message_id, event);
            }
        }
    }

    let mut counts: HashMap<Category, CategoryMetrics> = HashMap::new();
    let mut true_positives = 0u64;
    for event in latest.values() {
        if event.predicted_category == event.actual_category {
            counts.entry(event.predicted_category).or_default().tp += 1;
            true_positives += 1;
        } else {
            counts.entry(event.predicted_category).or_default().fp += 1;
            counts.entry(event.actual_category).or_default().fn_count += 1;
        }
    }

    for metrics in counts.values_mut() {
        metrics.precision = ratio(metrics.tp, metrics.tp + metrics.fp);
        metrics.recall = ratio(metrics.tp, metrics.tp + metrics.fn_count);
        metrics.f1 = if metrics.precision + metrics.recall > 0.0 {
            2.0 * metrics.precision * metrics.recall / (metrics.precision + metrics.recall)
        } else {
            0.0
        };
    }

    let total = latest.len() as u64;
    RunningMetrics {
        per_category: counts,
        overall_accuracy: ratio(true_positives, total),
        total,
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
