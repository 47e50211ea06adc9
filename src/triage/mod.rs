//! Triage — classification types, the classification engine, and the
//! confirmed-example store used for few-shot selection.

pub mod classifier;
pub mod examples;
pub mod types;

pub use classifier::Classifier;
pub use examples::ExampleStore;
pub use types::{Category, Classification, ClassificationStatus};
