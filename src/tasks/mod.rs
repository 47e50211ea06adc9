//! Task materialization — the task/resolution model and the
//! category-conditioned artifact extractor.

pub mod extractor;
pub mod links;
pub mod model;

pub use extractor::Extractor;
pub use links::extract_links;
pub use model::{Priority, Resolution, ResolutionType, Task, TaskStatus};
