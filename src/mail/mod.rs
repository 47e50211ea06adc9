//! Mail domain — message types, the provider seam, and conversation grouping.

pub mod grouper;
pub mod provider;
pub mod types;

pub use grouper::{Conversation, group_conversations};
pub use provider::{EmailProvider, FileProvider};
pub use types::{Folder, Importance, Message};
