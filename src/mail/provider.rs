//! Email provider seam — pure I/O, no triage logic.
//!
//! Production bindings (Outlook COM, Microsoft Graph) live outside this
//! crate; `FileProvider` reads a JSON inbox file so the binary and tests
//! can exercise the full pipeline without a live mailbox.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::ProviderError;
use crate::mail::types::{Folder, Message};

/// Capability set the pipeline requires from an email backend.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// List messages in a folder, newest first, up to `limit`.
    async fn list_conversations(
        &self,
        folder: &str,
        limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>, ProviderError>;

    /// Fetch a single message by provider id.
    async fn get_message(&self, id: &str) -> Result<Message, ProviderError>;

    /// Mark a message as read.
    async fn mark_as_read(&self, id: &str) -> Result<(), ProviderError>;

    /// Move a message to another folder.
    async fn move_message(&self, id: &str, destination_folder: &str)
    -> Result<(), ProviderError>;

    /// List available folders.
    async fn list_folders(&self) -> Result<Vec<Folder>, ProviderError>;
}

/// File-backed provider — reads a JSON array of [`Message`] records.
///
/// Read-only: `mark_as_read` and `move_message` are logged no-ops.
pub struct FileProvider {
    path: PathBuf,
}

impl FileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<Vec<Message>, ProviderError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        serde_json::from_str(&raw)
            .map_err(|e| ProviderError::RequestFailed(format!("invalid inbox file: {e}")))
    }
}

#[async_trait]
impl EmailProvider for FileProvider {
    async fn list_conversations(
        &self,
        folder: &str,
        limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>, ProviderError> {
        let mut messages: Vec<Message> = self
            .load()
            .await?
            .into_iter()
            .filter(|m| m.folder == folder)
            .filter(|m| since.is_none_or(|cutoff| m.received_at >= cutoff))
            .collect();
        messages.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        messages.truncate(limit);
        Ok(messages)
    }

    async fn get_message(&self, id: &str) -> Result<Message, ProviderError> {
        self.load()
            .await?
            .into_iter()
            .find(|m| m.id == id)
            .ok_or_else(|| ProviderError::MessageNotFound(id.to_string()))
    }

    async fn mark_as_read(&self, id: &str) -> Result<(), ProviderError> {
        info!(id, "mark_as_read is a no-op for file-backed inboxes");
        Ok(())
    }

    async fn move_message(
        &self,
        id: &str,
        destination_folder: &str,
    ) -> Result<(), ProviderError> {
        info!(id, destination_folder, "move is a no-op for file-backed inboxes");
        Ok(())
    }

    async fn list_folders(&self) -> Result<Vec<Folder>, ProviderError> {
        let mut names: Vec<String> = self.load().await?.into_iter().map(|m| m.folder).collect();
        names.sort();
        names.dedup();
        Ok(names
            .into_iter()
            .map(|name| Folder {
                id: name.clone(),
                name,
                unread_count: None,
            })
            .collect())
    }
}
