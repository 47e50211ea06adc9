//! Message and folder types — immutable records of provider email.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider-reported importance flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Low,
    #[default]
    Normal,
    High,
}

/// Immutable record of an email fetched from the provider.
///
/// The provider is the authoritative store; this is a cache-only copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Provider-unique ID.
    pub id: String,
    /// Provider conversation/thread ID. `None` or empty → the message is
    /// grouped under the synthetic key `single:<id>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Subject line.
    pub subject: String,
    /// Sender address.
    pub sender: String,
    /// Recipient addresses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<String>,
    /// When the message was received (UTC).
    pub received_at: DateTime<Utc>,
    /// Plain-text body.
    pub body_text: String,
    /// HTML body, if the provider supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_html: Option<String>,
    /// Whether the message carries attachments.
    #[serde(default)]
    pub has_attachments: bool,
    /// Provider importance flag.
    #[serde(default)]
    pub importance: Importance,
    /// Folder the message was fetched from.
    pub folder: String,
}

impl Message {
    /// Grouping key: the conversation id when present and non-empty, else
    /// the synthetic `single:<id>` key.
    pub fn conversation_key(&self) -> String {
        match self.conversation_id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("single:{}", self.id),
        }
    }

    /// First recipient, for prompt substitution. Falls back to empty.
    pub fn primary_recipient(&self) -> &str {
        self.recipients.first().map(String::as_str).unwrap_or("")
    }
}

/// A mail folder as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    /// Provider-unique folder ID.
    pub id: String,
    /// Display name (e.g. "Inbox", "Deleted Items").
    pub name: String,
    /// Unread message count, if the provider reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, conversation_id: Option<&str>) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: conversation_id.map(String::from),
            subject: "Test".into(),
            sender: "alice@example.com".into(),
            recipients: vec!["me@example.com".into()],
            received_at: Utc::now(),
            body_text: "body".into(),
            body_html: None,
            has_attachments: false,
            importance: Importance::Normal,
            folder: "Inbox".into(),
        }
    }

    #[test]
    fn conversation_key_uses_provider_id() {
        let msg = message("M1", Some("conv-7"));
        assert_eq!(msg.conversation_key(), "conv-7");
    }

    #[test]
    fn conversation_key_synthesized_when_missing() {
        let msg = message("M1", None);
        assert_eq!(msg.conversation_key(), "single:M1");
    }

    #[test]
    fn conversation_key_synthesized_when_empty() {
        let msg = message("M2", Some(""));
        assert_eq!(msg.conversation_key(), "single:M2");
    }

    #[test]
    fn primary_recipient_falls_back_to_empty() {
        let mut msg = message("M1", None);
        msg.recipients.clear();
        assert_eq!(msg.primary_recipient(), "");
    }

    #[test]
    fn message_deserializes_with_defaults() {
        let json = r#"{
            "id": "M1",
            "subject": "Hi",
            "sender": "a@x.com",
            "received_at": "2026-02-15T10:00:00Z",
            "body_text": "hello",
            "folder": "Inbox"
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert!(msg.conversation_id.is_none());
        assert!(!msg.has_attachments);
        assert_eq!(msg.importance, Importance::Normal);
    }
}
