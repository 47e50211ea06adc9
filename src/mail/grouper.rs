//! Conversation grouping — pure, streaming-safe, no I/O.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::mail::types::Message;

/// A transient grouping of messages sharing a conversation key.
///
/// Built on demand during a pipeline run and dropped afterwards; messages
/// keep no back-pointer to their conversation.
#[derive(Debug, Clone)]
pub struct Conversation {
    /// Grouping key (provider conversation id or `single:<message_id>`).
    pub key: String,
    /// Messages ordered by `received_at` descending.
    pub messages: Vec<Message>,
    /// `received_at` of the newest message.
    pub latest_at: DateTime<Utc>,
}

impl Conversation {
    /// The single representative: the newest message. Its label propagates
    /// to all siblings.
    pub fn representative(&self) -> &Message {
        &self.messages[0]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Group messages into conversations, newest `latest_at` first.
///
/// Within a conversation, messages are ordered by `received_at` descending
/// with ties broken by lexicographically greatest id, so the representative
/// is deterministic for any input order.
pub fn group_conversations(messages: Vec<Message>) -> Vec<Conversation> {
    let mut groups: HashMap<String, Vec<Message>> = HashMap::new();
    for message in messages {
        groups
            .entry(message.conversation_key())
            .or_default()
            .push(message);
    }

    let mut conversations: Vec<Conversation> = groups
        .into_iter()
        .map(|(key, mut messages)| {
            messages.sort_by(|a, b| {
                b.received_at
                    .cmp(&a.received_at)
                    .then_with(|| b.id.cmp(&a.id))
            });
            let latest_at = messages[0].received_at;
            Conversation {
                key,
                messages,
                latest_at,
            }
        })
        .collect();

    conversations.sort_by(|a, b| {
        b.latest_at
            .cmp(&a.latest_at)
            .then_with(|| b.key.cmp(&a.key))
    });
    conversations
}
