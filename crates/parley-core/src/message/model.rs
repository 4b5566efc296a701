//! Chat message types.
//!
//! `Message` is the pipeline's view of a chat line (possibly still a local
//! placeholder); `MessageRecord` is the authoritative row delivered by the
//! event feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of a message on screen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MessageId {
    /// Assigned locally when the message is sent, before persistence.
    Local(String),
    /// Assigned by the server once the message is persisted.
    Server(String),
}

impl MessageId {
    /// A fresh placeholder id.
    pub fn placeholder() -> Self {
        Self::Local(format!("local-{}", Uuid::new_v4()))
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Local(id) | Self::Server(id) => id,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One chat line as shown in a session window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: String,
    /// What was actually transmitted
    pub raw_text: String,
    /// Language-neutral semantic anchor
    #[serde(default)]
    pub english_core: Option<String>,
    /// Text shown to the sender
    pub sender_view: String,
    /// Text shown to the receiver, in their mother tongue
    #[serde(default)]
    pub receiver_view: Option<String>,
    /// Translated views are still being resolved
    #[serde(default)]
    pub is_enriching: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Primary display text used for content matching.
    pub fn primary_text(&self) -> &str {
        self.raw_text.trim()
    }

    /// The text the viewer should see for this message.
    pub fn display_text(&self, viewer_id: &str) -> &str {
        if self.sender_id == viewer_id {
            &self.sender_view
        } else {
            self.receiver_view.as_deref().unwrap_or(&self.raw_text)
        }
    }
}

/// The authoritative stored message, as carried by the event feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub raw_text: String,
    #[serde(default)]
    pub receiver_view: Option<String>,
    #[serde(default)]
    pub english_core: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Outbound persistence request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub raw_text: String,
    pub receiver_view: Option<String>,
    pub english_core: Option<String>,
}

/// What the store hands back after a successful insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedMessage {
    pub id: String,
    pub created_at: DateTime<Utc>,
}
