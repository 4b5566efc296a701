//! Realtime event feed types and subscription trait.
//!
//! The feed is partitioned by topic and delivers at-least-once. Consumers
//! dedupe by record id. Within one topic records arrive in persistence
//! order; across topics nothing is guaranteed.

use crate::error::Result;
use crate::message::MessageRecord;
use crate::session::Session;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// A feed partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Topic {
    /// Message rows and the session row of one conversation
    Conversation(String),
    /// Session rows and partner presence relevant to one user
    User(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedOp {
    Insert,
    Update,
}

/// Partner presence change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user_id: String,
    pub online: bool,
}

/// The row carried by a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", content = "payload", rename_all = "snake_case")]
pub enum FeedRecord {
    Message(MessageRecord),
    Session(Session),
    Presence(PresenceRecord),
}

/// One notification from the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEvent {
    pub op: FeedOp,
    pub record: FeedRecord,
}

impl FeedEvent {
    pub fn insert(record: FeedRecord) -> Self {
        Self {
            op: FeedOp::Insert,
            record,
        }
    }

    pub fn update(record: FeedRecord) -> Self {
        Self {
            op: FeedOp::Update,
            record,
        }
    }
}

/// A live subscription to one topic.
///
/// Dropping the subscription unsubscribes.
#[derive(Debug)]
pub struct FeedSubscription {
    topic: Topic,
    receiver: mpsc::UnboundedReceiver<FeedEvent>,
}

impl FeedSubscription {
    pub fn new(topic: Topic, receiver: mpsc::UnboundedReceiver<FeedEvent>) -> Self {
        Self { topic, receiver }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Next notification, or `None` once the feed side has gone away.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.receiver.recv().await
    }
}

/// The realtime transport.
#[async_trait]
pub trait EventFeed: Send + Sync {
    async fn subscribe(&self, topic: Topic) -> Result<FeedSubscription>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_event_wire_shape() {
        let event = FeedEvent::update(FeedRecord::Presence(PresenceRecord {
            user_id: "u-1".to_string(),
            online: false,
        }));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["op"], "update");
        assert_eq!(json["record"]["table"], "presence");
        assert_eq!(json["record"]["payload"]["online"], false);
    }
}
