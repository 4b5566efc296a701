//! In-memory event-sourced store.
//!
//! Implements `SessionStore`, `MessageStore` and `EventFeed` over one shared
//! state so that every write is echoed on the feed the way the realtime
//! backend does it. Used by the `simulate` command and by integration tests.

use async_trait::async_trait;
use chrono::Utc;
use parley_core::error::{ParleyError, Result};
use parley_core::feed::{EventFeed, FeedEvent, FeedRecord, FeedSubscription, PresenceRecord, Topic};
use parley_core::message::{MessageRecord, MessageStore, NewMessage, PersistedMessage};
use parley_core::session::{PartnerProfile, Session, SessionPatch, SessionRow, SessionStore};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

#[derive(Default)]
struct StoreState {
    sessions: Vec<Session>,
    profiles: HashMap<String, PartnerProfile>,
    presence: HashMap<String, bool>,
    messages: Vec<MessageRecord>,
    subscribers: HashMap<Topic, Vec<mpsc::UnboundedSender<FeedEvent>>>,
    failing_inserts: usize,
    duplicate_delivery: bool,
    next_message_id: u64,
}

impl StoreState {
    fn publish(&mut self, topic: &Topic, event: FeedEvent) {
        let copies = if self.duplicate_delivery { 2 } else { 1 };
        if let Some(senders) = self.subscribers.get_mut(topic) {
            senders.retain(|sender| !sender.is_closed());
            for sender in senders.iter() {
                for _ in 0..copies {
                    let _ = sender.send(event.clone());
                }
            }
        }
    }

    fn publish_session(&mut self, op_insert: bool, session: &Session) {
        let event = |s: &Session| {
            if op_insert {
                FeedEvent::insert(FeedRecord::Session(s.clone()))
            } else {
                FeedEvent::update(FeedRecord::Session(s.clone()))
            }
        };
        self.publish(&Topic::Conversation(session.conversation_id.clone()), event(session));
        for user in [session.payer_id.clone(), session.earner_id.clone()] {
            let relative = relative_to(session, &user);
            self.publish(&Topic::User(user), event(&relative));
        }
    }

    fn earner_has_messaged(&self, session: &Session) -> bool {
        self.messages.iter().any(|m| {
            m.conversation_id == session.conversation_id && m.sender_id == session.earner_id
        })
    }
}

/// A copy of `session` with `partner_id` set relative to `viewer_id`.
fn relative_to(session: &Session, viewer_id: &str) -> Session {
    let mut relative = session.clone();
    relative.partner_id = if session.payer_id == viewer_id {
        session.earner_id.clone()
    } else {
        session.payer_id.clone()
    };
    relative
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a session row, as matchmaking would, and announces it.
    pub fn add_session(&self, session: Session) {
        let mut state = self.state();
        state.publish_session(true, &session);
        state.sessions.push(session);
    }

    pub fn set_profile(&self, profile: PartnerProfile) {
        self.state()
            .profiles
            .insert(profile.partner_id.clone(), profile);
    }

    /// Updates presence and notifies everyone sharing a session with `user_id`.
    pub fn set_presence(&self, user_id: &str, online: bool) {
        let mut state = self.state();
        state.presence.insert(user_id.to_string(), online);

        let watchers: Vec<String> = state
            .sessions
            .iter()
            .filter_map(|s| {
                if s.payer_id == user_id {
                    Some(s.earner_id.clone())
                } else if s.earner_id == user_id {
                    Some(s.payer_id.clone())
                } else {
                    None
                }
            })
            .collect();
        let record = PresenceRecord {
            user_id: user_id.to_string(),
            online,
        };
        for watcher in watchers {
            state.publish(
                &Topic::User(watcher),
                FeedEvent::update(FeedRecord::Presence(record.clone())),
            );
        }
    }

    /// Makes the next `count` inserts fail with a persistence error.
    pub fn fail_next_inserts(&self, count: usize) {
        self.state().failing_inserts = count;
    }

    /// Delivers every notification twice from now on.
    pub fn set_duplicate_delivery(&self, enabled: bool) {
        self.state().duplicate_delivery = enabled;
    }

    /// Publishes a raw notification on a topic.
    pub fn publish(&self, topic: &Topic, event: FeedEvent) {
        self.state().publish(topic, event);
    }

    /// Appends a message written by someone else (e.g. the partner's
    /// client) and echoes it.
    pub fn inject_message(&self, record: MessageRecord) {
        let mut state = self.state();
        let topic = Topic::Conversation(record.conversation_id.clone());
        state.messages.push(record.clone());
        state.publish(&topic, FeedEvent::insert(FeedRecord::Message(record)));
    }

    pub fn messages(&self, conversation_id: &str) -> Vec<MessageRecord> {
        self.state()
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.state()
            .sessions
            .iter()
            .find(|s| s.session_id == session_id)
            .cloned()
    }

    /// Number of live subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.state()
            .subscribers
            .get(topic)
            .map(|senders| senders.iter().filter(|s| !s.is_closed()).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionRow>> {
        let state = self.state();
        Ok(state
            .sessions
            .iter()
            .filter(|s| s.is_active() && (s.payer_id == user_id || s.earner_id == user_id))
            .map(|s| SessionRow {
                session: relative_to(s, user_id),
                earner_has_messaged: state.earner_has_messaged(s),
            })
            .collect())
    }

    async fn partner_profiles(&self, partner_ids: &[String]) -> Result<Vec<PartnerProfile>> {
        let state = self.state();
        Ok(partner_ids
            .iter()
            .filter_map(|id| state.profiles.get(id).cloned())
            .collect())
    }

    async fn presence(&self, partner_ids: &[String]) -> Result<HashMap<String, bool>> {
        let state = self.state();
        Ok(partner_ids
            .iter()
            .filter_map(|id| state.presence.get(id).map(|online| (id.clone(), *online)))
            .collect())
    }

    async fn update_session(&self, session_id: &str, patch: SessionPatch) -> Result<()> {
        let mut state = self.state();
        let session = state
            .sessions
            .iter_mut()
            .find(|s| s.session_id == session_id)
            .ok_or_else(|| ParleyError::not_found("session", session_id))?;
        session.status = patch.status;
        session.end_reason = patch.end_reason;
        let updated = session.clone();
        state.publish_session(false, &updated);
        Ok(())
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn insert_message(&self, message: NewMessage) -> Result<PersistedMessage> {
        let mut state = self.state();
        if state.failing_inserts > 0 {
            state.failing_inserts -= 1;
            return Err(ParleyError::persistence("simulated network failure"));
        }

        state.next_message_id += 1;
        let record = MessageRecord {
            id: format!("msg-{}", state.next_message_id),
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            raw_text: message.raw_text,
            receiver_view: message.receiver_view,
            english_core: message.english_core,
            created_at: Utc::now(),
        };

        let first_earner_message = state
            .sessions
            .iter()
            .find(|s| s.conversation_id == record.conversation_id && s.earner_id == record.sender_id)
            .filter(|s| !state.earner_has_messaged(s))
            .cloned();

        state.messages.push(record.clone());
        let persisted = PersistedMessage {
            id: record.id.clone(),
            created_at: record.created_at,
        };
        let topic = Topic::Conversation(record.conversation_id.clone());
        state.publish(&topic, FeedEvent::insert(FeedRecord::Message(record)));

        // The acceptance predicate of the earner's manager depends on this.
        if let Some(session) = first_earner_message {
            state.publish_session(false, &session);
        }

        Ok(persisted)
    }
}

#[async_trait]
impl EventFeed for InMemoryStore {
    async fn subscribe(&self, topic: Topic) -> Result<FeedSubscription> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.state()
            .subscribers
            .entry(topic.clone())
            .or_default()
            .push(sender);
        Ok(FeedSubscription::new(topic, receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::session::{EndReason, SessionStatus};

    fn session(id: &str, payer: &str, earner: &str) -> Session {
        Session {
            session_id: id.to_string(),
            conversation_id: format!("conv-{}", id),
            partner_id: earner.to_string(),
            payer_id: payer.to_string(),
            earner_id: earner.to_string(),
            rate_per_minute: 10.0,
            earn_rate_per_minute: 6.0,
            started_at: Utc::now(),
            status: SessionStatus::Active,
            end_reason: None,
        }
    }

    fn new_message(conversation: &str, sender: &str, receiver: &str, text: &str) -> NewMessage {
        NewMessage {
            conversation_id: conversation.to_string(),
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            raw_text: text.to_string(),
            receiver_view: None,
            english_core: None,
        }
    }

    #[tokio::test]
    async fn test_list_sessions_is_relative_to_viewer() {
        let store = InMemoryStore::new();
        store.add_session(session("s1", "payer", "earner"));

        let as_payer = store.list_sessions("payer").await.unwrap();
        assert_eq!(as_payer[0].session.partner_id, "earner");
        let as_earner = store.list_sessions("earner").await.unwrap();
        assert_eq!(as_earner[0].session.partner_id, "payer");
        assert!(!as_earner[0].earner_has_messaged);
    }

    #[tokio::test]
    async fn test_insert_echoes_on_conversation_topic() {
        let store = InMemoryStore::new();
        store.add_session(session("s1", "payer", "earner"));
        let mut sub = store
            .subscribe(Topic::Conversation("conv-s1".to_string()))
            .await
            .unwrap();

        let persisted = store
            .insert_message(new_message("conv-s1", "earner", "payer", "hi"))
            .await
            .unwrap();

        match sub.recv().await.unwrap().record {
            FeedRecord::Message(record) => assert_eq!(record.id, persisted.id),
            other => panic!("unexpected record: {:?}", other),
        }
        let rows = store.list_sessions("earner").await.unwrap();
        assert!(rows[0].earner_has_messaged);
    }

    #[tokio::test]
    async fn test_failing_inserts() {
        let store = InMemoryStore::new();
        store.fail_next_inserts(1);
        let first = store
            .insert_message(new_message("c", "a", "b", "hello"))
            .await;
        assert!(matches!(first, Err(ParleyError::Persistence { .. })));
        assert!(store.insert_message(new_message("c", "a", "b", "hello")).await.is_ok());
        assert_eq!(store.messages("c").len(), 1);
    }

    #[tokio::test]
    async fn test_update_session_hides_ended_rows() {
        let store = InMemoryStore::new();
        store.add_session(session("s1", "payer", "earner"));
        store
            .update_session("s1", SessionPatch::ended(EndReason::Closed))
            .await
            .unwrap();
        assert!(store.list_sessions("payer").await.unwrap().is_empty());
        assert_eq!(
            store.session("s1").unwrap().end_reason,
            Some(EndReason::Closed)
        );
        assert!(store
            .update_session("missing", SessionPatch::ended(EndReason::Closed))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let store = InMemoryStore::new();
        let topic = Topic::User("payer".to_string());
        let sub = store.subscribe(topic.clone()).await.unwrap();
        assert_eq!(store.subscriber_count(&topic), 1);
        drop(sub);
        assert_eq!(store.subscriber_count(&topic), 0);
    }
}
