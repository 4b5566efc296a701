use super::*;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parley_core::session::{SessionRow, SessionStatus, SessionStore};
use parley_infrastructure::{InMemoryStore, PassthroughGateway, TracingBillingBackend};
use std::sync::Arc;

// SessionStore whose writes always fail
struct ReadOnlySessions {
    inner: Arc<InMemoryStore>,
}

#[async_trait]
impl SessionStore for ReadOnlySessions {
    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionRow>> {
        self.inner.list_sessions(user_id).await
    }

    async fn partner_profiles(&self, partner_ids: &[String]) -> Result<Vec<PartnerProfile>> {
        self.inner.partner_profiles(partner_ids).await
    }

    async fn presence(&self, partner_ids: &[String]) -> Result<HashMap<String, bool>> {
        self.inner.presence(partner_ids).await
    }

    async fn update_session(&self, _session_id: &str, _patch: SessionPatch) -> Result<()> {
        Err(ParleyError::persistence("read-only replica"))
    }
}

fn session(id: &str, earner: &str, started_secs_ago: i64) -> Session {
    Session {
        session_id: id.to_string(),
        conversation_id: format!("conv-{}", id),
        partner_id: earner.to_string(),
        payer_id: "payer".to_string(),
        earner_id: earner.to_string(),
        rate_per_minute: 10.0,
        earn_rate_per_minute: 6.0,
        started_at: Utc::now() - ChronoDuration::seconds(started_secs_ago),
        status: SessionStatus::Active,
        end_reason: None,
    }
}

fn collaborators(store: Arc<InMemoryStore>, sessions: Arc<dyn SessionStore>) -> Collaborators {
    Collaborators {
        sessions,
        messages: store.clone(),
        feed: store,
        gateway: Arc::new(PassthroughGateway::new()),
        billing: Arc::new(TracingBillingBackend::default()),
    }
}

fn manager(store: &Arc<InMemoryStore>, max_visible: usize) -> SessionWindowManager {
    let mut config = EngineConfig::default();
    config.windows.max_visible = max_visible;
    SessionWindowManager::new(
        "payer",
        "en".into(),
        config,
        collaborators(store.clone(), store.clone()),
    )
}

#[tokio::test(start_paused = true)]
async fn test_close_unknown_is_noop() {
    let store = Arc::new(InMemoryStore::new());
    let mut manager = manager(&store, 3);
    manager.start().await.unwrap();

    assert!(!manager.close("missing", EndReason::Closed).await);
    assert!(manager.drain_notices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_close_survives_persistence_failure() {
    let store = Arc::new(InMemoryStore::new());
    store.add_session(session("s1", "earner-a", 10));
    let sessions = Arc::new(ReadOnlySessions {
        inner: store.clone(),
    });
    let mut manager = SessionWindowManager::new(
        "payer",
        "en".into(),
        EngineConfig::default(),
        collaborators(store.clone(), sessions),
    );
    manager.start().await.unwrap();
    assert_eq!(manager.visible_count(), 1);

    assert!(manager.close("s1", EndReason::Closed).await);

    assert_eq!(manager.visible_count(), 0);
    // The row is still active remotely but must not come back.
    manager.force_refresh().await.unwrap();
    assert_eq!(manager.visible_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_least_recently_focused_is_evicted() {
    let store = Arc::new(InMemoryStore::new());
    store.add_session(session("s-a", "earner-a", 30));
    store.add_session(session("s-b", "earner-b", 20));
    let mut manager = manager(&store, 2);
    manager.start().await.unwrap();
    manager.focus("s-a").unwrap();

    store.add_session(session("s-c", "earner-c", 0));
    let report = manager.force_refresh().await.unwrap();

    assert_eq!(report.opened, vec!["s-c".to_string()]);
    assert_eq!(
        report.closed,
        vec![("s-b".to_string(), EndReason::CapacityEvicted)]
    );
    assert!(manager.runtime("s-a").is_some());
    assert_eq!(
        manager.drain_notices(),
        vec![WindowNotice {
            session_id: "s-b".to_string(),
            partner_id: "earner-b".to_string(),
            kind: NoticeKind::CapacityEvicted,
        }]
    );
    assert_eq!(
        store.session("s-b").and_then(|s| s.end_reason),
        Some(EndReason::CapacityEvicted)
    );
}

#[tokio::test(start_paused = true)]
async fn test_focus_orders_visible_windows() {
    let store = Arc::new(InMemoryStore::new());
    store.add_session(session("s-a", "earner-a", 30));
    store.add_session(session("s-b", "earner-b", 20));
    let mut manager = manager(&store, 3);
    manager.start().await.unwrap();

    let order: Vec<String> = manager.visible().into_iter().map(|w| w.session_id).collect();
    assert_eq!(order, vec!["s-a", "s-b"]);

    manager.focus("s-a").unwrap();
    let order: Vec<String> = manager.visible().into_iter().map(|w| w.session_id).collect();
    assert_eq!(order, vec!["s-b", "s-a"]);

    assert!(manager.focus("missing").unwrap_err().is_not_found());
}

#[test]
fn test_latest_per_partner_keeps_newest() {
    let old = session("s-old", "earner-a", 60);
    let new = session("s-new", "earner-a", 5);
    let other = session("s-other", "earner-b", 30);

    let latest = latest_per_partner(vec![new.clone(), old, other]);

    assert_eq!(latest.len(), 2);
    assert_eq!(latest["earner-a"].session_id, "s-new");
}
