#![allow(dead_code)]

use chrono::{Duration as ChronoDuration, Utc};
use parley_application::session::StepOutcome;
use parley_application::{Collaborators, SessionWindowManager};
use parley_core::config::EngineConfig;
use parley_core::session::{EndReason, PartnerProfile, Session, SessionStatus};
use parley_infrastructure::{InMemoryStore, PassthroughGateway, TracingBillingBackend};
use std::sync::Arc;
use std::time::Duration;

/// In-memory backend shared by every participant of a test.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub gateway: Arc<PassthroughGateway>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryStore::new()),
            gateway: Arc::new(PassthroughGateway::new()),
        }
    }

    pub fn collaborators(&self, billing: Arc<TracingBillingBackend>) -> Collaborators {
        Collaborators {
            sessions: self.store.clone(),
            messages: self.store.clone(),
            feed: self.store.clone(),
            gateway: self.gateway.clone(),
            billing,
        }
    }

    /// A manager for `user_id` with its own billing backend.
    pub fn manager(
        &self,
        user_id: &str,
        lang: &str,
        config: EngineConfig,
    ) -> (SessionWindowManager, Arc<TracingBillingBackend>) {
        let billing = Arc::new(TracingBillingBackend::default());
        let manager = SessionWindowManager::new(
            user_id,
            lang.into(),
            config,
            self.collaborators(billing.clone()),
        );
        (manager, billing)
    }

    pub fn user(&self, user_id: &str, name: &str, lang: &str) {
        self.store.set_profile(PartnerProfile {
            partner_id: user_id.to_string(),
            display_name: name.to_string(),
            mother_tongue: lang.into(),
        });
    }

    /// Adds an active session that started `started_secs_ago` seconds ago.
    pub fn session(&self, id: &str, payer: &str, earner: &str, started_secs_ago: i64) -> Session {
        let session = Session {
            session_id: id.to_string(),
            conversation_id: format!("conv-{}", id),
            partner_id: earner.to_string(),
            payer_id: payer.to_string(),
            earner_id: earner.to_string(),
            rate_per_minute: 10.0,
            earn_rate_per_minute: 6.0,
            started_at: Utc::now() - ChronoDuration::seconds(started_secs_ago),
            status: SessionStatus::Active,
            end_reason: None,
        };
        self.store.add_session(session.clone());
        session
    }
}

pub fn config_with_max_visible(max_visible: usize) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.windows.max_visible = max_visible;
    config
}

/// Lets spawned tasks drain their queues.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Steps the manager until it closes a window.
pub async fn step_until_closed(manager: &mut SessionWindowManager) -> (String, EndReason) {
    for _ in 0..20 {
        if let StepOutcome::Closed {
            session_id,
            reason,
            was_open: true,
        } = manager.step().await.unwrap()
        {
            return (session_id, reason);
        }
    }
    panic!("no window was closed");
}
