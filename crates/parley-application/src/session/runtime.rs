//! Runtime of one visible session.
//!
//! Bundles the message pipeline and the billing runtime of a session and
//! pumps the conversation feed into them. Everything started here is tied
//! to one cancellation token, so shutting the runtime down drops the feed
//! subscription and abandons in-flight enrichment.

use crate::billing::BillingRuntime;
use crate::context::{CloseRequest, Collaborators, ConversationContext};
use crate::message::MessagePipeline;
use crate::translation::{LivePreview, TranslationAdapter};
use parley_core::billing::{BillingPolicy, BillingSnapshot, BillingState, WalletSnapshot};
use parley_core::config::EngineConfig;
use parley_core::error::Result;
use parley_core::feed::{FeedRecord, FeedSubscription, Topic};
use parley_core::message::{Message, MessageId};
use parley_core::session::{EndReason, Session};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Everything the UI renders for one session window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub partner_id: String,
    pub messages: Vec<Message>,
    pub billing_state: BillingState,
    pub elapsed_seconds: u64,
    /// Amount the payer owes so far
    pub estimated_cost: f64,
    /// Amount the earner made so far
    pub estimated_earning: f64,
    /// Countdown to pause while the inactivity warning shows
    pub inactivity_warning: Option<Duration>,
    pub wallet: Option<WalletSnapshot>,
}

pub struct SessionRuntime {
    session: Session,
    pipeline: MessagePipeline,
    billing: BillingRuntime,
    cancel: CancellationToken,
}

impl SessionRuntime {
    /// Subscribes to the conversation and starts billing.
    pub async fn start(
        session: Session,
        context: ConversationContext,
        config: &EngineConfig,
        collaborators: &Collaborators,
        close_requests: mpsc::UnboundedSender<CloseRequest>,
    ) -> Result<Self> {
        let subscription = collaborators
            .feed
            .subscribe(Topic::Conversation(session.conversation_id.clone()))
            .await?;

        let cancel = CancellationToken::new();
        let billing = BillingRuntime::start(
            context.clone(),
            BillingPolicy::from(&config.billing),
            collaborators.billing.clone(),
            close_requests.clone(),
            cancel.child_token(),
        );
        let pipeline = MessagePipeline::new(
            context,
            config,
            Arc::new(TranslationAdapter::new(collaborators.gateway.clone())),
            collaborators.messages.clone(),
            Arc::new(billing.clone()),
            cancel.child_token(),
        );

        tokio::spawn(pump(
            subscription,
            session.session_id.clone(),
            pipeline.clone(),
            close_requests,
            cancel.clone(),
        ));

        tracing::debug!(
            "[Session] Runtime started for {} (conversation {})",
            session.session_id,
            session.conversation_id
        );
        Ok(Self {
            session,
            pipeline,
            billing,
            cancel,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }

    pub fn pipeline(&self) -> &MessagePipeline {
        &self.pipeline
    }

    pub fn billing(&self) -> &BillingRuntime {
        &self.billing
    }

    pub async fn send(&self, text: &str) -> Result<MessageId> {
        self.pipeline.send(text).await
    }

    pub fn preview(&self) -> &LivePreview {
        self.pipeline.preview()
    }

    pub fn billing_snapshot(&self) -> BillingSnapshot {
        self.billing.snapshot()
    }

    pub fn view(&self) -> SessionView {
        let billing = self.billing.snapshot();
        let minutes = billing.elapsed_seconds as f64 / 60.0;
        SessionView {
            session_id: self.session.session_id.clone(),
            partner_id: self.session.partner_id.clone(),
            messages: self.pipeline.messages(),
            billing_state: billing.state,
            elapsed_seconds: billing.elapsed_seconds,
            estimated_cost: minutes * self.session.rate_per_minute,
            estimated_earning: minutes * self.session.earn_rate_per_minute,
            inactivity_warning: billing.inactivity_warning,
            wallet: self.billing.wallet(),
        }
    }

    pub fn subscribe_messages(&self) -> watch::Receiver<u64> {
        self.pipeline.subscribe()
    }

    pub fn subscribe_billing(&self) -> watch::Receiver<BillingSnapshot> {
        self.billing.subscribe()
    }

    /// Ends billing with `reason` and stops all background work.
    pub fn shutdown(&self, reason: EndReason) {
        self.billing.terminate(reason);
        self.pipeline.close();
        self.cancel.cancel();
        tracing::debug!("[Session] Runtime for {} shut down ({})", self.session.session_id, reason);
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Routes conversation events until the runtime is cancelled.
async fn pump(
    mut subscription: FeedSubscription,
    session_id: String,
    pipeline: MessagePipeline,
    close_requests: mpsc::UnboundedSender<CloseRequest>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = subscription.recv() => event,
        };
        let Some(event) = event else {
            tracing::warn!("[Session] Feed for {} closed", session_id);
            break;
        };

        match &event.record {
            FeedRecord::Message(_) => pipeline.handle(event),
            FeedRecord::Session(session)
                if session.session_id == session_id && !session.is_active() =>
            {
                tracing::info!("[Session] {} ended remotely", session_id);
                let _ = close_requests.send(CloseRequest {
                    session_id: session_id.clone(),
                    reason: EndReason::SessionEnded,
                });
            }
            _ => {}
        }
    }
    // Dropping the subscription unsubscribes.
}
