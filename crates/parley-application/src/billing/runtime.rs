//! Billing runtime for one session.
//!
//! Feeds message activity and timer events into the pure billing
//! `transition` and turns the resulting effects into backend signals. The
//! timer loop owns the periodic tick, the heartbeat and the logout deadline;
//! backend calls go through a single dispatcher task so they reach the
//! backend in the order the effects happened.

use crate::context::{CloseRequest, ConversationContext};
use chrono::Utc;
use parley_core::billing::{
    ActivityLedger, BillingBackend, BillingEffect, BillingEvent, BillingPolicy, BillingSignal,
    BillingSnapshot, WalletSnapshot, transition,
};
use parley_core::session::{EndReason, Role};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use strum::Display;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Receives "a message from `role` was observed at `at`".
pub trait ActivitySink: Send + Sync {
    fn message_observed(&self, role: Role, at: Instant);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
enum SignalKind {
    Start,
    Pause,
    Resume,
    Logout,
}

enum Outgoing {
    Signal(SignalKind, BillingSignal),
    Heartbeat,
}

struct BillingInner {
    context: ConversationContext,
    policy: BillingPolicy,
    ledger: Mutex<ActivityLedger>,
    snapshot: watch::Sender<BillingSnapshot>,
    wallet: Arc<watch::Sender<Option<WalletSnapshot>>>,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    close_requests: mpsc::UnboundedSender<CloseRequest>,
    cancel: CancellationToken,
}

impl BillingInner {
    fn ledger(&self) -> MutexGuard<'_, ActivityLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone)]
pub struct BillingRuntime {
    inner: Arc<BillingInner>,
}

impl BillingRuntime {
    /// Starts the timer loop and the signal dispatcher.
    pub fn start(
        context: ConversationContext,
        policy: BillingPolicy,
        backend: Arc<dyn BillingBackend>,
        close_requests: mpsc::UnboundedSender<CloseRequest>,
        cancel: CancellationToken,
    ) -> Self {
        let now = Instant::now();
        let ledger = ActivityLedger::new(now);
        let (snapshot, _) = watch::channel(ledger.snapshot(now, &policy));
        let (wallet, _) = watch::channel(None);
        let wallet = Arc::new(wallet);
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();

        tokio::spawn(dispatch(
            outgoing_rx,
            backend,
            wallet.clone(),
            context.conversation_id.clone(),
            context.session_id.clone(),
        ));

        let runtime = Self {
            inner: Arc::new(BillingInner {
                context,
                policy,
                ledger: Mutex::new(ledger),
                snapshot,
                wallet,
                outgoing,
                close_requests,
                cancel,
            }),
        };
        tokio::spawn(runtime.clone().run());
        runtime
    }

    /// Applies one event and forwards its effects.
    pub fn apply(&self, event: BillingEvent) -> Vec<BillingEffect> {
        let inner = &self.inner;
        let now = Instant::now();
        let (effects, snapshot) = {
            let mut ledger = inner.ledger();
            let effects = transition(&mut ledger, event, &inner.policy);
            (effects, ledger.snapshot(now, &inner.policy))
        };

        for effect in &effects {
            self.forward(effect, snapshot.elapsed_seconds);
        }
        inner.snapshot.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
        effects
    }

    pub fn observe(&self, role: Role, at: Instant) -> Vec<BillingEffect> {
        self.apply(BillingEvent::MessageObserved { role, at })
    }

    /// Ends billing for a reason decided outside the state machine.
    pub fn terminate(&self, reason: EndReason) -> Vec<BillingEffect> {
        self.apply(BillingEvent::ExternalEnd { reason })
    }

    /// Current state, with a countdown computed for this instant.
    pub fn snapshot(&self) -> BillingSnapshot {
        self.inner
            .ledger()
            .snapshot(Instant::now(), &self.inner.policy)
    }

    pub fn subscribe(&self) -> watch::Receiver<BillingSnapshot> {
        self.inner.snapshot.subscribe()
    }

    /// Last wallet returned by a heartbeat.
    pub fn wallet(&self) -> Option<WalletSnapshot> {
        self.inner.wallet.borrow().clone()
    }

    /// Stops the timers. Signals already queued are still delivered.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    fn forward(&self, effect: &BillingEffect, elapsed_seconds: u64) {
        let ctx = &self.inner.context;
        let kind = match effect {
            BillingEffect::BillingStarted => {
                tracing::info!("[Billing] {} started", ctx.session_id);
                SignalKind::Start
            }
            BillingEffect::WarningStarted { pause_in } => {
                tracing::info!(
                    "[Billing] {} inactive, pausing in {}s",
                    ctx.session_id,
                    pause_in.as_secs()
                );
                return;
            }
            BillingEffect::WarningCleared => {
                tracing::debug!("[Billing] {} warning cleared", ctx.session_id);
                return;
            }
            BillingEffect::BillingPaused => {
                tracing::info!("[Billing] {} paused after {}s", ctx.session_id, elapsed_seconds);
                SignalKind::Pause
            }
            BillingEffect::BillingResumed => {
                tracing::info!("[Billing] {} resumed", ctx.session_id);
                SignalKind::Resume
            }
            BillingEffect::Terminated { reason } => {
                tracing::info!("[Billing] {} terminated ({})", ctx.session_id, reason);
                SignalKind::Logout
            }
        };

        let reason = match effect {
            BillingEffect::Terminated { reason } => Some(*reason),
            _ => None,
        };
        let signal = BillingSignal {
            session_id: ctx.session_id.clone(),
            conversation_id: ctx.conversation_id.clone(),
            role: ctx.role,
            elapsed_seconds,
            at: Utc::now(),
            reason,
        };
        // The dispatcher only stops once every runtime handle is gone.
        let _ = self.inner.outgoing.send(Outgoing::Signal(kind, signal));
    }

    async fn run(self) {
        let inner = self.inner.clone();
        let policy = inner.policy;
        let start = Instant::now();

        let mut ticker = tokio::time::interval_at(start + policy.tick, policy.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut heartbeat = tokio::time::interval_at(start + policy.heartbeat, policy.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut changes = inner.snapshot.subscribe();
        let mut was_ticking = false;

        loop {
            let (ticking, deadline) = {
                let ledger = inner.ledger();
                if ledger.state.is_terminal() {
                    break;
                }
                (ledger.state.is_ticking(), ledger.logout_deadline(&policy))
            };
            // Billed time and heartbeats run from the instant billing
            // started or resumed.
            if ticking && !was_ticking {
                let now = Instant::now();
                ticker.reset_at(now + policy.tick);
                heartbeat.reset_at(now + policy.heartbeat);
            }
            was_ticking = ticking;

            let effects = tokio::select! {
                _ = inner.cancel.cancelled() => break,
                _ = changes.changed() => Vec::new(),
                _ = ticker.tick() => {
                    if inner.ledger().state.is_ticking() == ticking {
                        self.apply(BillingEvent::Tick { now: Instant::now() })
                    } else {
                        // Started or stopped since the timers were armed.
                        Vec::new()
                    }
                }
                _ = heartbeat.tick(), if ticking => {
                    let _ = inner.outgoing.send(Outgoing::Heartbeat);
                    Vec::new()
                }
                _ = tokio::time::sleep_until(deadline) => {
                    self.apply(BillingEvent::LogoutDue { now: Instant::now() })
                }
            };

            for effect in effects {
                if let BillingEffect::Terminated { reason } = effect {
                    let _ = inner.close_requests.send(CloseRequest {
                        session_id: inner.context.session_id.clone(),
                        reason,
                    });
                }
            }
        }
        tracing::debug!("[Billing] Timer loop for {} stopped", inner.context.session_id);
    }
}

impl ActivitySink for BillingRuntime {
    fn message_observed(&self, role: Role, at: Instant) {
        self.observe(role, at);
    }
}

/// Delivers queued signals one at a time. Failures are logged and dropped.
async fn dispatch(
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    backend: Arc<dyn BillingBackend>,
    wallet: Arc<watch::Sender<Option<WalletSnapshot>>>,
    conversation_id: String,
    session_id: String,
) {
    while let Some(item) = outgoing.recv().await {
        match item {
            Outgoing::Signal(kind, signal) => {
                let result = match kind {
                    SignalKind::Start => backend.on_billing_start(signal).await,
                    SignalKind::Pause => backend.on_billing_pause(signal).await,
                    SignalKind::Resume => backend.on_billing_resume(signal).await,
                    SignalKind::Logout => backend.on_logout(signal).await,
                };
                if let Err(e) = result {
                    tracing::warn!("[Billing] {} signal for {} failed: {}", kind, session_id, e);
                }
            }
            Outgoing::Heartbeat => match backend.heartbeat(&conversation_id, &session_id).await {
                Ok(snapshot) => {
                    wallet.send_replace(Some(snapshot));
                }
                Err(e) => tracing::warn!("[Billing] Heartbeat for {} failed: {}", session_id, e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_core::billing::BillingState;
    use parley_core::error::Result;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<(&'static str, Option<EndReason>)>>,
        heartbeats: Mutex<Vec<Instant>>,
    }

    impl RecordingBackend {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().iter().map(|(name, _)| *name).collect()
        }

        fn transitions(&self) -> Vec<&'static str> {
            self.calls()
                .into_iter()
                .filter(|name| *name != "heartbeat")
                .collect()
        }

        fn record(&self, name: &'static str, reason: Option<EndReason>) {
            self.calls.lock().unwrap().push((name, reason));
        }
    }

    #[async_trait]
    impl BillingBackend for RecordingBackend {
        async fn on_billing_start(&self, _signal: BillingSignal) -> Result<()> {
            self.record("start", None);
            Ok(())
        }

        async fn on_billing_pause(&self, _signal: BillingSignal) -> Result<()> {
            self.record("pause", None);
            Ok(())
        }

        async fn on_billing_resume(&self, _signal: BillingSignal) -> Result<()> {
            self.record("resume", None);
            Ok(())
        }

        async fn on_logout(&self, signal: BillingSignal) -> Result<()> {
            self.record("logout", signal.reason);
            Ok(())
        }

        async fn heartbeat(&self, _conversation_id: &str, _session_id: &str) -> Result<WalletSnapshot> {
            self.record("heartbeat", None);
            self.heartbeats.lock().unwrap().push(Instant::now());
            Ok(WalletSnapshot {
                balance: 50.0,
                earnings: 10.0,
            })
        }
    }

    struct Fixture {
        runtime: BillingRuntime,
        backend: Arc<RecordingBackend>,
        closes: mpsc::UnboundedReceiver<CloseRequest>,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(RecordingBackend::default());
        let (close_tx, closes) = mpsc::unbounded_channel();
        let context = ConversationContext {
            session_id: "s1".to_string(),
            conversation_id: "c1".to_string(),
            user_id: "payer".to_string(),
            partner_id: "earner".to_string(),
            role: Role::Payer,
            user_lang: "en".into(),
            partner_lang: "hi".into(),
        };
        let runtime = BillingRuntime::start(
            context,
            BillingPolicy::default(),
            backend.clone(),
            close_tx,
            CancellationToken::new(),
        );
        Fixture {
            runtime,
            backend,
            closes,
        }
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_sided_chat_never_bills() {
        let f = fixture();
        f.runtime.observe(Role::Payer, Instant::now());
        tokio::time::sleep(secs(60)).await;
        f.runtime.observe(Role::Payer, Instant::now());
        tokio::time::sleep(secs(30)).await;

        let snapshot = f.runtime.snapshot();
        assert_eq!(snapshot.state, BillingState::Dormant);
        assert_eq!(snapshot.elapsed_seconds, 0);
        assert!(f.backend.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_billing_starts_at_earner_reply_and_ticks() {
        let f = fixture();
        f.runtime.observe(Role::Payer, Instant::now());
        tokio::time::sleep(secs(20)).await;
        let effects = f.runtime.observe(Role::Earner, Instant::now());
        assert_eq!(effects, vec![BillingEffect::BillingStarted]);

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        let snapshot = f.runtime.snapshot();
        assert_eq!(snapshot.state, BillingState::Active);
        assert!((9..=11).contains(&snapshot.elapsed_seconds));
        assert_eq!(f.backend.transitions(), vec!["start"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_warning_then_pause_then_resume() {
        let f = fixture();
        f.runtime.observe(Role::Payer, Instant::now());
        f.runtime.observe(Role::Earner, Instant::now());

        tokio::time::sleep(Duration::from_millis(150_500)).await;
        let warning = f.runtime.snapshot();
        assert_eq!(warning.state, BillingState::Warning);
        assert!(warning.inactivity_warning.is_some_and(|d| d <= secs(30)));

        tokio::time::sleep(secs(40)).await;
        let paused = f.runtime.snapshot();
        assert_eq!(paused.state, BillingState::Paused);
        tokio::time::sleep(secs(60)).await;
        assert_eq!(f.runtime.snapshot().elapsed_seconds, paused.elapsed_seconds);

        // One side alone does not resume.
        f.runtime.observe(Role::Payer, Instant::now());
        assert_eq!(f.runtime.snapshot().state, BillingState::Paused);
        tokio::time::sleep(secs(5)).await;
        f.runtime.observe(Role::Earner, Instant::now());
        assert_eq!(f.runtime.snapshot().state, BillingState::Active);

        tokio::time::sleep(secs(1)).await;
        assert_eq!(f.backend.transitions(), vec!["start", "pause", "resume"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactivity_logout_requests_close_once() {
        let mut f = fixture();
        f.runtime.observe(Role::Payer, Instant::now());
        f.runtime.observe(Role::Earner, Instant::now());

        tokio::time::sleep(secs(905)).await;

        let snapshot = f.runtime.snapshot();
        assert_eq!(snapshot.state, BillingState::Terminated);
        assert_eq!(snapshot.end_reason, Some(EndReason::InactivityLogout));
        assert_eq!(f.backend.transitions(), vec!["start", "pause", "logout"]);
        assert_eq!(
            f.closes.try_recv().unwrap(),
            CloseRequest {
                session_id: "s1".to_string(),
                reason: EndReason::InactivityLogout,
            }
        );
        assert!(f.closes.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_counts_from_open_without_messages() {
        let f = fixture();
        tokio::time::sleep(secs(901)).await;
        assert_eq!(f.runtime.snapshot().state, BillingState::Terminated);
        assert_eq!(f.backend.transitions(), vec!["logout"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_end_signals_logout_once() {
        let mut f = fixture();
        f.runtime.observe(Role::Payer, Instant::now());
        f.runtime.observe(Role::Earner, Instant::now());

        f.runtime.terminate(EndReason::Closed);
        f.runtime.terminate(EndReason::CapacityEvicted);
        f.runtime.observe(Role::Payer, Instant::now());
        tokio::time::sleep(secs(5)).await;

        assert_eq!(f.backend.transitions(), vec!["start", "logout"]);
        assert_eq!(
            f.backend.calls.lock().unwrap().last().cloned(),
            Some(("logout", Some(EndReason::Closed)))
        );
        // Closing from outside is not echoed back as a close request.
        assert!(f.closes.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_refreshes_wallet_while_billing() {
        let f = fixture();
        tokio::time::sleep(secs(61)).await;
        assert!(f.runtime.wallet().is_none());

        f.runtime.observe(Role::Payer, Instant::now());
        f.runtime.observe(Role::Earner, Instant::now());
        tokio::time::sleep(secs(61)).await;

        assert!(f.backend.calls().contains(&"heartbeat"));
        assert_eq!(f.runtime.wallet().map(|w| w.balance), Some(50.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timers_run_from_billing_start() {
        let f = fixture();
        tokio::time::sleep(secs(100)).await;
        let started = Instant::now();
        f.runtime.observe(Role::Payer, started);
        f.runtime.observe(Role::Earner, started);

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(f.runtime.snapshot().elapsed_seconds, 1);
        assert!(f.backend.heartbeats.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(59_000)).await;
        let heartbeats = f.backend.heartbeats.lock().unwrap().clone();
        assert_eq!(heartbeats, vec![started + secs(60)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_heartbeats_while_paused() {
        let f = fixture();
        let started = Instant::now();
        f.runtime.observe(Role::Payer, started);
        f.runtime.observe(Role::Earner, started);

        // Moves the pause to +210s, off the heartbeat grid.
        tokio::time::sleep(secs(30)).await;
        f.runtime.observe(Role::Payer, Instant::now());

        tokio::time::sleep(secs(370)).await;
        assert_eq!(f.runtime.snapshot().state, BillingState::Paused);

        let resumed = Instant::now();
        f.runtime.observe(Role::Payer, resumed);
        f.runtime.observe(Role::Earner, resumed);
        assert_eq!(f.runtime.snapshot().state, BillingState::Active);
        tokio::time::sleep(secs(61)).await;

        let offsets: Vec<u64> = f
            .backend
            .heartbeats
            .lock()
            .unwrap()
            .iter()
            .map(|at| at.duration_since(started).as_secs())
            .collect();
        assert_eq!(offsets, vec![60, 120, 180, 460]);
        assert_eq!(f.backend.transitions(), vec!["start", "pause", "resume"]);
    }
}
