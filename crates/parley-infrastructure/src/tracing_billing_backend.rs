//! Billing backend that records signals and logs them.
//!
//! Stands in for the real ledger service in the `simulate` command and in
//! tests: every signal is logged through `tracing` and kept in memory, and
//! heartbeats return a wallet derived from the rates of the session.

use async_trait::async_trait;
use parley_core::billing::{BillingBackend, BillingSignal, WalletSnapshot};
use parley_core::error::Result;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum RecordedSignal {
    Start(BillingSignal),
    Pause(BillingSignal),
    Resume(BillingSignal),
    Logout(BillingSignal),
    Heartbeat {
        conversation_id: String,
        session_id: String,
    },
}

impl RecordedSignal {
    pub fn name(&self) -> &'static str {
        match self {
            RecordedSignal::Start(_) => "start",
            RecordedSignal::Pause(_) => "pause",
            RecordedSignal::Resume(_) => "resume",
            RecordedSignal::Logout(_) => "logout",
            RecordedSignal::Heartbeat { .. } => "heartbeat",
        }
    }
}

pub struct TracingBillingBackend {
    signals: Mutex<Vec<RecordedSignal>>,
    wallet: Mutex<WalletSnapshot>,
    /// Amount debited from the balance (and credited to earnings) per heartbeat
    heartbeat_charge: f64,
}

impl TracingBillingBackend {
    pub fn new(opening_balance: f64, heartbeat_charge: f64) -> Self {
        Self {
            signals: Mutex::new(Vec::new()),
            wallet: Mutex::new(WalletSnapshot {
                balance: opening_balance,
                earnings: 0.0,
            }),
            heartbeat_charge,
        }
    }

    fn signals_guard(&self) -> MutexGuard<'_, Vec<RecordedSignal>> {
        self.signals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, signal: RecordedSignal) {
        self.signals_guard().push(signal);
    }

    pub fn signals(&self) -> Vec<RecordedSignal> {
        self.signals_guard().clone()
    }

    /// Names of the recorded signals, heartbeats excluded.
    pub fn transitions(&self) -> Vec<&'static str> {
        self.signals_guard()
            .iter()
            .filter(|s| !matches!(s, RecordedSignal::Heartbeat { .. }))
            .map(RecordedSignal::name)
            .collect()
    }

    pub fn heartbeat_count(&self) -> usize {
        self.signals_guard()
            .iter()
            .filter(|s| matches!(s, RecordedSignal::Heartbeat { .. }))
            .count()
    }
}

impl Default for TracingBillingBackend {
    fn default() -> Self {
        Self::new(100.0, 1.0)
    }
}

#[async_trait]
impl BillingBackend for TracingBillingBackend {
    async fn on_billing_start(&self, signal: BillingSignal) -> Result<()> {
        tracing::info!(
            "[BillingBackend] start session={} role={}",
            signal.session_id,
            signal.role
        );
        self.record(RecordedSignal::Start(signal));
        Ok(())
    }

    async fn on_billing_pause(&self, signal: BillingSignal) -> Result<()> {
        tracing::info!(
            "[BillingBackend] pause session={} elapsed={}s",
            signal.session_id,
            signal.elapsed_seconds
        );
        self.record(RecordedSignal::Pause(signal));
        Ok(())
    }

    async fn on_billing_resume(&self, signal: BillingSignal) -> Result<()> {
        tracing::info!("[BillingBackend] resume session={}", signal.session_id);
        self.record(RecordedSignal::Resume(signal));
        Ok(())
    }

    async fn on_logout(&self, signal: BillingSignal) -> Result<()> {
        tracing::info!(
            "[BillingBackend] logout session={} reason={:?}",
            signal.session_id,
            signal.reason
        );
        self.record(RecordedSignal::Logout(signal));
        Ok(())
    }

    async fn heartbeat(&self, conversation_id: &str, session_id: &str) -> Result<WalletSnapshot> {
        tracing::debug!(target: "parley::billing::heartbeat", "[BillingBackend] heartbeat session={}", session_id);
        self.record(RecordedSignal::Heartbeat {
            conversation_id: conversation_id.to_string(),
            session_id: session_id.to_string(),
        });
        let mut wallet = self.wallet.lock().unwrap_or_else(PoisonError::into_inner);
        wallet.balance -= self.heartbeat_charge;
        wallet.earnings += self.heartbeat_charge;
        Ok(wallet.clone())
    }
}
