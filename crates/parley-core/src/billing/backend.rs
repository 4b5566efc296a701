use crate::error::Result;
use crate::session::{EndReason, Role};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload of every billing signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingSignal {
    pub session_id: String,
    pub conversation_id: String,
    /// Role of the viewer whose engine raised the signal
    pub role: Role,
    pub elapsed_seconds: u64,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub reason: Option<EndReason>,
}

/// The viewer's wallet as reported by the billing backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletSnapshot {
    /// Remaining payer balance
    pub balance: f64,
    /// Accumulated earner earnings
    pub earnings: f64,
}

/// The billing ledger service.
///
/// Every call is fire-and-forget from the engine's point of view: failures
/// are logged and never retried synchronously or allowed to reverse a
/// transition.
#[async_trait]
pub trait BillingBackend: Send + Sync {
    async fn on_billing_start(&self, signal: BillingSignal) -> Result<()>;

    async fn on_billing_pause(&self, signal: BillingSignal) -> Result<()>;

    async fn on_billing_resume(&self, signal: BillingSignal) -> Result<()>;

    async fn on_logout(&self, signal: BillingSignal) -> Result<()>;

    /// Periodic keep-alive while billing is ticking; returns the refreshed wallet.
    async fn heartbeat(&self, conversation_id: &str, session_id: &str) -> Result<WalletSnapshot>;
}
