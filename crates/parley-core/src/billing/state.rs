use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

/// Billing phase of one session.
///
/// ```text
/// dormant ──mutual exchange──▶ active ──T_warn idle──▶ warning ──T_pause idle──▶ paused
///                                ▲  ◀──any message────────┘                        │
///                                └──────────both parties reply after pause─────────┘
/// any ──T_logout idle / external end──▶ terminated
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BillingState {
    #[default]
    Dormant,
    Active,
    Warning,
    Paused,
    Terminated,
}

impl BillingState {
    /// The elapsed-time tick and heartbeat run only in these states.
    pub fn is_ticking(self) -> bool {
        matches!(self, BillingState::Active | BillingState::Warning)
    }

    pub fn is_terminal(self) -> bool {
        self == BillingState::Terminated
    }
}
