//! Pure billing transitions.
//!
//! `transition` takes the ledger, one event and the policy, mutates the
//! ledger and returns the effects the runtime must perform. Effects are
//! only produced on a state change, so each backend signal fires exactly
//! once per transition no matter how often an event is replayed.

use super::ledger::ActivityLedger;
use super::policy::BillingPolicy;
use super::state::BillingState;
use crate::session::{EndReason, Role};
use std::time::Duration;
use tokio::time::Instant;

/// Inputs to the billing machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingEvent {
    /// A message from `role` was observed on the feed.
    MessageObserved { role: Role, at: Instant },
    /// The periodic tick: advances elapsed time and re-evaluates inactivity.
    Tick { now: Instant },
    /// The logout timer fired.
    LogoutDue { now: Instant },
    /// Partner offline, remote end, or local close.
    ExternalEnd { reason: EndReason },
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingEffect {
    /// dormant -> active
    BillingStarted,
    /// active -> warning, `pause_in` until billing pauses
    WarningStarted { pause_in: Duration },
    /// warning -> active
    WarningCleared,
    /// warning -> paused
    BillingPaused,
    /// paused -> active
    BillingResumed,
    /// any -> terminated
    Terminated { reason: EndReason },
}

pub fn transition(
    ledger: &mut ActivityLedger,
    event: BillingEvent,
    policy: &BillingPolicy,
) -> Vec<BillingEffect> {
    if ledger.state.is_terminal() {
        return Vec::new();
    }

    match event {
        BillingEvent::MessageObserved { role, at } => observe(ledger, role, at, policy),
        BillingEvent::Tick { now } => tick(ledger, now, policy),
        BillingEvent::LogoutDue { now } => {
            if ledger.idle_for(now) >= policy.logout_after {
                terminate(ledger, EndReason::InactivityLogout)
            } else {
                // Stale deadline: activity arrived after the timer was armed.
                Vec::new()
            }
        }
        BillingEvent::ExternalEnd { reason } => terminate(ledger, reason),
    }
}

fn observe(
    ledger: &mut ActivityLedger,
    role: Role,
    at: Instant,
    policy: &BillingPolicy,
) -> Vec<BillingEffect> {
    ledger.record(role, at);

    match ledger.state {
        BillingState::Dormant if ledger.has_mutual_exchange() => {
            ledger.state = BillingState::Active;
            ledger.billing_since = Some(at);
            ledger.elapsed_seconds = 0;
            vec![BillingEffect::BillingStarted]
        }
        BillingState::Warning => {
            ledger.state = BillingState::Active;
            vec![BillingEffect::WarningCleared]
        }
        BillingState::Paused => {
            let boundary = ledger.paused_at.unwrap_or(at);
            if ledger.both_replied_since(boundary, policy.resume_grace) {
                ledger.state = BillingState::Active;
                ledger.paused_at = None;
                ledger.last_any_activity_at = Some(at);
                vec![BillingEffect::BillingResumed]
            } else {
                Vec::new()
            }
        }
        BillingState::Dormant | BillingState::Active | BillingState::Terminated => Vec::new(),
    }
}

fn tick(ledger: &mut ActivityLedger, now: Instant, policy: &BillingPolicy) -> Vec<BillingEffect> {
    let idle = ledger.idle_for(now);
    if idle >= policy.logout_after {
        return terminate(ledger, EndReason::InactivityLogout);
    }

    let mut effects = Vec::new();
    match ledger.state {
        BillingState::Active | BillingState::Warning if idle >= policy.pause_after => {
            ledger.state = BillingState::Paused;
            ledger.paused_at = Some(now);
            effects.push(BillingEffect::BillingPaused);
        }
        BillingState::Active if idle >= policy.warn_after => {
            ledger.state = BillingState::Warning;
            effects.push(BillingEffect::WarningStarted {
                pause_in: policy.pause_after.saturating_sub(idle),
            });
        }
        _ => {}
    }

    if ledger.state.is_ticking() {
        ledger.elapsed_seconds += policy.tick_seconds();
    }
    effects
}

fn terminate(ledger: &mut ActivityLedger, reason: EndReason) -> Vec<BillingEffect> {
    ledger.state = BillingState::Terminated;
    ledger.end_reason = Some(reason);
    vec![BillingEffect::Terminated { reason }]
}
