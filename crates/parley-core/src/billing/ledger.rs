use super::policy::BillingPolicy;
use super::state::BillingState;
use crate::session::{EndReason, Role};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Per-session activity record driving the billing transitions.
///
/// Lives only as long as the session runtime; never persisted. All fields
/// are updated through [`super::transition`].
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityLedger {
    pub state: BillingState,
    /// When the session runtime started observing the conversation
    pub opened_at: Instant,
    pub last_payer_message_at: Option<Instant>,
    pub last_earner_message_at: Option<Instant>,
    pub last_any_activity_at: Option<Instant>,
    /// When billing first became active
    pub billing_since: Option<Instant>,
    /// Boundary of the current pause
    pub paused_at: Option<Instant>,
    pub elapsed_seconds: u64,
    pub end_reason: Option<EndReason>,
}

impl ActivityLedger {
    pub fn new(opened_at: Instant) -> Self {
        Self {
            state: BillingState::Dormant,
            opened_at,
            last_payer_message_at: None,
            last_earner_message_at: None,
            last_any_activity_at: None,
            billing_since: None,
            paused_at: None,
            elapsed_seconds: 0,
            end_reason: None,
        }
    }

    /// Records a message from `role`. Out-of-order observations never move
    /// a timestamp backwards.
    pub(crate) fn record(&mut self, role: Role, at: Instant) {
        let slot = match role {
            Role::Payer => &mut self.last_payer_message_at,
            Role::Earner => &mut self.last_earner_message_at,
        };
        *slot = Some(slot.map_or(at, |prev| prev.max(at)));
        self.last_any_activity_at = Some(self.last_any_activity_at.map_or(at, |prev| prev.max(at)));
    }

    /// Both parties have sent at least one message.
    pub fn has_mutual_exchange(&self) -> bool {
        self.last_payer_message_at.is_some() && self.last_earner_message_at.is_some()
    }

    /// Both parties' latest message is later than `boundary - grace`.
    pub fn both_replied_since(&self, boundary: Instant, grace: Duration) -> bool {
        let cutoff = boundary.checked_sub(grace).unwrap_or(boundary);
        let after = |at: Option<Instant>| at.is_some_and(|t| t > cutoff);
        after(self.last_payer_message_at) && after(self.last_earner_message_at)
    }

    /// Start of the current inactivity stretch.
    pub fn inactivity_reference(&self) -> Instant {
        self.last_any_activity_at.unwrap_or(self.opened_at)
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.inactivity_reference())
    }

    /// When inactivity logout fires unless something happens first.
    pub fn logout_deadline(&self, policy: &BillingPolicy) -> Instant {
        self.inactivity_reference() + policy.logout_after
    }

    /// Time left until billing pauses, while the warning is showing.
    pub fn pause_countdown(&self, now: Instant, policy: &BillingPolicy) -> Option<Duration> {
        (self.state == BillingState::Warning).then(|| {
            (self.inactivity_reference() + policy.pause_after).saturating_duration_since(now)
        })
    }

    pub fn snapshot(&self, now: Instant, policy: &BillingPolicy) -> BillingSnapshot {
        BillingSnapshot {
            state: self.state,
            elapsed_seconds: self.elapsed_seconds,
            inactivity_warning: self.pause_countdown(now, policy),
            end_reason: self.end_reason,
        }
    }
}

/// What the UI needs to know about billing at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BillingSnapshot {
    pub state: BillingState,
    pub elapsed_seconds: u64,
    /// Countdown to pause while in `warning`
    pub inactivity_warning: Option<Duration>,
    pub end_reason: Option<EndReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_monotonic() {
        let t0 = Instant::now();
        let mut ledger = ActivityLedger::new(t0);
        ledger.record(Role::Payer, t0 + Duration::from_secs(10));
        ledger.record(Role::Payer, t0 + Duration::from_secs(5));
        assert_eq!(
            ledger.last_payer_message_at,
            Some(t0 + Duration::from_secs(10))
        );
        assert_eq!(
            ledger.last_any_activity_at,
            Some(t0 + Duration::from_secs(10))
        );
    }

    #[test]
    fn test_inactivity_measured_from_open_until_first_message() {
        let t0 = Instant::now();
        let mut ledger = ActivityLedger::new(t0);
        let policy = BillingPolicy::default();
        assert_eq!(ledger.logout_deadline(&policy), t0 + policy.logout_after);

        ledger.record(Role::Earner, t0 + Duration::from_secs(30));
        assert_eq!(
            ledger.logout_deadline(&policy),
            t0 + Duration::from_secs(30) + policy.logout_after
        );
    }

    #[test]
    fn test_both_replied_since_with_grace() {
        let t0 = Instant::now();
        let mut ledger = ActivityLedger::new(t0);
        let boundary = t0 + Duration::from_secs(100);
        ledger.record(Role::Payer, t0 + Duration::from_secs(95));
        ledger.record(Role::Earner, t0 + Duration::from_secs(110));

        assert!(!ledger.both_replied_since(boundary, Duration::ZERO));
        assert!(ledger.both_replied_since(boundary, Duration::from_secs(10)));
    }
}
