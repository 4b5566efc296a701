use crate::config::BillingConfig;
use std::time::Duration;

/// Timing thresholds used by the billing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingPolicy {
    pub warn_after: Duration,
    pub pause_after: Duration,
    pub logout_after: Duration,
    pub tick: Duration,
    pub heartbeat: Duration,
    pub resume_grace: Duration,
}

impl Default for BillingPolicy {
    fn default() -> Self {
        Self::from(&BillingConfig::default())
    }
}

impl From<&BillingConfig> for BillingPolicy {
    fn from(config: &BillingConfig) -> Self {
        Self {
            warn_after: config.warn_after(),
            pause_after: config.pause_after(),
            logout_after: config.logout_after(),
            tick: config.tick(),
            heartbeat: config.heartbeat(),
            resume_grace: config.resume_grace(),
        }
    }
}

impl BillingPolicy {
    /// Whole seconds added to the elapsed counter per tick.
    pub fn tick_seconds(&self) -> u64 {
        self.tick.as_secs().max(1)
    }
}
