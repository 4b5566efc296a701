//! Engine configuration model.
//!
//! Every field has a default so a partial (or missing) `config.toml` is
//! valid. Loading and saving lives in `parley-infrastructure`.

use crate::error::{ParleyError, Result};
use crate::translation::EnrichMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub windows: WindowConfig,
    #[serde(default)]
    pub messages: MessageConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
}

impl EngineConfig {
    /// Rejects combinations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let b = &self.billing;
        if b.tick_secs == 0 || b.heartbeat_secs == 0 {
            return Err(ParleyError::config(
                "billing.tick_secs and billing.heartbeat_secs must be non-zero",
            ));
        }
        if b.warn_after_secs >= b.pause_after_secs {
            return Err(ParleyError::config(format!(
                "billing.warn_after_secs ({}) must be less than billing.pause_after_secs ({})",
                b.warn_after_secs, b.pause_after_secs
            )));
        }
        if b.pause_after_secs >= b.logout_after_secs {
            return Err(ParleyError::config(format!(
                "billing.pause_after_secs ({}) must be less than billing.logout_after_secs ({})",
                b.pause_after_secs, b.logout_after_secs
            )));
        }
        if self.windows.max_visible == 0 {
            return Err(ParleyError::config("windows.max_visible must be at least 1"));
        }
        if self.messages.max_message_chars == 0 {
            return Err(ParleyError::config(
                "messages.max_message_chars must be at least 1",
            ));
        }
        if !(150..=400).contains(&self.translation.preview_debounce_ms) {
            return Err(ParleyError::config(format!(
                "translation.preview_debounce_ms ({}) must be within 150..=400",
                self.translation.preview_debounce_ms
            )));
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct BillingConfig {
    #[serde(default = "default_warn_after_secs")]
    pub warn_after_secs: u64,
    #[serde(default = "default_pause_after_secs")]
    pub pause_after_secs: u64,
    #[serde(default = "default_logout_after_secs")]
    pub logout_after_secs: u64,
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Replies this long before the pause boundary still count towards resume
    #[serde(default)]
    pub resume_grace_secs: u64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            warn_after_secs: default_warn_after_secs(),
            pause_after_secs: default_pause_after_secs(),
            logout_after_secs: default_logout_after_secs(),
            tick_secs: default_tick_secs(),
            heartbeat_secs: default_heartbeat_secs(),
            resume_grace_secs: 0,
        }
    }
}

impl BillingConfig {
    pub fn warn_after(&self) -> Duration {
        Duration::from_secs(self.warn_after_secs)
    }

    pub fn pause_after(&self) -> Duration {
        Duration::from_secs(self.pause_after_secs)
    }

    pub fn logout_after(&self) -> Duration {
        Duration::from_secs(self.logout_after_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn resume_grace(&self) -> Duration {
        Duration::from_secs(self.resume_grace_secs)
    }
}

fn default_warn_after_secs() -> u64 {
    120
}

fn default_pause_after_secs() -> u64 {
    180
}

fn default_logout_after_secs() -> u64 {
    900
}

fn default_tick_secs() -> u64 {
    1
}

fn default_heartbeat_secs() -> u64 {
    60
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct WindowConfig {
    #[serde(default = "default_max_visible")]
    pub max_visible: usize,
    /// Minimum interval between two session refreshes
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_visible: default_max_visible(),
            refresh_interval_ms: default_refresh_interval_ms(),
        }
    }
}

impl WindowConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

fn default_max_visible() -> usize {
    3
}

fn default_refresh_interval_ms() -> u64 {
    1500
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct MessageConfig {
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
    /// How long a placeholder stays eligible for reconciliation
    #[serde(default = "default_reconcile_window_secs")]
    pub reconcile_window_secs: u64,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            max_message_chars: default_max_message_chars(),
            reconcile_window_secs: default_reconcile_window_secs(),
        }
    }
}

impl MessageConfig {
    pub fn reconcile_window(&self) -> Duration {
        Duration::from_secs(self.reconcile_window_secs)
    }
}

fn default_max_message_chars() -> usize {
    1000
}

fn default_reconcile_window_secs() -> u64 {
    30
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct TranslationConfig {
    #[serde(default)]
    pub mode: EnrichMode,
    #[serde(default = "default_preview_debounce_ms")]
    pub preview_debounce_ms: u64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            mode: EnrichMode::default(),
            preview_debounce_ms: default_preview_debounce_ms(),
        }
    }
}

impl TranslationConfig {
    pub fn preview_debounce(&self) -> Duration {
        Duration::from_millis(self.preview_debounce_ms)
    }
}

fn default_preview_debounce_ms() -> u64 {
    250
}
