//! Billing domain module.
//!
//! # Module Structure
//!
//! - `state`: `BillingState`
//! - `ledger`: `ActivityLedger` value object and `BillingSnapshot`
//! - `policy`: `BillingPolicy` timing thresholds
//! - `transition`: the pure `transition` function, `BillingEvent`, `BillingEffect`
//! - `backend`: `BillingBackend` signal-out trait

mod backend;
mod ledger;
mod policy;
mod state;
mod transition;

pub use backend::{BillingBackend, BillingSignal, WalletSnapshot};
pub use ledger::{ActivityLedger, BillingSnapshot};
pub use policy::BillingPolicy;
pub use state::BillingState;
pub use transition::{BillingEffect, BillingEvent, transition};
