//! Billing runtime.
//!
//! The state machine itself lives in `parley_core::billing`; this module
//! wires it to timers, message activity and the billing backend.

mod runtime;

pub use runtime::{ActivitySink, BillingRuntime};
