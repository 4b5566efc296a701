//! Domain layer for Parley.
//!
//! Models, error taxonomy, configuration model, the pure billing state
//! machine and the traits of every external collaborator (session store,
//! message store, event feed, translation gateway, billing backend).

pub mod billing;
pub mod config;
pub mod error;
pub mod feed;
pub mod language;
pub mod message;
pub mod session;
pub mod translation;

// Re-export common error type
pub use error::{ParleyError, Result, ValidationError};
