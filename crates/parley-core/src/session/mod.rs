//! Session domain module.
//!
//! # Module Structure
//!
//! - `model`: `Session`, `SessionRow`, `SessionPatch`, `Role`, `EndReason`
//! - `repository`: `SessionStore` trait for listing and patching sessions

mod model;
mod repository;

pub use model::{
    EndReason, PartnerProfile, Role, Session, SessionPatch, SessionRow, SessionStatus,
};
pub use repository::SessionStore;
