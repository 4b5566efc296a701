//! Session store trait.
//!
//! Defines the read/patch interface the window manager uses against the
//! backing session table.

use super::model::{PartnerProfile, SessionPatch, SessionRow};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// An abstract store of session rows, partner profiles and presence.
///
/// This trait decouples the window manager from the transport (REST,
/// realtime database, in-memory test double).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Lists the active session rows involving `user_id`.
    ///
    /// The store may return more than one row for the same partner; the
    /// caller deduplicates.
    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionRow>>;

    /// Fetches profile snapshots for the given partners.
    ///
    /// Partners without a profile are omitted from the result.
    async fn partner_profiles(&self, partner_ids: &[String]) -> Result<Vec<PartnerProfile>>;

    /// Fetches the online flag for the given partners.
    ///
    /// Partners missing from the map are treated as online.
    async fn presence(&self, partner_ids: &[String]) -> Result<HashMap<String, bool>>;

    /// Applies a status patch to a session row.
    async fn update_session(&self, session_id: &str, patch: SessionPatch) -> Result<()>;
}
