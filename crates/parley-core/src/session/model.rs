//! Session domain model.
//!
//! A session is one live conversation between a rate-payer and a
//! rate-earner. Sessions are created by matchmaking outside the engine; the
//! engine only observes them and patches `status` / `end_reason`.

use crate::language::LanguageCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Which side of the per-minute rate a participant is on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    /// Charged per minute
    Payer,
    /// Paid per minute
    Earner,
}

impl Role {
    pub fn counterpart(self) -> Role {
        match self {
            Role::Payer => Role::Earner,
            Role::Earner => Role::Payer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Ended,
}

/// Why a session stopped being visible.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EndReason {
    /// Closed explicitly by the viewer
    Closed,
    /// Least-recently-focused window dropped to make room
    CapacityEvicted,
    /// No activity for the logout threshold
    InactivityLogout,
    /// Partner went offline
    PartnerOffline,
    /// Ended remotely (partner closed, backend ended it)
    SessionEnded,
    /// Rejected because the partner already has an accepted session
    DuplicatePartner,
    /// Declined from the incoming-session prompt
    Rejected,
    /// A newer session for the same partner replaced this one.
    /// Local teardown only; never written to the store.
    Superseded,
}

impl EndReason {
    /// Whether the reason is written back to the session row on close.
    pub fn is_persisted(self) -> bool {
        !matches!(self, EndReason::Superseded | EndReason::SessionEnded)
    }
}

/// One active conversation between two parties, as seen by the viewing user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub conversation_id: String,
    /// The other party, relative to the viewing user
    pub partner_id: String,
    pub payer_id: String,
    pub earner_id: String,
    /// What the payer is charged per minute
    pub rate_per_minute: f64,
    /// What the earner receives per minute
    pub earn_rate_per_minute: f64,
    pub started_at: DateTime<Utc>,
    pub status: SessionStatus,
    #[serde(default)]
    pub end_reason: Option<EndReason>,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Role of `user_id` in this session, if they take part in it.
    pub fn role_of(&self, user_id: &str) -> Option<Role> {
        if self.payer_id == user_id {
            Some(Role::Payer)
        } else if self.earner_id == user_id {
            Some(Role::Earner)
        } else {
            None
        }
    }

    /// Id of the participant holding `role`.
    pub fn participant(&self, role: Role) -> &str {
        match role {
            Role::Payer => &self.payer_id,
            Role::Earner => &self.earner_id,
        }
    }
}

/// A session row as listed by the store, with the facts needed by the
/// earner acceptance predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRow {
    pub session: Session,
    /// The earner has sent at least one message in this session
    #[serde(default)]
    pub earner_has_messaged: bool,
}

/// The only mutation the engine performs on a session row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPatch {
    pub status: SessionStatus,
    pub end_reason: Option<EndReason>,
}

impl SessionPatch {
    pub fn ended(reason: EndReason) -> Self {
        Self {
            status: SessionStatus::Ended,
            end_reason: Some(reason),
        }
    }
}

/// Snapshot of a conversation partner's public profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerProfile {
    pub partner_id: String,
    pub display_name: String,
    pub mother_tongue: LanguageCode,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session {
            session_id: "s-1".to_string(),
            conversation_id: "c-1".to_string(),
            partner_id: "earner-1".to_string(),
            payer_id: "payer-1".to_string(),
            earner_id: "earner-1".to_string(),
            rate_per_minute: 10.0,
            earn_rate_per_minute: 6.0,
            started_at: Utc::now(),
            status: SessionStatus::Active,
            end_reason: None,
        }
    }

    #[test]
    fn test_role_of() {
        let s = session();
        assert_eq!(s.role_of("payer-1"), Some(Role::Payer));
        assert_eq!(s.role_of("earner-1"), Some(Role::Earner));
        assert_eq!(s.role_of("someone"), None);
        assert_eq!(s.participant(Role::Earner), "earner-1");
    }

    #[test]
    fn test_end_reason_wire_names() {
        assert_eq!(EndReason::CapacityEvicted.as_ref(), "capacity_evicted");
        assert_eq!(
            serde_json::to_string(&EndReason::InactivityLogout).unwrap(),
            "\"inactivity_logout\""
        );
        assert!(!EndReason::Superseded.is_persisted());
        assert!(!EndReason::SessionEnded.is_persisted());
        assert!(EndReason::Closed.is_persisted());
    }
}
