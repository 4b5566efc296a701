//! Shared wiring passed down from the window manager to each session.

use parley_core::billing::BillingBackend;
use parley_core::feed::EventFeed;
use parley_core::language::LanguageCode;
use parley_core::message::MessageStore;
use parley_core::session::{EndReason, Role, Session, SessionStore};
use parley_core::translation::TranslationGateway;
use std::sync::Arc;

/// The external collaborators the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub sessions: Arc<dyn SessionStore>,
    pub messages: Arc<dyn MessageStore>,
    pub feed: Arc<dyn EventFeed>,
    pub gateway: Arc<dyn TranslationGateway>,
    pub billing: Arc<dyn BillingBackend>,
}

/// One conversation as seen from the local user's side.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationContext {
    pub session_id: String,
    pub conversation_id: String,
    pub user_id: String,
    pub partner_id: String,
    pub role: Role,
    pub user_lang: LanguageCode,
    pub partner_lang: LanguageCode,
}

impl ConversationContext {
    pub fn for_session(
        session: &Session,
        user_id: &str,
        role: Role,
        user_lang: LanguageCode,
        partner_lang: LanguageCode,
    ) -> Self {
        Self {
            session_id: session.session_id.clone(),
            conversation_id: session.conversation_id.clone(),
            user_id: user_id.to_string(),
            partner_id: session.partner_id.clone(),
            role,
            user_lang,
            partner_lang,
        }
    }

    pub fn same_language(&self) -> bool {
        self.user_lang.matches(&self.partner_lang)
    }
}

/// Asks the window manager to close a session from inside its runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseRequest {
    pub session_id: String,
    pub reason: EndReason,
}
