//! Message store trait.

use super::model::{NewMessage, PersistedMessage};
use crate::error::Result;
use async_trait::async_trait;

/// Outbound message persistence.
///
/// A successful insert is eventually echoed on the conversation's event
/// feed topic; the pipeline reconciles against that echo rather than the
/// value returned here.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persists a message and returns its server id.
    ///
    /// Implementations report failures as `ParleyError::Persistence`.
    async fn insert_message(&self, message: NewMessage) -> Result<PersistedMessage>;
}
