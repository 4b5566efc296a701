//! Message domain module.

mod model;
mod repository;

pub use model::{Message, MessageId, MessageRecord, NewMessage, PersistedMessage};
pub use repository::MessageStore;
