//! Application layer for Parley.
//!
//! Coordinates the domain types of `parley-core` with the collaborator
//! traits: the window manager decides which sessions are visible, and each
//! visible session runs a message pipeline and a billing runtime.

pub mod billing;
pub mod context;
pub mod message;
pub mod session;
pub mod translation;

pub use billing::{ActivitySink, BillingRuntime};
pub use context::{CloseRequest, Collaborators, ConversationContext};
pub use message::{ContentPolicy, MessagePipeline};
pub use session::{SessionRuntime, SessionView, SessionWindowManager};
pub use translation::{LivePreview, TranslationAdapter};
