//! Translation gateway adapter.
//!
//! # Module Structure
//!
//! - `adapter`: `TranslationAdapter`, anchor strategies, fail-soft enrichment
//! - `preview`: debounced `LivePreview` of the composer text
//! - `script`: writing-system detection for transliteration

mod adapter;
mod preview;
pub mod script;

pub use adapter::{
    Anchor, AnchorStrategy, EnrichRequest, OutgoingViews, TranslationAdapter,
};
pub use preview::{LivePreview, PreviewEntry};
