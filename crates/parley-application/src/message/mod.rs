//! Message pipeline.
//!
//! # Module Structure
//!
//! - `policy`: `ContentPolicy` validation of outgoing text
//! - `pipeline`: `MessagePipeline` send / receive / reconcile / enrich

mod pipeline;
mod policy;

pub use pipeline::MessagePipeline;
pub use policy::ContentPolicy;
