//! Infrastructure layer for Parley.
//!
//! Concrete implementations of the collaborator traits declared in
//! `parley-core`, plus configuration file handling.

pub mod config_repository;
pub mod memory_store;
pub mod passthrough_gateway;
pub mod paths;
pub mod tracing_billing_backend;

pub use config_repository::TomlConfigRepository;
pub use memory_store::InMemoryStore;
pub use passthrough_gateway::PassthroughGateway;
pub use paths::{ParleyPaths, PathError};
pub use tracing_billing_backend::{RecordedSignal, TracingBillingBackend};
