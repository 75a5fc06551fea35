//! Flowcore: concurrency core for a workflow automation backend
//!
//! Three shared-state components used by workflow executions:
//! - Keyed mutual exclusion so a workflow runs at most once per user at a time
//! - Execution-scoped credential resolution with a TTL cache
//! - Policy-bounded conversational memory for AI nodes

// Core configuration and setup
pub mod config;

// Injectable time source
pub mod clock;

// Runtime execution core - admission control, run lifecycle, secret pins
pub mod runtime;

// Credential resolution layer - context binding, caching, encrypted storage
pub mod credentials;

// Conversational memory layer - session store with eviction policies
pub mod memory;

// HTTP API layer - observability and admin endpoints
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use credentials::{CredentialError, CredentialProvider};
pub use memory::MemoryManager;
pub use runtime::{ExecutionCoordinator, ExecutionQueue, RunOutcome};
pub use server::start_server;
