//! HTTP API Layer
//!
//! Observability and admin endpoints over the execution core:
//! - Active execution slots and stale-slot sweeping
//! - Credential preflight runs for a workflow/user pair
//! - Conversational memory statistics and session eviction
//! - Credential cache flushing

use crate::{
    memory::MemoryManager,
    runtime::{ExecutionCoordinator, SecretResolver},
};
use std::sync::Arc;

// Execution slot endpoints
pub mod executions;

// Memory session endpoints
pub mod memory;

// Credential cache endpoints
pub mod credentials;

pub use credentials::create_credential_routes;
pub use executions::create_execution_routes;
pub use memory::create_memory_routes;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    /// Execution gate and credential cache, paired per run
    pub coordinator: ExecutionCoordinator,
    /// Secret pin resolution for node execution
    pub secrets: SecretResolver,
    /// Session-scoped conversational memory
    pub memory: Arc<MemoryManager>,
}
