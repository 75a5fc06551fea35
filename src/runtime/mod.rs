//! Runtime Execution Core
//!
//! Admission control and per-run credential scoping for workflow executions.
//! It handles:
//! - At most one concurrent run per workflow and user
//! - Binding each run to a fresh credential context
//! - Resolving `$secret.` pins declared by nodes

// Keyed mutual exclusion for workflow executions
pub mod queue;

// Run lifecycle: slot + credential context
pub mod coordinator;

// Secret pin parsing and resolution
pub mod secrets;

pub use coordinator::{ExecutionCoordinator, ExecutionScope, RunOutcome};
pub use queue::{ExecutionQueue, ExecutionSlot};
pub use secrets::{SecretPin, SecretResolver};
