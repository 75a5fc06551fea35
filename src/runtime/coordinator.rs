//! Execution lifecycle glue
//!
//! Ties one workflow run to the exclusion gate and the credential cache: a run first
//! claims the `(workflow_id, user_id)` slot, then gets a fresh credential context bound
//! to the user. Both are released together when the run ends, whatever its outcome.

use crate::credentials::CredentialProvider;
use crate::runtime::queue::ExecutionQueue;
use anyhow::Result;
use std::{future::Future, sync::Arc};
use uuid::Uuid;

/// Identity of one admitted run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionScope {
    pub workflow_id: String,
    pub user_id: String,
    pub execution_id: String,
    /// Credential context bound to `user_id` for the duration of the run
    pub context_id: String,
}

/// Result of `ExecutionCoordinator::run`
#[derive(Debug, PartialEq, Eq)]
pub enum RunOutcome<T> {
    /// Another run of the same workflow for the same user holds the slot
    AlreadyRunning,
    Completed(T),
}

#[derive(Debug, Clone)]
pub struct ExecutionCoordinator {
    queue: Arc<ExecutionQueue>,
    credentials: Arc<CredentialProvider>,
}

impl ExecutionCoordinator {
    pub fn new(queue: Arc<ExecutionQueue>, credentials: Arc<CredentialProvider>) -> Self {
        Self { queue, credentials }
    }

    pub fn queue(&self) -> &Arc<ExecutionQueue> {
        &self.queue
    }

    pub fn credentials(&self) -> &Arc<CredentialProvider> {
        &self.credentials
    }

    /// Claim the slot and open a credential context
    ///
    /// Returns `None` when the workflow is already running for this user.
    pub async fn begin(&self, workflow_id: &str, user_id: &str) -> Option<ExecutionScope> {
        let execution_id = Uuid::new_v4().to_string();
        if !self.queue.acquire(workflow_id, user_id, &execution_id).await {
            tracing::info!(
                "⏸️ Workflow {} already running for user {}, skipping",
                workflow_id,
                user_id
            );
            return None;
        }

        let context_id = Uuid::new_v4().to_string();
        self.credentials.set_user_context(&context_id, user_id);

        tracing::info!(
            "🚀 Execution {} started for workflow {} (user {})",
            execution_id,
            workflow_id,
            user_id
        );
        Some(ExecutionScope {
            workflow_id: workflow_id.to_string(),
            user_id: user_id.to_string(),
            execution_id,
            context_id,
        })
    }

    /// Close the credential context and free the slot
    pub fn finish(&self, scope: &ExecutionScope) {
        self.credentials.clear_user_context(&scope.context_id);
        self.queue.release(&scope.workflow_id, &scope.user_id);
        tracing::info!("🏁 Execution {} finished", scope.execution_id);
    }

    /// Run `f` inside a scope
    ///
    /// The scope is finished when `f` returns, fails, panics, or when the returned
    /// future is dropped before completion.
    pub async fn run<T, F, Fut>(&self, workflow_id: &str, user_id: &str, f: F) -> Result<RunOutcome<T>>
    where
        F: FnOnce(ExecutionScope) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(scope) = self.begin(workflow_id, user_id).await else {
            return Ok(RunOutcome::AlreadyRunning);
        };

        let mut guard = ScopeGuard { coordinator: self, scope, completed: false };
        let result = f(guard.scope.clone()).await;
        guard.completed = true;

        if let Err(e) = &result {
            tracing::error!("❌ Execution {} failed: {}", guard.scope.execution_id, e);
        }
        drop(guard);

        result.map(RunOutcome::Completed)
    }
}

/// Finishes its scope on drop
struct ScopeGuard<'a> {
    coordinator: &'a ExecutionCoordinator,
    scope: ExecutionScope,
    completed: bool,
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            tracing::warn!(
                "⚠️ Execution {} abandoned before completion, releasing its slot",
                self.scope.execution_id
            );
        }
        self.coordinator.finish(&self.scope);
    }
}
