//! Per-workflow execution admission control
//!
//! Guarantees that at most one execution of a given workflow runs for a given user at
//! any instant. Callers acquire a slot keyed by `(workflow_id, user_id)` before running
//! and release it afterwards. A slot that was never released (crashed or abandoned run)
//! is reclaimed once it is older than the staleness threshold.

use crate::clock::{to_chrono, Clock, SystemClock};
use crate::config::QueueConfig;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::Notify;
use uuid::Uuid;

/// One in-flight workflow execution
///
/// Owned by the queue; callers only ever see snapshot copies.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ExecutionSlot {
    pub workflow_id: String,
    pub user_id: String,
    /// Opaque token identifying the run holding the slot
    pub execution_id: String,
    pub started_at: DateTime<Utc>,
}

/// Keyed mutual-exclusion gate for workflow executions
///
/// Per-key async locks are created lazily on first use and never removed, so the lock
/// map grows with the number of distinct workflow/user pairs seen by the process.
/// `lock_count` exposes that size for monitoring.
#[derive(Debug)]
pub struct ExecutionQueue {
    /// Serializes contending `acquire` calls per composite key
    key_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// Live slots by composite key
    active: Mutex<HashMap<String, ExecutionSlot>>,
    /// Signalled whenever a slot is freed so waiters can retry immediately
    released: Notify,
    stale_after: chrono::Duration,
    poll_interval: Duration,
    clock: Arc<dyn Clock>,
}

/// Composite key for a workflow/user pair
fn execution_key(workflow_id: &str, user_id: &str) -> String {
    format!("{}:{}", workflow_id, user_id)
}

impl ExecutionQueue {
    /// Create a queue using the system clock
    pub fn new(config: &QueueConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &QueueConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            key_locks: Mutex::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
            released: Notify::new(),
            stale_after: to_chrono(config.stale_after),
            poll_interval: config.poll_interval,
            clock,
        }
    }

    /// Get or lazily create the exclusion lock for a key (first use wins)
    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.key_locks.lock();
        Arc::clone(
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Try to claim the execution slot for a workflow/user pair
    ///
    /// Returns `false` when a live execution already holds the slot. This is the normal
    /// "already running" signal, not an error. A slot older than the staleness threshold
    /// is discarded and replaced.
    pub async fn acquire(&self, workflow_id: &str, user_id: &str, execution_id: &str) -> bool {
        let key = execution_key(workflow_id, user_id);
        let key_lock = self.key_lock(&key);
        let _exclusive = key_lock.lock().await;

        let now = self.clock.now();
        let mut active = self.active.lock();

        if let Some(existing) = active.get(&key) {
            let age = now - existing.started_at;
            if age <= self.stale_after {
                tracing::debug!(
                    "⏳ Workflow {} already running for user {} (execution {})",
                    workflow_id,
                    user_id,
                    existing.execution_id
                );
                return false;
            }

            tracing::warn!(
                "♻️ Reclaiming stale execution slot {} for {} (held for {}s)",
                existing.execution_id,
                key,
                age.num_seconds()
            );
        }

        active.insert(
            key,
            ExecutionSlot {
                workflow_id: workflow_id.to_string(),
                user_id: user_id.to_string(),
                execution_id: execution_id.to_string(),
                started_at: now,
            },
        );

        tracing::info!(
            "🔒 Execution slot acquired: workflow {} user {} (execution {})",
            workflow_id,
            user_id,
            execution_id
        );
        true
    }

    /// Free the slot for a workflow/user pair; no-op when nothing is held
    pub fn release(&self, workflow_id: &str, user_id: &str) {
        let removed = self.active.lock().remove(&execution_key(workflow_id, user_id));

        if let Some(slot) = removed {
            tracing::info!(
                "🔓 Execution slot released: workflow {} user {} (execution {})",
                workflow_id,
                user_id,
                slot.execution_id
            );
            self.released.notify_waiters();
        }
    }

    /// Wait up to `timeout` for the slot to become available
    ///
    /// Retries acquisition whenever any slot is released and at least once per poll
    /// interval. Waiters are not ordered: under contention any of them may win.
    /// Returns `false` once the timeout elapses.
    pub async fn wait_for_slot(&self, workflow_id: &str, user_id: &str, timeout: Duration) -> bool {
        let execution_id = Uuid::new_v4().to_string();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // Register interest before trying so a release between the attempt and the
            // wait is not missed.
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.acquire(workflow_id, user_id, &execution_id).await {
                return true;
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                tracing::debug!(
                    "⌛ Timed out after {:?} waiting for workflow {} user {}",
                    timeout,
                    workflow_id,
                    user_id
                );
                return false;
            }

            let wake_at = std::cmp::min(now + self.poll_interval, deadline);
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    /// Snapshot of all live slots, oldest first
    pub fn list_active(&self) -> Vec<ExecutionSlot> {
        let mut slots: Vec<ExecutionSlot> = self.active.lock().values().cloned().collect();
        slots.sort_by_key(|slot| slot.started_at);
        slots
    }

    /// Remove every slot older than the staleness threshold
    ///
    /// Returns the number of slots removed.
    pub fn sweep_stale(&self) -> usize {
        let now = self.clock.now();
        let stale_after = self.stale_after;

        let removed = {
            let mut active = self.active.lock();
            let before = active.len();
            active.retain(|key, slot| {
                let keep = now - slot.started_at <= stale_after;
                if !keep {
                    tracing::warn!(
                        "🧹 Removing stale execution {} for {} (started {})",
                        slot.execution_id,
                        key,
                        slot.started_at.to_rfc3339()
                    );
                }
                keep
            });
            before - active.len()
        };

        if removed > 0 {
            tracing::info!("🧹 Swept {} stale execution slots", removed);
            self.released.notify_waiters();
        }
        removed
    }

    /// Whether a slot is currently held for the pair (stale or not)
    pub fn is_running(&self, workflow_id: &str, user_id: &str) -> bool {
        self.active.lock().contains_key(&execution_key(workflow_id, user_id))
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Number of per-key locks created so far
    pub fn lock_count(&self) -> usize {
        self.key_locks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Instant;

    fn queue_with_clock() -> (ExecutionQueue, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let queue = ExecutionQueue::with_clock(&QueueConfig::default(), clock.clone());
        (queue, clock)
    }

    #[tokio::test]
    async fn test_second_acquire_is_rejected_until_release() {
        let (queue, _clock) = queue_with_clock();

        assert!(queue.acquire("wf-1", "alice", "exec-1").await);
        assert!(!queue.acquire("wf-1", "alice", "exec-2").await);

        queue.release("wf-1", "alice");
        assert!(queue.acquire("wf-1", "alice", "exec-3").await);

        let active = queue.list_active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].execution_id, "exec-3");
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let (queue, _clock) = queue_with_clock();

        assert!(queue.acquire("wf-1", "alice", "a").await);
        assert!(queue.acquire("wf-1", "bob", "b").await);
        assert!(queue.acquire("wf-2", "alice", "c").await);
        assert_eq!(queue.active_count(), 3);
        assert_eq!(queue.lock_count(), 3);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (queue, _clock) = queue_with_clock();

        queue.release("wf-1", "alice");
        assert!(queue.acquire("wf-1", "alice", "exec-1").await);
        queue.release("wf-1", "alice");
        queue.release("wf-1", "alice");
        assert!(!queue.is_running("wf-1", "alice"));
    }

    #[tokio::test]
    async fn test_stale_slot_is_reclaimed_on_acquire() {
        let (queue, clock) = queue_with_clock();

        assert!(queue.acquire("wf-1", "alice", "crashed").await);

        clock.advance(chrono::Duration::minutes(30));
        assert!(!queue.acquire("wf-1", "alice", "too-early").await);

        clock.advance(chrono::Duration::minutes(1));
        assert!(queue.acquire("wf-1", "alice", "fresh").await);

        let active = queue.list_active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].execution_id, "fresh");
    }

    #[tokio::test]
    async fn test_sweep_stale_only_removes_old_slots() {
        let (queue, clock) = queue_with_clock();

        assert!(queue.acquire("wf-old", "alice", "old").await);
        clock.advance(chrono::Duration::minutes(20));
        assert!(queue.acquire("wf-new", "alice", "new").await);
        clock.advance(chrono::Duration::minutes(15));

        assert_eq!(queue.sweep_stale(), 1);
        assert!(!queue.is_running("wf-old", "alice"));
        assert!(queue.is_running("wf-new", "alice"));
        assert_eq!(queue.sweep_stale(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_admits_exactly_one() {
        let queue = Arc::new(ExecutionQueue::new(&QueueConfig::default()));

        let mut handles = Vec::new();
        for i in 0..16 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                queue.acquire("wf-1", "alice", &format!("exec-{}", i)).await
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }

    #[tokio::test]
    async fn test_wait_for_slot_times_out_on_held_key() {
        let queue = ExecutionQueue::new(&QueueConfig::default());
        assert!(queue.acquire("wf-1", "alice", "holder").await);

        let started = Instant::now();
        let acquired = queue.wait_for_slot("wf-1", "alice", Duration::from_secs(2)).await;
        let elapsed = started.elapsed();

        assert!(!acquired);
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_wait_for_slot_wakes_on_release() {
        let config = QueueConfig {
            poll_interval: Duration::from_secs(30),
            ..QueueConfig::default()
        };
        let queue = Arc::new(ExecutionQueue::new(&config));
        assert!(queue.acquire("wf-1", "alice", "holder").await);

        let releaser = Arc::clone(&queue);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            releaser.release("wf-1", "alice");
        });

        let started = Instant::now();
        assert!(queue.wait_for_slot("wf-1", "alice", Duration::from_secs(10)).await);
        assert!(started.elapsed() < Duration::from_secs(5));

        let active = queue.list_active();
        assert_eq!(active.len(), 1);
        assert_ne!(active[0].execution_id, "holder");
    }

    #[tokio::test]
    async fn test_wait_for_free_slot_returns_immediately() {
        let queue = ExecutionQueue::new(&QueueConfig::default());
        assert!(queue.wait_for_slot("wf-1", "alice", Duration::from_secs(1)).await);
        assert!(queue.is_running("wf-1", "alice"));
    }
}
