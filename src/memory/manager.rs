//! Policy-driven conversational memory manager
//!
//! Owns one memory object per session id and reclaims sessions that exceed any of the
//! configured limits. A dedicated OS thread sweeps all sessions every `sweep_interval`;
//! creating a session past the total-session ceiling synchronously evicts the least
//! recently used quarter first.
//!
//! A single mutex guards the session map. Eviction callbacks are invoked after the
//! session has been detached from the map but while the evicted memory is still alive,
//! and never with the lock held, so a callback may call back into the manager.

use crate::clock::{Clock, SystemClock};
use crate::config::MemoryPolicyConfig;
use crate::memory::buffer::{BufferMemory, ConversationMemory, MemoryOptions};
use crate::memory::policy::MemoryPolicy;
use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        mpsc::{self, RecvTimeoutError},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

/// Pause after a failed sweep pass before the next attempt
const SWEEP_ERROR_BACKOFF: Duration = Duration::from_secs(60);

/// How long `shutdown` waits for the sweeper thread to exit
const SWEEPER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-session bookkeeping
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionMetrics {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    pub message_count: usize,
    pub estimated_bytes: usize,
    pub node_type: String,
}

/// Detailed view of one session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    #[serde(flatten)]
    pub metrics: SessionMetrics,
    pub age_seconds: i64,
    pub idle_seconds: i64,
}

/// Aggregate view over all live sessions
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStatistics {
    pub active_sessions: usize,
    pub total_messages: usize,
    pub total_estimated_bytes: usize,
    pub average_messages_per_session: f64,
    pub oldest_session_age_seconds: Option<i64>,
    pub average_session_age_seconds: Option<f64>,
    pub sweeper_running: bool,
    pub policy: MemoryPolicyConfig,
}

/// A session that has just been removed from the manager
pub struct EvictedSession<M> {
    pub session_id: String,
    pub memory: Arc<M>,
    pub metrics: SessionMetrics,
    pub reason: String,
}

type CleanupCallback<M> = Arc<dyn Fn(&EvictedSession<M>) + Send + Sync>;
type MemoryFactory<M> = Box<dyn Fn(&MemoryOptions) -> M + Send + Sync>;

struct Session<M> {
    memory: Arc<M>,
    metrics: SessionMetrics,
}

impl<M: ConversationMemory> Session<M> {
    /// Recompute content-derived metrics from the underlying buffer
    fn refresh(&mut self) {
        self.metrics.message_count = self.memory.message_count();
        self.metrics.estimated_bytes = self.memory.estimated_size();
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.metrics.last_accessed = now;
        self.metrics.access_count += 1;
        self.refresh();
    }

    fn into_evicted(self, reason: String) -> EvictedSession<M> {
        EvictedSession {
            session_id: self.metrics.session_id.clone(),
            memory: self.memory,
            metrics: self.metrics,
            reason,
        }
    }
}

/// State shared between the manager handle and the sweeper thread
struct Shared<M> {
    sessions: Mutex<HashMap<String, Session<M>>>,
    callbacks: RwLock<Vec<CleanupCallback<M>>>,
    policy: MemoryPolicy,
    factory: MemoryFactory<M>,
    clock: Arc<dyn Clock>,
}

impl<M: ConversationMemory> Shared<M> {
    /// Invoke every registered callback for every evicted session
    ///
    /// A panicking callback is logged and skipped.
    fn notify_evicted(&self, evicted: &[EvictedSession<M>]) {
        if evicted.is_empty() {
            return;
        }

        let callbacks: Vec<CleanupCallback<M>> = self.callbacks.read().clone();
        for session in evicted {
            for callback in &callbacks {
                if catch_unwind(AssertUnwindSafe(|| callback(session))).is_err() {
                    tracing::warn!(
                        "⚠️ Cleanup callback failed for session {}",
                        session.session_id
                    );
                }
            }
            tracing::info!(
                "🗑️ Evicted memory session {} ({} messages): {}",
                session.session_id,
                session.metrics.message_count,
                session.reason
            );
        }
    }

    /// One policy pass over every session; returns the number evicted
    fn sweep(&self) -> usize {
        let now = self.clock.now();

        let evicted: Vec<EvictedSession<M>> = {
            let mut sessions = self.sessions.lock();

            let mut doomed = Vec::new();
            for (session_id, session) in sessions.iter_mut() {
                session.refresh();
                if let Some(reason) = self.policy.eviction_reason(&session.metrics, now) {
                    doomed.push((session_id.clone(), reason));
                }
            }

            doomed
                .into_iter()
                .filter_map(|(session_id, reason)| {
                    sessions
                        .remove(&session_id)
                        .map(|session| session.into_evicted(reason))
                })
                .collect()
        };

        self.notify_evicted(&evicted);

        if evicted.is_empty() {
            tracing::debug!("🧹 Memory sweep complete, nothing to evict");
        } else {
            tracing::info!("🧹 Memory sweep evicted {} sessions", evicted.len());
        }
        evicted.len()
    }

    /// Detach the least recently used quarter of the sessions (at least one)
    fn detach_oldest_quartile(sessions: &mut HashMap<String, Session<M>>) -> Vec<EvictedSession<M>> {
        if sessions.is_empty() {
            return Vec::new();
        }

        let mut by_age: Vec<(DateTime<Utc>, DateTime<Utc>, String)> = sessions
            .values()
            .map(|s| (s.metrics.last_accessed, s.metrics.created_at, s.metrics.session_id.clone()))
            .collect();
        by_age.sort();

        let quota = (sessions.len() / 4).max(1);
        by_age
            .into_iter()
            .take(quota)
            .filter_map(|(_, _, session_id)| {
                sessions
                    .remove(&session_id)
                    .map(|session| session.into_evicted("memory pressure".to_string()))
            })
            .collect()
    }

    fn drain_all(&self, reason: &str) -> usize {
        let evicted: Vec<EvictedSession<M>> = self
            .sessions
            .lock()
            .drain()
            .map(|(_, session)| session.into_evicted(reason.to_string()))
            .collect();

        self.notify_evicted(&evicted);
        evicted.len()
    }
}

/// Handle on the running sweeper thread
struct Sweeper {
    stop: mpsc::Sender<()>,
    exited: mpsc::Receiver<()>,
    thread: JoinHandle<()>,
}

/// Session-scoped conversational memory store
pub struct MemoryManager<M: ConversationMemory = BufferMemory> {
    shared: Arc<Shared<M>>,
    config: MemoryPolicyConfig,
    sweeper: Mutex<Option<Sweeper>>,
}

impl MemoryManager<BufferMemory> {
    /// Manager producing `BufferMemory` sessions, on the system clock
    pub fn new(config: &MemoryPolicyConfig) -> Self {
        Self::with_factory(config, Arc::new(SystemClock), BufferMemory::new)
    }
}

impl<M: ConversationMemory> MemoryManager<M> {
    /// Manager producing sessions with a custom memory constructor
    ///
    /// The sweeper thread is not started; call `start_sweeper`.
    pub fn with_factory<F>(config: &MemoryPolicyConfig, clock: Arc<dyn Clock>, factory: F) -> Self
    where
        F: Fn(&MemoryOptions) -> M + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                sessions: Mutex::new(HashMap::new()),
                callbacks: RwLock::new(Vec::new()),
                policy: MemoryPolicy::from(config),
                factory: Box::new(factory),
                clock,
            }),
            config: config.clone(),
            sweeper: Mutex::new(None),
        }
    }

    /// Spawn the background sweeper thread (no-op when already running)
    pub fn start_sweeper(&self) -> Result<()> {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (exited_tx, exited_rx) = mpsc::channel::<()>();
        let shared = Arc::clone(&self.shared);
        let interval = self.config.sweep_interval;

        let thread = std::thread::Builder::new()
            .name("memory-sweeper".to_string())
            .spawn(move || {
                sweep_loop(&shared, interval, &stop_rx);
                let _ = exited_tx.send(());
            })
            .map_err(|e| anyhow::anyhow!("Failed to spawn memory sweeper thread: {}", e))?;

        tracing::info!("🧹 Memory sweeper started (interval {:?})", interval);
        *sweeper = Some(Sweeper { stop: stop_tx, exited: exited_rx, thread });
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.sweeper.lock().is_some()
    }

    /// Memory for a session, created on first use
    ///
    /// Creating a new session while at the session ceiling first evicts the least
    /// recently used quarter. Every call refreshes the session's access metrics.
    /// The returned handle may be evicted by a later sweep; re-fetch instead of
    /// holding it across requests.
    pub fn get_or_create(&self, session_id: &str, options: &MemoryOptions) -> Arc<M> {
        let now = self.shared.clock.now();

        let (memory, evicted) = {
            let mut sessions = self.shared.sessions.lock();

            let evicted = if !sessions.contains_key(session_id)
                && sessions.len() >= self.shared.policy.max_total_sessions
            {
                tracing::warn!(
                    "⚠️ Memory session ceiling reached ({}), evicting oldest quartile",
                    sessions.len()
                );
                Shared::detach_oldest_quartile(&mut sessions)
            } else {
                Vec::new()
            };

            let session = sessions.entry(session_id.to_string()).or_insert_with(|| {
                tracing::debug!("🧠 Creating memory session {} ({})", session_id, options.node_type);
                Session {
                    memory: Arc::new((self.shared.factory)(options)),
                    metrics: SessionMetrics {
                        session_id: session_id.to_string(),
                        created_at: now,
                        last_accessed: now,
                        access_count: 0,
                        message_count: 0,
                        estimated_bytes: 0,
                        node_type: options.node_type.clone(),
                    },
                }
            });
            session.touch(now);

            (Arc::clone(&session.memory), evicted)
        };

        self.shared.notify_evicted(&evicted);
        memory
    }

    /// Evict one session; returns `false` if it did not exist
    pub fn cleanup(&self, session_id: &str, reason: &str) -> bool {
        let removed = self.shared.sessions.lock().remove(session_id);

        match removed {
            Some(session) => {
                self.shared
                    .notify_evicted(&[session.into_evicted(reason.to_string())]);
                true
            }
            None => false,
        }
    }

    /// Register a callback run for every evicted session, in registration order
    pub fn register_cleanup_callback<F>(&self, callback: F)
    where
        F: Fn(&EvictedSession<M>) + Send + Sync + 'static,
    {
        self.shared.callbacks.write().push(Arc::new(callback));
    }

    /// Run one policy sweep now; returns the number of sessions evicted
    pub fn sweep_now(&self) -> usize {
        self.shared.sweep()
    }

    /// Evict the least recently used quarter of the sessions
    pub fn force_evict_oldest_quartile(&self) -> usize {
        let evicted = Shared::detach_oldest_quartile(&mut self.shared.sessions.lock());
        self.shared.notify_evicted(&evicted);
        evicted.len()
    }

    pub fn session_count(&self) -> usize {
        self.shared.sessions.lock().len()
    }

    pub fn get_statistics(&self) -> MemoryStatistics {
        let now = self.shared.clock.now();
        let snapshot: Vec<SessionMetrics> = self
            .shared
            .sessions
            .lock()
            .values()
            .map(|s| s.metrics.clone())
            .collect();

        let active_sessions = snapshot.len();
        let total_messages: usize = snapshot.iter().map(|m| m.message_count).sum();
        let total_estimated_bytes = snapshot.iter().map(|m| m.estimated_bytes).sum();
        let ages: Vec<i64> = snapshot
            .iter()
            .map(|m| (now - m.created_at).num_seconds())
            .collect();

        MemoryStatistics {
            active_sessions,
            total_messages,
            total_estimated_bytes,
            average_messages_per_session: if active_sessions == 0 {
                0.0
            } else {
                total_messages as f64 / active_sessions as f64
            },
            oldest_session_age_seconds: ages.iter().copied().max(),
            average_session_age_seconds: if ages.is_empty() {
                None
            } else {
                Some(ages.iter().sum::<i64>() as f64 / ages.len() as f64)
            },
            sweeper_running: self.is_running(),
            policy: self.config.clone(),
        }
    }

    pub fn get_session_info(&self, session_id: &str) -> Option<SessionInfo> {
        let now = self.shared.clock.now();
        let metrics = self
            .shared
            .sessions
            .lock()
            .get(session_id)
            .map(|s| s.metrics.clone())?;

        Some(SessionInfo {
            age_seconds: (now - metrics.created_at).num_seconds(),
            idle_seconds: (now - metrics.last_accessed).num_seconds(),
            metrics,
        })
    }

    /// Stop the sweeper and evict every remaining session
    pub fn shutdown(&self) {
        if let Some(sweeper) = self.sweeper.lock().take() {
            let _ = sweeper.stop.send(());
            match sweeper.exited.recv_timeout(SWEEPER_JOIN_TIMEOUT) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    if sweeper.thread.join().is_err() {
                        tracing::error!("❌ Memory sweeper thread panicked");
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(
                        "⚠️ Memory sweeper did not stop within {:?}, detaching",
                        SWEEPER_JOIN_TIMEOUT
                    );
                }
            }
        }

        let evicted = self.shared.drain_all("shutdown");
        tracing::info!("🛑 Memory manager shut down ({} sessions evicted)", evicted);
    }
}

impl<M: ConversationMemory> Drop for MemoryManager<M> {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            let _ = sweeper.stop.send(());
        }
    }
}

/// Body of the sweeper thread
///
/// Wakes every `interval` or when stop is signalled. A pass that panics is logged and
/// followed by a back-off pause.
fn sweep_loop<M: ConversationMemory>(shared: &Shared<M>, interval: Duration, stop: &mpsc::Receiver<()>) {
    loop {
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        if catch_unwind(AssertUnwindSafe(|| shared.sweep())).is_err() {
            tracing::error!(
                "❌ Memory sweep failed, backing off for {:?}",
                SWEEP_ERROR_BACKOFF
            );
            match stop.recv_timeout(SWEEP_ERROR_BACKOFF) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    tracing::info!("🧹 Memory sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager_with(config: MemoryPolicyConfig) -> (MemoryManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let manager = MemoryManager::with_factory(&config, clock.clone(), BufferMemory::new);
        (manager, clock)
    }

    fn manager() -> (MemoryManager, Arc<ManualClock>) {
        manager_with(MemoryPolicyConfig::default())
    }

    #[test]
    fn test_same_session_returns_same_memory() {
        let (manager, _clock) = manager();
        let options = MemoryOptions::default();

        let first = manager.get_or_create("s1", &options);
        let second = manager.get_or_create("s1", &options);
        assert!(Arc::ptr_eq(&first, &second));

        let info = manager.get_session_info("s1").unwrap();
        assert_eq!(info.metrics.access_count, 2);

        manager.get_or_create("s1", &options);
        assert_eq!(manager.get_session_info("s1").unwrap().metrics.access_count, 3);
        assert_eq!(manager.session_count(), 1);
    }

    #[test]
    fn test_access_refreshes_metrics() {
        let (manager, clock) = manager();
        let options = MemoryOptions { node_type: "ChatMemory".to_string(), ..MemoryOptions::default() };

        let memory = manager.get_or_create("s1", &options);
        memory.add_user_message("hello");
        clock.advance(chrono::Duration::seconds(30));
        manager.get_or_create("s1", &options);

        let info = manager.get_session_info("s1").unwrap();
        assert_eq!(info.metrics.message_count, 1);
        assert!(info.metrics.estimated_bytes > 0);
        assert_eq!(info.metrics.node_type, "ChatMemory");
        assert_eq!(info.age_seconds, 30);
        assert_eq!(info.idle_seconds, 0);
    }

    #[test]
    fn test_message_count_violation_is_evicted() {
        let (manager, _clock) = manager();
        let memory = manager.get_or_create("chatty", &MemoryOptions::default());
        manager.get_or_create("quiet", &MemoryOptions::default());

        for i in 0..1001 {
            memory.add_user_message(format!("message {}", i));
        }

        assert_eq!(manager.sweep_now(), 1);
        assert!(manager.get_session_info("chatty").is_none());
        assert!(manager.get_session_info("quiet").is_some());
    }

    #[test]
    fn test_inactivity_eviction_spares_recent_sessions() {
        let (manager, clock) = manager();
        let options = MemoryOptions::default();
        manager.get_or_create("idle", &options);
        manager.get_or_create("active", &options);

        clock.advance(chrono::Duration::minutes(119));
        manager.get_or_create("active", &options);
        clock.advance(chrono::Duration::minutes(2));

        assert_eq!(manager.sweep_now(), 1);
        assert!(manager.get_session_info("idle").is_none());
        assert!(manager.get_session_info("active").is_some());
    }

    #[test]
    fn test_age_eviction_ignores_activity() {
        let (manager, clock) = manager();
        let options = MemoryOptions::default();
        manager.get_or_create("old", &options);

        for _ in 0..25 {
            clock.advance(chrono::Duration::hours(1));
            manager.get_or_create("old", &options);
        }

        let evicted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&evicted);
        manager.register_cleanup_callback(move |session: &EvictedSession<BufferMemory>| {
            sink.lock().push(session.reason.clone());
        });

        assert_eq!(manager.sweep_now(), 1);
        let reasons = evicted.lock();
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].starts_with("session age"));
    }

    #[test]
    fn test_size_violation_is_evicted() {
        let (manager, _clock) = manager_with(MemoryPolicyConfig {
            max_bytes_per_session: 1024,
            ..MemoryPolicyConfig::default()
        });
        let memory = manager.get_or_create("big", &MemoryOptions::default());
        memory.add_ai_message("x".repeat(2048));

        assert_eq!(manager.sweep_now(), 1);
        assert_eq!(manager.session_count(), 0);
    }

    #[test]
    fn test_capacity_pressure_evicts_oldest_quartile() {
        let (manager, clock) = manager();
        let options = MemoryOptions::default();

        for i in 0..500 {
            manager.get_or_create(&format!("s{}", i), &options);
            clock.advance(chrono::Duration::seconds(1));
        }
        assert_eq!(manager.session_count(), 500);

        let evicted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&evicted);
        manager.register_cleanup_callback(move |_: &EvictedSession<BufferMemory>| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        manager.get_or_create("s500", &options);

        assert!(evicted.load(Ordering::SeqCst) >= 125);
        assert!(manager.get_session_info("s500").is_some());
        // least recently used go first
        assert!(manager.get_session_info("s0").is_none());
        assert!(manager.get_session_info("s499").is_some());
        assert_eq!(manager.session_count(), 500 - 125 + 1);
    }

    #[test]
    fn test_existing_session_at_ceiling_does_not_evict() {
        let (manager, _clock) = manager_with(MemoryPolicyConfig {
            max_total_sessions: 2,
            ..MemoryPolicyConfig::default()
        });
        let options = MemoryOptions::default();
        manager.get_or_create("a", &options);
        manager.get_or_create("b", &options);

        manager.get_or_create("a", &options);
        assert_eq!(manager.session_count(), 2);

        manager.get_or_create("c", &options);
        assert_eq!(manager.session_count(), 2);
        assert!(manager.get_session_info("c").is_some());
    }

    #[test]
    fn test_callbacks_run_in_order_and_survive_panics() {
        let (manager, _clock) = manager();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&calls);
        manager.register_cleanup_callback(move |session: &EvictedSession<BufferMemory>| {
            first.lock().push(format!("first:{}", session.session_id));
        });
        manager.register_cleanup_callback(|_: &EvictedSession<BufferMemory>| {
            panic!("callback failure");
        });
        let third = Arc::clone(&calls);
        manager.register_cleanup_callback(move |session: &EvictedSession<BufferMemory>| {
            third.lock().push(format!("third:{}", session.reason));
        });

        let memory = manager.get_or_create("s1", &MemoryOptions::default());
        memory.add_user_message("remember me");

        assert!(manager.cleanup("s1", "manual"));
        assert_eq!(*calls.lock(), vec!["first:s1".to_string(), "third:manual".to_string()]);
        assert!(manager.get_session_info("s1").is_none());
        assert!(!manager.cleanup("s1", "manual"));
    }

    #[test]
    fn test_callback_sees_memory_contents() {
        let (manager, _clock) = manager();
        let seen = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&seen);
        manager.register_cleanup_callback(move |session: &EvictedSession<BufferMemory>| {
            sink.store(session.memory.message_count(), Ordering::SeqCst);
        });

        let memory = manager.get_or_create("s1", &MemoryOptions::default());
        memory.add_user_message("one");
        memory.add_ai_message("two");
        drop(memory);

        manager.cleanup("s1", "manual");
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_callback_may_reenter_manager() {
        let (manager, _clock) = manager();
        let manager = Arc::new(manager);
        let observed = Arc::new(AtomicUsize::new(usize::MAX));

        let weak = Arc::downgrade(&manager);
        let sink = Arc::clone(&observed);
        manager.register_cleanup_callback(move |_: &EvictedSession<BufferMemory>| {
            if let Some(manager) = weak.upgrade() {
                sink.store(manager.session_count(), Ordering::SeqCst);
            }
        });

        manager.get_or_create("s1", &MemoryOptions::default());
        manager.get_or_create("s2", &MemoryOptions::default());
        manager.cleanup("s1", "manual");
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_force_evict_oldest_quartile() {
        let (manager, clock) = manager();
        for i in 0..8 {
            manager.get_or_create(&format!("s{}", i), &MemoryOptions::default());
            clock.advance(chrono::Duration::seconds(1));
        }

        assert_eq!(manager.force_evict_oldest_quartile(), 2);
        assert!(manager.get_session_info("s0").is_none());
        assert!(manager.get_session_info("s1").is_none());
        assert_eq!(manager.session_count(), 6);
    }

    #[test]
    fn test_statistics() {
        let (manager, clock) = manager();
        let a = manager.get_or_create("a", &MemoryOptions::default());
        a.add_user_message("hi");
        a.add_ai_message("hello");
        clock.advance(chrono::Duration::seconds(10));
        manager.get_or_create("b", &MemoryOptions::default());
        manager.get_or_create("a", &MemoryOptions::default());

        let stats = manager.get_statistics();
        assert_eq!(stats.active_sessions, 2);
        assert_eq!(stats.total_messages, 2);
        assert_eq!(stats.average_messages_per_session, 1.0);
        assert_eq!(stats.oldest_session_age_seconds, Some(10));
        assert_eq!(stats.average_session_age_seconds, Some(5.0));
        assert!(!stats.sweeper_running);
    }

    #[test]
    fn test_shutdown_evicts_everything() {
        let (manager, _clock) = manager();
        manager.start_sweeper().unwrap();
        assert!(manager.is_running());

        for i in 0..10 {
            manager.get_or_create(&format!("s{}", i), &MemoryOptions::default());
        }

        manager.shutdown();

        let stats = manager.get_statistics();
        assert_eq!(stats.active_sessions, 0);
        assert!(!stats.sweeper_running);
    }

    #[test]
    fn test_background_sweeper_evicts() {
        let config = MemoryPolicyConfig {
            max_messages_per_session: 1,
            sweep_interval: Duration::from_millis(20),
            ..MemoryPolicyConfig::default()
        };
        let manager = MemoryManager::new(&config);
        manager.start_sweeper().unwrap();
        manager.start_sweeper().unwrap();

        let memory = manager.get_or_create("s1", &MemoryOptions::default());
        memory.add_user_message("one");
        memory.add_ai_message("two");

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while manager.session_count() > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }

        assert_eq!(manager.session_count(), 0);
        manager.shutdown();
    }
}
