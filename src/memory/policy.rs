//! Session bounding policies
//!
//! Four per-session limits are checked independently on every sweep: total age,
//! inactivity, message count and estimated size. The fifth limit (total session
//! count) is enforced when sessions are created.

use crate::clock::to_chrono;
use crate::config::MemoryPolicyConfig;
use crate::memory::manager::SessionMetrics;
use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// A limit a session has exceeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    Age { age: Duration, limit: Duration },
    Inactive { idle: Duration, limit: Duration },
    MessageCount { count: usize, limit: usize },
    Size { bytes: usize, limit: usize },
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyViolation::Age { age, limit } => write!(
                f,
                "session age {}s exceeds {}s",
                age.num_seconds(),
                limit.num_seconds()
            ),
            PolicyViolation::Inactive { idle, limit } => write!(
                f,
                "inactive for {}s (limit {}s)",
                idle.num_seconds(),
                limit.num_seconds()
            ),
            PolicyViolation::MessageCount { count, limit } => {
                write!(f, "{} messages exceeds {}", count, limit)
            }
            PolicyViolation::Size { bytes, limit } => {
                write!(f, "estimated size {} bytes exceeds {}", bytes, limit)
            }
        }
    }
}

/// Limits evaluated against session metrics
#[derive(Debug, Clone)]
pub struct MemoryPolicy {
    pub max_session_age: Duration,
    pub max_inactive: Duration,
    pub max_messages_per_session: usize,
    pub max_bytes_per_session: usize,
    pub max_total_sessions: usize,
}

impl From<&MemoryPolicyConfig> for MemoryPolicy {
    fn from(config: &MemoryPolicyConfig) -> Self {
        Self {
            max_session_age: to_chrono(config.max_session_age),
            max_inactive: to_chrono(config.max_inactive),
            max_messages_per_session: config.max_messages_per_session,
            max_bytes_per_session: config.max_bytes_per_session,
            max_total_sessions: config.max_total_sessions,
        }
    }
}

impl MemoryPolicy {
    /// Every limit the session currently exceeds
    pub fn violations(&self, metrics: &SessionMetrics, now: DateTime<Utc>) -> Vec<PolicyViolation> {
        let mut violations = Vec::new();

        let age = now - metrics.created_at;
        if age > self.max_session_age {
            violations.push(PolicyViolation::Age { age, limit: self.max_session_age });
        }

        let idle = now - metrics.last_accessed;
        if idle > self.max_inactive {
            violations.push(PolicyViolation::Inactive { idle, limit: self.max_inactive });
        }

        if metrics.message_count > self.max_messages_per_session {
            violations.push(PolicyViolation::MessageCount {
                count: metrics.message_count,
                limit: self.max_messages_per_session,
            });
        }

        if metrics.estimated_bytes > self.max_bytes_per_session {
            violations.push(PolicyViolation::Size {
                bytes: metrics.estimated_bytes,
                limit: self.max_bytes_per_session,
            });
        }

        violations
    }

    /// Human-readable eviction reason; `None` when no limit is exceeded
    pub fn eviction_reason(&self, metrics: &SessionMetrics, now: DateTime<Utc>) -> Option<String> {
        let violations = self.violations(metrics, now);
        if violations.is_empty() {
            return None;
        }

        Some(
            violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}
