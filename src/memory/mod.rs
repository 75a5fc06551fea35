//! Conversational Memory Layer
//!
//! Session-scoped chat memory for AI nodes, bounded by age, inactivity, message count,
//! size and total session count.

pub mod buffer;
pub mod policy;
pub mod manager;

pub use buffer::{BufferMemory, ChatMessage, ConversationMemory, MemoryOptions, MessageRole};
pub use manager::{EvictedSession, MemoryManager, MemoryStatistics, SessionInfo, SessionMetrics};
pub use policy::{MemoryPolicy, PolicyViolation};
