//! Credential Resolution Layer
//!
//! Resolves symbolic credential references from running workflows into decrypted
//! secret material. It handles:
//! - Binding execution contexts to users
//! - TTL caching scoped to one execution context
//! - Encrypted persistence in SQLite

// Caller-misuse error type
pub mod error;

// Stored and resolved credential types
pub mod types;

// AES-256-GCM payload encryption
pub mod cipher;

// Storage contract and SQLite implementation
pub mod store;

// Context-scoped TTL cache
pub mod provider;

pub use cipher::{AesGcmCipher, CredentialCipher};
pub use error::CredentialError;
pub use provider::{CacheStats, CredentialProvider};
pub use store::{CredentialStore, SqliteCredentialStore};
pub use types::{CredentialRecord, KnownProvider, ResolvedCredential};
