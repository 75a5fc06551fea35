//! Errors surfaced by credential resolution

use thiserror::Error;

/// Caller-misuse errors raised by the credential provider
///
/// A missing or undecryptable credential is not an error (it resolves to `None`); only
/// using a context that was never bound to a user is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("No user bound to credential context '{context_id}'")]
    ContextNotBound { context_id: String },
}
