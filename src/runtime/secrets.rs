//! Secret pin resolution for node execution
//!
//! Nodes reference credentials through pin expressions:
//! - `$secret.<name>` resolves to the credential's `api_key` field, or its only field
//! - `$secret.<name>.<field>` resolves to a named field
//!
//! `<name>` may also be a credential id. Pins resolve within the credential context
//! of the running execution.

use crate::credentials::{CredentialProvider, ResolvedCredential};
use anyhow::{anyhow, Result};
use std::{fmt, sync::Arc};

const SECRET_PREFIX: &str = "$secret.";
const DEFAULT_FIELD: &str = "api_key";

/// A parsed `$secret.` expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretPin {
    /// Credential name or id
    pub credential: String,
    pub field: Option<String>,
}

impl SecretPin {
    pub fn parse(expr: &str) -> Result<Self> {
        let rest = expr.trim().strip_prefix(SECRET_PREFIX).ok_or_else(|| {
            anyhow!("Invalid secret pin expression: {}. Must start with '{}'", expr, SECRET_PREFIX)
        })?;

        let (credential, field) = match rest.split_once('.') {
            Some((credential, field)) => (credential, Some(field)),
            None => (rest, None),
        };

        if credential.is_empty() || field.is_some_and(|f| f.is_empty() || f.contains('.')) {
            return Err(anyhow!(
                "Invalid secret pin expression: {}. Expected $secret.<name> or $secret.<name>.<field>",
                expr
            ));
        }

        Ok(Self {
            credential: credential.to_string(),
            field: field.map(str::to_string),
        })
    }

    /// Pick the pinned value out of a resolved credential
    fn select(&self, credential: &ResolvedCredential) -> Result<String> {
        if let Some(field) = &self.field {
            return credential
                .field_str(field)
                .ok_or_else(|| anyhow!("Credential '{}' has no field '{}'", self.credential, field));
        }

        if let Some(value) = credential.field_str(DEFAULT_FIELD) {
            return Ok(value);
        }

        match credential.fields.keys().collect::<Vec<_>>().as_slice() {
            [only] => credential
                .field_str(only)
                .ok_or_else(|| anyhow!("Credential '{}' has no field '{}'", self.credential, only)),
            keys => Err(anyhow!(
                "Credential '{}' has no '{}' field and {} others {:?}; pin a field explicitly",
                self.credential,
                DEFAULT_FIELD,
                keys.len(),
                keys
            )),
        }
    }
}

impl fmt::Display for SecretPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}{}.{}", SECRET_PREFIX, self.credential, field),
            None => write!(f, "{}{}", SECRET_PREFIX, self.credential),
        }
    }
}

/// Resolves secret pins through the credential cache
#[derive(Debug, Clone)]
pub struct SecretResolver {
    credentials: Arc<CredentialProvider>,
}

impl SecretResolver {
    pub fn new(credentials: Arc<CredentialProvider>) -> Self {
        Self { credentials }
    }

    /// Resolve one pin to its secret value
    ///
    /// Fails on invalid syntax, an unbound context, a missing credential or a missing
    /// field.
    pub async fn resolve(&self, expr: &str, context_id: &str) -> Result<String> {
        let pin = SecretPin::parse(expr)?;
        tracing::debug!("🔐 Evaluating secret pin: {}", pin);

        let credential = self
            .credentials
            .get_credential(&pin.credential, context_id, None)
            .await?
            .ok_or_else(|| anyhow!("Secret pin {} did not resolve to a credential", pin))?;

        pin.select(&credential)
    }

    /// Resolve a node's pins in declaration order
    pub async fn resolve_all(&self, pins: &[String], context_id: &str) -> Result<Vec<String>> {
        let mut secrets = Vec::with_capacity(pins.len());
        for pin in pins {
            secrets.push(self.resolve(pin, context_id).await?);
        }
        Ok(secrets)
    }
}
