//! Credential record and resolved-credential types
//!
//! `CredentialRecord` is what the store hands back (payload still encrypted).
//! `ResolvedCredential` is the decrypted result: a fixed envelope plus the
//! provider-specific fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A stored credential as returned by the credential store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialRecord {
    /// UUID of the credential
    pub id: String,
    /// Owning user
    pub user_id: String,
    /// User-chosen name (e.g., "openai-prod")
    pub name: String,
    /// Provider/service tag (e.g., "openai", "postgres")
    pub service_type: String,
    /// Inactive credentials are never resolved
    pub is_active: bool,
    /// Ciphertext produced by the credential cipher
    pub encrypted_payload: String,
}

/// Decrypted credential handed to node execution
///
/// The envelope fields are fixed; everything the user stored with the credential
/// (api keys, connection strings, endpoints...) lives in `fields`.
#[derive(Clone, PartialEq)]
pub struct ResolvedCredential {
    pub id: String,
    pub name: String,
    pub service_type: String,
    pub fields: Map<String, Value>,
}

impl ResolvedCredential {
    /// Build from a record and its decrypted payload
    pub fn from_record(record: &CredentialRecord, fields: Map<String, Value>) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            service_type: record.service_type.clone(),
            fields,
        }
    }

    /// Raw field lookup
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// String field lookup; non-string values are rendered as JSON
    pub fn field_str(&self, key: &str) -> Option<String> {
        self.fields.get(key).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn api_key(&self) -> Option<String> {
        self.field_str("api_key")
    }

    /// Flat view: envelope fields merged over the payload
    ///
    /// Envelope keys win if the payload happens to contain `id`, `name` or
    /// `service_type`.
    pub fn to_flat_map(&self) -> Map<String, Value> {
        let mut flat = self.fields.clone();
        flat.insert("id".to_string(), Value::String(self.id.clone()));
        flat.insert("name".to_string(), Value::String(self.name.clone()));
        flat.insert("service_type".to_string(), Value::String(self.service_type.clone()));
        flat
    }
}

impl fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("service_type", &self.service_type)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Providers with a dedicated api-key resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownProvider {
    OpenAi,
    Anthropic,
    Tavily,
    Cohere,
}

impl KnownProvider {
    /// Service type tag the provider's credentials are stored under
    pub fn service_type(&self) -> &'static str {
        match self {
            KnownProvider::OpenAi => "openai",
            KnownProvider::Anthropic => "anthropic",
            KnownProvider::Tavily => "tavily",
            KnownProvider::Cohere => "cohere",
        }
    }
}

/// Whether a reference looks like a credential id rather than a name
pub fn is_uuid_shaped(name_or_id: &str) -> bool {
    name_or_id.len() == 36 && uuid::Uuid::parse_str(name_or_id).is_ok()
}
