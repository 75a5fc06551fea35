//! Execution-scoped credential resolution with a TTL cache
//!
//! Each workflow execution gets its own context id, bound to the user the execution
//! runs as. Credentials are resolved by name or id within that context, decrypted, and
//! cached under `"{context_id}:{name_or_id}"` so that two executions never share
//! decrypted material. Entries expire after the cache TTL and are dropped wholesale
//! when the context is cleared. Credential edits are not pushed into the cache; a
//! running execution can observe the previous value for up to one TTL.

use crate::clock::{to_chrono, Clock, SystemClock};
use crate::config::CredentialConfig;
use crate::credentials::{
    cipher::CredentialCipher,
    error::CredentialError,
    store::CredentialStore,
    types::{is_uuid_shaped, CredentialRecord, KnownProvider, ResolvedCredential},
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};

/// A decrypted credential and the time it entered the cache
#[derive(Debug, Clone)]
struct CachedCredential {
    credential: ResolvedCredential,
    cached_at: DateTime<Utc>,
}

/// Cache occupancy for monitoring
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    /// Cached entries, expired or not
    pub entries: usize,
    /// Contexts currently bound to a user
    pub bound_contexts: usize,
}

fn cache_key(context_id: &str, name_or_id: &str) -> String {
    format!("{}:{}", context_id, name_or_id)
}

/// Resolves credentials for running executions
pub struct CredentialProvider {
    store: Arc<dyn CredentialStore>,
    cipher: Arc<dyn CredentialCipher>,
    /// context_id -> user_id
    bindings: RwLock<HashMap<String, String>>,
    /// "{context_id}:{name_or_id}" -> cached credential
    cache: Mutex<HashMap<String, CachedCredential>>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialProvider")
            .field("ttl", &self.ttl)
            .field("stats", &self.cache_stats())
            .finish()
    }
}

impl CredentialProvider {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        cipher: Arc<dyn CredentialCipher>,
        config: &CredentialConfig,
    ) -> Self {
        Self::with_clock(store, cipher, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn CredentialStore>,
        cipher: Arc<dyn CredentialCipher>,
        config: &CredentialConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            cipher,
            bindings: RwLock::new(HashMap::new()),
            cache: Mutex::new(HashMap::new()),
            ttl: to_chrono(config.cache_ttl),
            clock,
        }
    }

    /// Bind a context to the user it resolves credentials for (upsert)
    pub fn set_user_context(&self, context_id: &str, user_id: &str) {
        self.bindings
            .write()
            .insert(context_id.to_string(), user_id.to_string());
        tracing::debug!("🔗 Credential context {} bound to user {}", context_id, user_id);
    }

    /// Unbind a context and drop every credential cached under it
    ///
    /// Returns the number of cache entries removed.
    pub fn clear_user_context(&self, context_id: &str) -> usize {
        self.bindings.write().remove(context_id);

        let prefix = format!("{}:", context_id);
        let removed = {
            let mut cache = self.cache.lock();
            let before = cache.len();
            cache.retain(|key, _| !key.starts_with(&prefix));
            before - cache.len()
        };

        tracing::debug!(
            "🧽 Credential context {} cleared ({} cached entries dropped)",
            context_id,
            removed
        );
        removed
    }

    /// User bound to a context
    pub fn user_for_context(&self, context_id: &str) -> Result<String, CredentialError> {
        self.bindings
            .read()
            .get(context_id)
            .cloned()
            .ok_or_else(|| CredentialError::ContextNotBound {
                context_id: context_id.to_string(),
            })
    }

    /// Resolve a credential by name or id within a context
    ///
    /// Fails only when the context is unbound. A credential that cannot be found or
    /// decrypted resolves to `Ok(None)`.
    pub async fn get_credential(
        &self,
        name_or_id: &str,
        context_id: &str,
        service_type: Option<&str>,
    ) -> Result<Option<ResolvedCredential>, CredentialError> {
        let user_id = self.user_for_context(context_id)?;
        let key = cache_key(context_id, name_or_id);

        if let Some(credential) = self.cached(&key) {
            tracing::debug!("🎯 Credential cache hit: {}", key);
            return Ok(Some(credential));
        }

        tracing::debug!("🔍 Credential cache miss: {}", key);
        match self.fetch_and_decrypt(name_or_id, &user_id, service_type).await {
            Ok(Some(credential)) => {
                // Only cache for a context still bound to the same user; the bindings
                // read lock is held across the insert so clear_user_context cannot interleave.
                let bindings = self.bindings.read();
                if bindings.get(context_id) == Some(&user_id) {
                    self.cache.lock().insert(
                        key,
                        CachedCredential {
                            credential: credential.clone(),
                            cached_at: self.clock.now(),
                        },
                    );
                } else {
                    tracing::debug!(
                        "🧽 Credential context {} cleared during lookup, not caching {}",
                        context_id,
                        name_or_id
                    );
                }
                Ok(Some(credential))
            }
            Ok(None) => {
                tracing::warn!(
                    "⚠️ Credential '{}' not found for user {} (service: {})",
                    name_or_id,
                    user_id,
                    service_type.unwrap_or("any")
                );
                Ok(None)
            }
            Err(e) => {
                tracing::error!(
                    "❌ Failed to resolve credential '{}' for user {}: {}",
                    name_or_id,
                    user_id,
                    e
                );
                Ok(None)
            }
        }
    }

    /// Resolve a user's credential for a service
    ///
    /// Picks the credential named `credential_name` if given, otherwise the first active
    /// credential of that service type.
    pub async fn get_credential_by_service(
        &self,
        service_type: &str,
        context_id: &str,
        credential_name: Option<&str>,
    ) -> Result<Option<ResolvedCredential>, CredentialError> {
        let user_id = self.user_for_context(context_id)?;

        let candidates = match self
            .store
            .fetch_credentials_by_user(&user_id, Some(service_type))
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!(
                    "❌ Failed to list {} credentials for user {}: {}",
                    service_type,
                    user_id,
                    e
                );
                return Ok(None);
            }
        };

        let chosen = candidates.into_iter().find(|record| {
            record.is_active && credential_name.map_or(true, |name| record.name == name)
        });

        match chosen {
            Some(record) => {
                self.get_credential(&record.id, context_id, Some(service_type))
                    .await
            }
            None => {
                tracing::warn!(
                    "⚠️ No active {} credential{} for user {}",
                    service_type,
                    credential_name
                        .map(|name| format!(" named '{}'", name))
                        .unwrap_or_default(),
                    user_id
                );
                Ok(None)
            }
        }
    }

    /// The `api_key` field of the user's credential for a well-known provider
    pub async fn api_key_for(
        &self,
        provider: KnownProvider,
        context_id: &str,
        credential_name: Option<&str>,
    ) -> Result<Option<String>, CredentialError> {
        let credential = self
            .get_credential_by_service(provider.service_type(), context_id, credential_name)
            .await?;
        Ok(credential.and_then(|c| c.api_key()))
    }

    pub async fn openai_api_key(
        &self,
        context_id: &str,
        credential_name: Option<&str>,
    ) -> Result<Option<String>, CredentialError> {
        self.api_key_for(KnownProvider::OpenAi, context_id, credential_name).await
    }

    pub async fn anthropic_api_key(
        &self,
        context_id: &str,
        credential_name: Option<&str>,
    ) -> Result<Option<String>, CredentialError> {
        self.api_key_for(KnownProvider::Anthropic, context_id, credential_name).await
    }

    pub async fn tavily_api_key(
        &self,
        context_id: &str,
        credential_name: Option<&str>,
    ) -> Result<Option<String>, CredentialError> {
        self.api_key_for(KnownProvider::Tavily, context_id, credential_name).await
    }

    pub async fn cohere_api_key(
        &self,
        context_id: &str,
        credential_name: Option<&str>,
    ) -> Result<Option<String>, CredentialError> {
        self.api_key_for(KnownProvider::Cohere, context_id, credential_name).await
    }

    /// Drop every cached credential (bindings are kept)
    pub fn clear_cache(&self) {
        let mut cache = self.cache.lock();
        let dropped = cache.len();
        cache.clear();
        tracing::info!("🧽 Credential cache cleared ({} entries)", dropped);
    }

    pub fn cache_stats(&self) -> CacheStats {
        let entries = self.cache.lock().len();
        let bound_contexts = self.bindings.read().len();
        CacheStats { entries, bound_contexts }
    }

    /// Fresh cached entry, dropping it if it has outlived the TTL
    fn cached(&self, key: &str) -> Option<ResolvedCredential> {
        let now = self.clock.now();
        let mut cache = self.cache.lock();

        match cache.get(key) {
            Some(entry) if now - entry.cached_at < self.ttl => Some(entry.credential.clone()),
            Some(_) => {
                tracing::debug!("⌛ Cached credential expired: {}", key);
                cache.remove(key);
                None
            }
            None => None,
        }
    }

    async fn fetch_and_decrypt(
        &self,
        name_or_id: &str,
        user_id: &str,
        service_type: Option<&str>,
    ) -> Result<Option<ResolvedCredential>> {
        let Some(record) = self.fetch_record(name_or_id, user_id, service_type).await? else {
            return Ok(None);
        };

        let fields = self.cipher.decrypt(&record.encrypted_payload)?;
        tracing::debug!(
            "🔐 Decrypted credential {} ({}) for user {}",
            record.name,
            record.service_type,
            user_id
        );
        Ok(Some(ResolvedCredential::from_record(&record, fields)))
    }

    /// Id lookup first when the reference is UUID-shaped, then name lookup
    async fn fetch_record(
        &self,
        name_or_id: &str,
        user_id: &str,
        service_type: Option<&str>,
    ) -> Result<Option<CredentialRecord>> {
        let eligible = |record: &CredentialRecord| {
            record.is_active && service_type.map_or(true, |st| record.service_type == st)
        };

        if is_uuid_shaped(name_or_id) {
            if let Some(record) = self.store.fetch_credential_by_id(name_or_id, user_id).await? {
                if eligible(&record) {
                    return Ok(Some(record));
                }
            }
        }

        let candidates = self
            .store
            .fetch_credentials_by_user(user_id, service_type)
            .await?;
        Ok(candidates
            .into_iter()
            .find(|record| record.name == name_or_id && eligible(record)))
    }
}
