//! Credential persistence
//!
//! The provider only needs two lookups from storage: by id for a user, and all
//! credentials of a user (optionally of one service type). `SqliteCredentialStore`
//! implements them on a sqlx SQLite pool; payloads are stored already encrypted.

use crate::credentials::types::CredentialRecord;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow},
    Row,
};
use std::path::Path;

/// Lookup contract the credential provider is implemented against
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetch a credential by id, restricted to the given owner
    async fn fetch_credential_by_id(&self, id: &str, user_id: &str) -> Result<Option<CredentialRecord>>;

    /// All credentials owned by a user, optionally filtered by service type
    async fn fetch_credentials_by_user(
        &self,
        user_id: &str,
        service_type: Option<&str>,
    ) -> Result<Vec<CredentialRecord>>;
}

/// SQLite-backed credential store
#[derive(Debug, Clone)]
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    /// Wrap an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the credential database file and initialize its schema
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!("Failed to create credential directory '{}': {}", parent.display(), e)
            })?;
        }

        tracing::info!("🗄️ Opening credential database: {}", db_path.display());
        let options = SqliteConnectOptions::new().filename(db_path).create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        let store = Self::new(pool);
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory database on a single connection (every connection would otherwise
    /// get its own empty database)
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self::new(pool);
        store.init_schema().await?;
        Ok(store)
    }

    /// Create the credentials table and its lookup indexes
    ///
    /// Safe to call multiple times (uses IF NOT EXISTS).
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                service_type TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                encrypted_payload TEXT NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_credentials_user_service ON credentials(user_id, service_type)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or update a credential
    pub async fn save_credential(&self, record: &CredentialRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO credentials (id, user_id, name, service_type, is_active, encrypted_payload, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                name = excluded.name,
                service_type = excluded.service_type,
                is_active = excluded.is_active,
                encrypted_payload = excluded.encrypted_payload,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(&record.name)
        .bind(&record.service_type)
        .bind(record.is_active)
        .bind(&record.encrypted_payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove a credential; returns whether a row was deleted
    pub async fn delete_credential(&self, id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM credentials WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn record_from_row(row: &SqliteRow) -> CredentialRecord {
    CredentialRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        name: row.get("name"),
        service_type: row.get("service_type"),
        is_active: row.get("is_active"),
        encrypted_payload: row.get("encrypted_payload"),
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn fetch_credential_by_id(&self, id: &str, user_id: &str) -> Result<Option<CredentialRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, name, service_type, is_active, encrypted_payload
            FROM credentials WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(record_from_row))
    }

    async fn fetch_credentials_by_user(
        &self,
        user_id: &str,
        service_type: Option<&str>,
    ) -> Result<Vec<CredentialRecord>> {
        let rows = match service_type {
            Some(service_type) => {
                sqlx::query(
                    r#"
                    SELECT id, user_id, name, service_type, is_active, encrypted_payload
                    FROM credentials WHERE user_id = ? AND service_type = ?
                    ORDER BY created_at, rowid
                    "#,
                )
                .bind(user_id)
                .bind(service_type)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, user_id, name, service_type, is_active, encrypted_payload
                    FROM credentials WHERE user_id = ?
                    ORDER BY created_at, rowid
                    "#,
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.iter().map(record_from_row).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, user_id: &str, name: &str, service_type: &str) -> CredentialRecord {
        CredentialRecord {
            id: id.to_string(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            service_type: service_type.to_string(),
            is_active: true,
            encrypted_payload: "sealed".to_string(),
        }
    }

    #[tokio::test]
    async fn test_fetch_by_id_is_owner_scoped() {
        let store = SqliteCredentialStore::in_memory().await.unwrap();
        store.save_credential(&record("c1", "alice", "openai-prod", "openai")).await.unwrap();

        let found = store.fetch_credential_by_id("c1", "alice").await.unwrap();
        assert_eq!(found.map(|r| r.name), Some("openai-prod".to_string()));
        assert!(store.fetch_credential_by_id("c1", "bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_by_user_filters_service_type() {
        let store = SqliteCredentialStore::in_memory().await.unwrap();
        store.save_credential(&record("c1", "alice", "openai-prod", "openai")).await.unwrap();
        store.save_credential(&record("c2", "alice", "pg-main", "postgres")).await.unwrap();
        store.save_credential(&record("c3", "bob", "openai-bob", "openai")).await.unwrap();

        let all = store.fetch_credentials_by_user("alice", None).await.unwrap();
        assert_eq!(all.len(), 2);

        let openai = store.fetch_credentials_by_user("alice", Some("openai")).await.unwrap();
        assert_eq!(openai.len(), 1);
        assert_eq!(openai[0].id, "c1");
    }

    #[tokio::test]
    async fn test_save_is_upsert_and_delete() {
        let store = SqliteCredentialStore::in_memory().await.unwrap();
        let mut credential = record("c1", "alice", "openai-prod", "openai");
        store.save_credential(&credential).await.unwrap();

        credential.is_active = false;
        store.save_credential(&credential).await.unwrap();

        let found = store.fetch_credential_by_id("c1", "alice").await.unwrap().unwrap();
        assert!(!found.is_active);

        assert!(store.delete_credential("c1", "alice").await.unwrap());
        assert!(!store.delete_credential("c1", "alice").await.unwrap());
    }
}
