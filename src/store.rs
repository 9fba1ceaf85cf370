//! Configuration store.
//!
//! The [`ConfigStore`] trait is the seam between the HTTP layer and
//! persistence. "No configuration for this owner" is `Ok(None)`; only
//! connectivity or query failures are errors.
//!
//! | Implementation | Backing |
//! |----------------|---------|
//! | [`SqliteStore`] | SQLite via a lazily connected pool |
//! | [`InMemoryStore`] | `HashMap` behind a lock, for tests and previews |

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::db::LazyConnection;
use crate::models::{ChatConfiguration, SettingsUpdate};

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Looks up the configuration for `owner_id`.
    async fn find(&self, owner_id: &str) -> Result<Option<ChatConfiguration>>;

    /// Creates or wholly replaces the configuration for `update.owner_id`.
    ///
    /// `created_at` survives a replacement; `updated_at` is refreshed.
    async fn upsert(&self, update: &SettingsUpdate) -> Result<ChatConfiguration>;
}

fn from_unix(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

// ============ SQLite ============

/// SQLite implementation of [`ConfigStore`].
///
/// The pool is not opened until the first query.
pub struct SqliteStore {
    conn: LazyConnection<SqlitePool>,
}

impl SqliteStore {
    pub fn new(conn: LazyConnection<SqlitePool>) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &LazyConnection<SqlitePool> {
        &self.conn
    }
}

fn row_to_config(row: &SqliteRow) -> ChatConfiguration {
    ChatConfiguration {
        owner_id: row.get("owner_id"),
        business_name: row.get("business_name"),
        support_email: row.get("support_email"),
        knowledge: row.get("knowledge"),
        created_at: from_unix(row.get("created_at")),
        updated_at: from_unix(row.get("updated_at")),
    }
}

#[async_trait]
impl ConfigStore for SqliteStore {
    async fn find(&self, owner_id: &str) -> Result<Option<ChatConfiguration>> {
        let pool = self.conn.get().await?;
        let row = sqlx::query(
            "SELECT owner_id, business_name, support_email, knowledge, created_at, updated_at \
             FROM chat_configurations WHERE owner_id = ?",
        )
        .bind(owner_id)
        .fetch_optional(&*pool)
        .await?;

        Ok(row.as_ref().map(row_to_config))
    }

    async fn upsert(&self, update: &SettingsUpdate) -> Result<ChatConfiguration> {
        let pool = self.conn.get().await?;
        let now = Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO chat_configurations (owner_id, business_name, support_email, knowledge,
                                             created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(owner_id) DO UPDATE SET
                business_name = excluded.business_name,
                support_email = excluded.support_email,
                knowledge = excluded.knowledge,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&update.owner_id)
        .bind(&update.business_name)
        .bind(&update.support_email)
        .bind(&update.knowledge)
        .bind(now)
        .bind(now)
        .execute(&*pool)
        .await?;

        self.find(&update.owner_id)
            .await?
            .ok_or_else(|| anyhow!("configuration for {} vanished after write", update.owner_id))
    }
}

// ============ In-memory ============

/// In-memory store for tests and local previews.
///
/// Counts lookups so callers can assert how often the store was consulted.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, ChatConfiguration>>,
    lookups: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of [`find`](ConfigStore::find) calls served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigStore for InMemoryStore {
    async fn find(&self, owner_id: &str) -> Result<Option<ChatConfiguration>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let records = self
            .records
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        Ok(records.get(owner_id).cloned())
    }

    async fn upsert(&self, update: &SettingsUpdate) -> Result<ChatConfiguration> {
        let mut records = self
            .records
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        let now = from_unix(Utc::now().timestamp());
        let created_at = records
            .get(&update.owner_id)
            .map(|existing| existing.created_at)
            .unwrap_or(now);

        let record = ChatConfiguration {
            owner_id: update.owner_id.clone(),
            business_name: update.business_name.clone(),
            support_email: update.support_email.clone(),
            knowledge: update.knowledge.clone(),
            created_at,
            updated_at: now,
        };
        records.insert(update.owner_id.clone(), record.clone());
        Ok(record)
    }
}
