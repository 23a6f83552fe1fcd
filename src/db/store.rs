// SPDX-License-Identifier: MIT
// Copyright 2026 Crosspost Contributors

//! SQLite store with typed operations.
//!
//! Provides high-level operations for:
//! - Integrations (linked accounts with encrypted OAuth tokens)
//! - Posts (scheduled/published content)
//!
//! Integrations are soft-deleted on disconnect so posts keep their
//! platform attribution.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::error::AppError;
use crate::models::integration::{Integration, IntegrationKind, Provider};
use crate::models::post::{Post, PostStatus, PublishedPost};

const SCHEMA: [&str; 6] = [
    r#"
    CREATE TABLE IF NOT EXISTS integrations (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        provider TEXT NOT NULL,
        kind TEXT NOT NULL,
        account_id TEXT NOT NULL,
        account_name TEXT NOT NULL,
        picture TEXT,
        access_token_encrypted TEXT NOT NULL,
        refresh_token_encrypted TEXT,
        token_expires_at TEXT,
        refresh_needed INTEGER NOT NULL DEFAULT 0,
        disabled INTEGER NOT NULL DEFAULT 0,
        deleted_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_integrations_account
        ON integrations(user_id, provider, account_id)",
    "CREATE INDEX IF NOT EXISTS idx_integrations_user ON integrations(user_id)",
    r#"
    CREATE TABLE IF NOT EXISTS posts (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        integration_id TEXT NOT NULL REFERENCES integrations(id),
        content TEXT NOT NULL,
        status TEXT NOT NULL,
        publish_date TEXT,
        deleted_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_posts_user_status
        ON posts(user_id, status, publish_date)",
    "CREATE INDEX IF NOT EXISTS idx_posts_integration ON posts(integration_id)",
];

/// Intermediate row shape (provider/kind as raw strings).
#[derive(sqlx::FromRow)]
struct RowIntegration {
    id: String,
    user_id: String,
    provider: String,
    kind: String,
    account_id: String,
    account_name: String,
    picture: Option<String>,
    access_token_encrypted: String,
    refresh_token_encrypted: Option<String>,
    token_expires_at: Option<DateTime<Utc>>,
    refresh_needed: bool,
    disabled: bool,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RowIntegration> for Integration {
    type Error = AppError;

    fn try_from(row: RowIntegration) -> Result<Self, Self::Error> {
        let provider = Provider::from_str(&row.provider)
            .map_err(|e| AppError::Database(format!("corrupt integration row: {}", e)))?;
        let kind = IntegrationKind::from_str(&row.kind)
            .map_err(|e| AppError::Database(format!("corrupt integration row: {}", e)))?;

        Ok(Integration {
            id: row.id,
            user_id: row.user_id,
            provider,
            kind,
            account_id: row.account_id,
            account_name: row.account_name,
            picture: row.picture,
            access_token_encrypted: row.access_token_encrypted,
            refresh_token_encrypted: row.refresh_token_encrypted,
            token_expires_at: row.token_expires_at,
            refresh_needed: row.refresh_needed,
            disabled: row.disabled,
            deleted_at: row.deleted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RowPublishedPost {
    id: String,
    integration_id: String,
    provider: String,
    content: String,
    publish_date: DateTime<Utc>,
}

impl TryFrom<RowPublishedPost> for PublishedPost {
    type Error = AppError;

    fn try_from(row: RowPublishedPost) -> Result<Self, Self::Error> {
        let provider = Provider::from_str(&row.provider)
            .map_err(|e| AppError::Database(format!("corrupt post row: {}", e)))?;
        Ok(PublishedPost {
            id: row.id,
            integration_id: row.integration_id,
            provider,
            content: row.content,
            publish_date: row.publish_date,
        })
    }
}

const INTEGRATION_COLUMNS: &str = "id, user_id, provider, kind, account_id, account_name, \
     picture, access_token_encrypted, refresh_token_encrypted, token_expires_at, \
     refresh_needed, disabled, deleted_at, created_at, updated_at";

/// SQLite database client.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to the database and apply the schema.
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::Database(format!("Invalid database URL: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect: {}", e)))?;

        let db = Self { pool };
        db.migrate().await?;

        tracing::info!(url, "Connected to SQLite");
        Ok(db)
    }

    /// In-memory database for tests. Single connection: each SQLite
    /// `:memory:` connection is its own database.
    pub async fn connect_in_memory() -> Result<Self, AppError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect: {}", e)))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<(), AppError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::Database(format!("Migration failed: {}", e)))?;
        }
        Ok(())
    }

    // ─── Integration Operations ──────────────────────────────────

    /// Insert a new integration, or refresh an existing link for the same
    /// (user, provider, account). Re-linking revives a soft-deleted row.
    pub async fn upsert_integration(&self, integration: &Integration) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO integrations (
                id, user_id, provider, kind, account_id, account_name, picture,
                access_token_encrypted, refresh_token_encrypted, token_expires_at,
                refresh_needed, disabled, deleted_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, provider, account_id) DO UPDATE SET
                account_name = excluded.account_name,
                picture = excluded.picture,
                access_token_encrypted = excluded.access_token_encrypted,
                refresh_token_encrypted = excluded.refresh_token_encrypted,
                token_expires_at = excluded.token_expires_at,
                refresh_needed = 0,
                disabled = 0,
                deleted_at = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&integration.id)
        .bind(&integration.user_id)
        .bind(integration.provider.as_str())
        .bind(integration.kind.as_str())
        .bind(&integration.account_id)
        .bind(&integration.account_name)
        .bind(&integration.picture)
        .bind(&integration.access_token_encrypted)
        .bind(&integration.refresh_token_encrypted)
        .bind(integration.token_expires_at)
        .bind(integration.refresh_needed)
        .bind(integration.disabled)
        .bind(integration.deleted_at)
        .bind(integration.created_at)
        .bind(integration.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    /// Social integrations eligible for analytics: not deleted, not
    /// disabled. Ordered by link time so results are stable per request.
    pub async fn list_social_integrations(
        &self,
        user_id: &str,
    ) -> Result<Vec<Integration>, AppError> {
        let rows = sqlx::query_as::<_, RowIntegration>(&format!(
            "SELECT {} FROM integrations
             WHERE user_id = ? AND kind = 'social'
               AND deleted_at IS NULL AND disabled = 0
             ORDER BY created_at ASC, id ASC",
            INTEGRATION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Integration::try_from).collect()
    }

    /// All of a user's linked accounts (social and storage), minus
    /// disconnected ones.
    pub async fn list_integrations(&self, user_id: &str) -> Result<Vec<Integration>, AppError> {
        let rows = sqlx::query_as::<_, RowIntegration>(&format!(
            "SELECT {} FROM integrations
             WHERE user_id = ? AND deleted_at IS NULL
             ORDER BY created_at ASC, id ASC",
            INTEGRATION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Integration::try_from).collect()
    }

    pub async fn get_integration(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<Integration>, AppError> {
        let row = sqlx::query_as::<_, RowIntegration>(&format!(
            "SELECT {} FROM integrations WHERE id = ? AND user_id = ?",
            INTEGRATION_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Integration::try_from).transpose()
    }

    /// Persist rotated credentials after a successful token refresh and
    /// clear the refresh-needed flag.
    pub async fn update_integration_tokens(
        &self,
        id: &str,
        access_token_encrypted: &str,
        refresh_token_encrypted: Option<&str>,
        token_expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE integrations
             SET access_token_encrypted = ?,
                 refresh_token_encrypted = ?,
                 token_expires_at = ?,
                 refresh_needed = 0,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(access_token_encrypted)
        .bind(refresh_token_encrypted)
        .bind(token_expires_at)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    pub async fn set_refresh_needed(&self, id: &str, refresh_needed: bool) -> Result<(), AppError> {
        sqlx::query("UPDATE integrations SET refresh_needed = ?, updated_at = ? WHERE id = ?")
            .bind(refresh_needed)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    /// Disconnect an integration. Soft delete: the row stays for post
    /// attribution. Returns false when no live row matched.
    pub async fn soft_delete_integration(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE integrations SET deleted_at = ?, updated_at = ?
             WHERE id = ? AND user_id = ? AND deleted_at IS NULL",
        )
        .bind(Utc::now())
        .bind(Utc::now())
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    // ─── Post Operations ─────────────────────────────────────────

    pub async fn insert_post(&self, post: &Post) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO posts (id, user_id, integration_id, content, status,
                                publish_date, deleted_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&post.id)
        .bind(&post.user_id)
        .bind(&post.integration_id)
        .bind(&post.content)
        .bind(post.status.as_str())
        .bind(post.publish_date)
        .bind(post.deleted_at)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    /// Published posts in an inclusive window, joined to their integration
    /// for platform attribution, most recent first.
    pub async fn list_published_posts(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PublishedPost>, AppError> {
        let rows = sqlx::query_as::<_, RowPublishedPost>(
            "SELECT p.id, p.integration_id, i.provider, p.content, p.publish_date
             FROM posts p
             JOIN integrations i ON i.id = p.integration_id
             WHERE p.user_id = ? AND p.status = ?
               AND p.publish_date >= ? AND p.publish_date <= ?
               AND p.deleted_at IS NULL
             ORDER BY p.publish_date DESC",
        )
        .bind(user_id)
        .bind(PostStatus::Published.as_str())
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(PublishedPost::try_from).collect()
    }

    /// Every published post a user has, for posting-time statistics.
    pub async fn list_all_published_posts(
        &self,
        user_id: &str,
    ) -> Result<Vec<PublishedPost>, AppError> {
        let rows = sqlx::query_as::<_, RowPublishedPost>(
            "SELECT p.id, p.integration_id, i.provider, p.content, p.publish_date
             FROM posts p
             JOIN integrations i ON i.id = p.integration_id
             WHERE p.user_id = ? AND p.status = ?
               AND p.publish_date IS NOT NULL
               AND p.deleted_at IS NULL
             ORDER BY p.publish_date DESC",
        )
        .bind(user_id)
        .bind(PostStatus::Published.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(PublishedPost::try_from).collect()
    }
}
