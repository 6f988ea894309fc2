#![allow(async_fn_in_trait)]

use crate::error::StorageResult;
use crate::models::AccessAttempt;
use sqlx::SqlitePool;

/// Audit trail of card presentations.
pub trait AccessAttemptRepository: Send + Sync {
    /// Record an attempt and return its id.
    async fn create(&self, attempt: &AccessAttempt) -> StorageResult<i64>;

    /// Most recent attempts for one card, newest first.
    async fn find_by_card(&self, card_id: &str, limit: i64) -> StorageResult<Vec<AccessAttempt>>;

    /// Most recent attempts across all cards, newest first.
    async fn find_recent(&self, limit: i64) -> StorageResult<Vec<AccessAttempt>>;
}

/// SQLite implementation of AccessAttemptRepository
pub struct SqliteAccessAttemptRepository {
    pool: SqlitePool,
}

impl SqliteAccessAttemptRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl AccessAttemptRepository for SqliteAccessAttemptRepository {
    async fn create(&self, attempt: &AccessAttempt) -> StorageResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO access_attempts (card_id, granted, reason, session_id, attempted_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&attempt.card_id)
        .bind(attempt.granted)
        .bind(&attempt.reason)
        .bind(&attempt.session_id)
        .bind(attempt.attempted_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn find_by_card(&self, card_id: &str, limit: i64) -> StorageResult<Vec<AccessAttempt>> {
        let attempts = sqlx::query_as::<_, AccessAttempt>(
            r#"
            SELECT id, card_id, granted, reason, session_id, attempted_at
            FROM access_attempts
            WHERE card_id = ?
            ORDER BY attempted_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(card_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(attempts)
    }

    async fn find_recent(&self, limit: i64) -> StorageResult<Vec<AccessAttempt>> {
        let attempts = sqlx::query_as::<_, AccessAttempt>(
            r#"
            SELECT id, card_id, granted, reason, session_id, attempted_at
            FROM access_attempts
            ORDER BY attempted_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(attempts)
    }
}
