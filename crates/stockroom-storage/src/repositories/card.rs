#![allow(async_fn_in_trait)]

use crate::error::StorageResult;
use crate::models::AuthorizedCard;
use sqlx::SqlitePool;

/// Read access to the authorized-card table.
///
/// Cards are issued elsewhere; `upsert` exists for provisioning tools and
/// tests.
pub trait CardRepository: Send + Sync {
    /// Find a card by its normalized identifier.
    async fn find_by_card_id(&self, card_id: &str) -> StorageResult<Option<AuthorizedCard>>;

    /// Get all active cards
    async fn find_all_active(&self) -> StorageResult<Vec<AuthorizedCard>>;

    /// Insert a card or replace the stored one with the same identifier.
    async fn upsert(&self, card: &AuthorizedCard) -> StorageResult<()>;
}

/// SQLite implementation of CardRepository
pub struct SqliteCardRepository {
    pool: SqlitePool,
}

impl SqliteCardRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl CardRepository for SqliteCardRepository {
    async fn find_by_card_id(&self, card_id: &str) -> StorageResult<Option<AuthorizedCard>> {
        let card = sqlx::query_as::<_, AuthorizedCard>(
            r#"
            SELECT card_id, holder_name, active, valid_from, valid_until,
                   created_at, updated_at
            FROM authorized_cards
            WHERE card_id = ?
            "#,
        )
        .bind(card_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(card)
    }

    async fn find_all_active(&self) -> StorageResult<Vec<AuthorizedCard>> {
        let cards = sqlx::query_as::<_, AuthorizedCard>(
            r#"
            SELECT card_id, holder_name, active, valid_from, valid_until,
                   created_at, updated_at
            FROM authorized_cards
            WHERE active = 1
            ORDER BY card_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(cards)
    }

    async fn upsert(&self, card: &AuthorizedCard) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO authorized_cards (
                card_id, holder_name, active, valid_from, valid_until,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (card_id) DO UPDATE SET
                holder_name = excluded.holder_name,
                active      = excluded.active,
                valid_from  = excluded.valid_from,
                valid_until = excluded.valid_until,
                updated_at  = excluded.updated_at
            "#,
        )
        .bind(&card.card_id)
        .bind(&card.holder_name)
        .bind(card.active)
        .bind(card.valid_from)
        .bind(card.valid_until)
        .bind(card.created_at)
        .bind(card.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
