use crate::error::StorageResult;
use crate::models::{AccessAttempt, TemporalValidity, Validity};
use crate::repositories::{
    AccessAttemptRepository, CardRepository, SqliteAccessAttemptRepository, SqliteCardRepository,
};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::fmt;
use stockroom_core::{CardId, SessionId};
use tracing::{info, warn};

/// Why a presented card was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The identifier could not be normalized.
    Malformed,
    UnknownCard,
    Inactive,
    NotYetValid,
    Expired,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Malformed => "malformed card id",
            DenyReason::UnknownCard => "card not found",
            DenyReason::Inactive => "card inactive",
            DenyReason::NotYetValid => "card not yet valid",
            DenyReason::Expired => "card expired",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision for one card presentation.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Granted {
        card_id: CardId,
        holder_name: String,
    },
    Denied {
        /// Normalized identifier, or the raw input when it was malformed.
        card_id: String,
        reason: DenyReason,
    },
}

impl ValidationOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, ValidationOutcome::Granted { .. })
    }
}

/// Validates presented cards against the local authorized-card table.
///
/// Validation never needs the network. Denials are written to the access
/// audit trail here; grants are recorded by the caller through
/// [`LocalCardValidator::log_granted`] once the session exists.
///
/// # Validation Flow
///
/// 1. Normalize the identifier (deny `Malformed` on failure)
/// 2. Look the card up (deny `UnknownCard`)
/// 3. Check the active flag and validity window (deny `Inactive`,
///    `NotYetValid` or `Expired`)
/// 4. Grant
///
/// ```no_run
/// use stockroom_storage::{Database, LocalCardValidator};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let db = Database::in_memory().await?;
/// let validator = LocalCardValidator::new(db.pool().clone());
///
/// let outcome = validator.validate("04abcdef").await?;
/// println!("granted: {}", outcome.is_granted());
/// # Ok(())
/// # }
/// ```
pub struct LocalCardValidator {
    card_repo: SqliteCardRepository,
    attempt_repo: SqliteAccessAttemptRepository,
}

impl LocalCardValidator {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            card_repo: SqliteCardRepository::new(pool.clone()),
            attempt_repo: SqliteAccessAttemptRepository::new(pool),
        }
    }

    /// Validate a presented identifier at the current time.
    ///
    /// # Errors
    ///
    /// Returns error only if a database operation fails. A refused card is
    /// `Ok(ValidationOutcome::Denied)`.
    pub async fn validate(&self, presented: &str) -> StorageResult<ValidationOutcome> {
        self.validate_at(presented, Utc::now()).await
    }

    pub async fn validate_at(
        &self,
        presented: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<ValidationOutcome> {
        let card_id = match CardId::new(presented) {
            Ok(id) => id,
            Err(_) => return self.deny_with_log(presented, DenyReason::Malformed).await,
        };

        let card = match self.card_repo.find_by_card_id(card_id.as_str()).await? {
            Some(card) => card,
            None => {
                return self
                    .deny_with_log(card_id.as_str(), DenyReason::UnknownCard)
                    .await;
            }
        };

        let reason = match card.validity_at(now) {
            Validity::Valid => {
                return Ok(ValidationOutcome::Granted {
                    card_id,
                    holder_name: card.holder_name,
                });
            }
            Validity::Inactive => DenyReason::Inactive,
            Validity::NotYetValid => DenyReason::NotYetValid,
            Validity::Expired => DenyReason::Expired,
        };

        self.deny_with_log(card_id.as_str(), reason).await
    }

    /// Record a granted presentation together with the session it opened.
    pub async fn log_granted(&self, card_id: &CardId, session_id: SessionId) -> StorageResult<()> {
        self.attempt_repo
            .create(&AccessAttempt::granted(card_id.as_str(), session_id))
            .await?;
        info!(card_id = %card_id, %session_id, "Access granted");
        Ok(())
    }

    async fn deny_with_log(
        &self,
        card_id: &str,
        reason: DenyReason,
    ) -> StorageResult<ValidationOutcome> {
        self.attempt_repo
            .create(&AccessAttempt::denied(card_id, reason.as_str()))
            .await?;
        warn!(card_id, %reason, "Access denied");

        Ok(ValidationOutcome::Denied {
            card_id: card_id.to_string(),
            reason,
        })
    }
}
