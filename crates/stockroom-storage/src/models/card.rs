use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TemporalValidity;

/// Credential allowed to open the inventory room.
///
/// Rows are provisioned by the card issuance system; the controller only
/// reads them. `card_id` is stored in its normalized form (trimmed,
/// uppercase).
///
/// ```
/// use stockroom_storage::models::{AuthorizedCard, TemporalValidity};
///
/// let card = AuthorizedCard::new("04ABCDEF", "Lab Technician");
/// assert!(card.is_valid());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuthorizedCard {
    pub card_id: String,
    pub holder_name: String,
    pub active: bool,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuthorizedCard {
    /// Active card with no validity window.
    pub fn new(card_id: impl Into<String>, holder_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            card_id: card_id.into().trim().to_uppercase(),
            holder_name: holder_name.into(),
            active: true,
            valid_from: None,
            valid_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn valid_between(
        mut self,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Self {
        self.valid_from = from;
        self.valid_until = until;
        self
    }

    #[must_use]
    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }
}

impl TemporalValidity for AuthorizedCard {
    fn is_active(&self) -> bool {
        self.active
    }

    fn validity_start(&self) -> Option<DateTime<Utc>> {
        self.valid_from
    }

    fn validity_end(&self) -> Option<DateTime<Utc>> {
        self.valid_until
    }
}
