use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit row for one card presentation, granted or denied.
///
/// Denied attempts never have a session. Granted attempts reference the
/// session they opened.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AccessAttempt {
    pub id: i64,
    pub card_id: String,
    pub granted: bool,
    pub reason: String,
    pub session_id: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

impl AccessAttempt {
    pub fn denied(card_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: 0,
            card_id: card_id.into(),
            granted: false,
            reason: reason.into(),
            session_id: None,
            attempted_at: Utc::now(),
        }
    }

    pub fn granted(card_id: impl Into<String>, session_id: impl ToString) -> Self {
        Self {
            id: 0,
            card_id: card_id.into(),
            granted: true,
            reason: "access granted".to_string(),
            session_id: Some(session_id.to_string()),
            attempted_at: Utc::now(),
        }
    }
}
