use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use stockroom_core::{
    CardId, InventoryItemRecord, Session, SessionId, SessionState, SyncStatus,
};

/// Raw `sessions` row.
///
/// Enum columns are stored as their `as_str()` form and snapshots as JSON;
/// conversion to [`Session`] validates both.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub session_id: String,
    pub card_id: String,
    pub state: String,
    pub door_opened_at: Option<DateTime<Utc>>,
    pub door_closed_at: Option<DateTime<Utc>>,
    pub before_snapshot: String,
    pub after_snapshot: String,
    pub sync_status: String,
    pub anomalous: bool,
    pub anomaly_reason: Option<String>,
    pub error_marker: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for Session {
    type Error = StorageError;

    fn try_from(row: SessionRow) -> StorageResult<Self> {
        Ok(Session {
            session_id: row.session_id.parse::<SessionId>()?,
            card_id: CardId::new(&row.card_id)?,
            state: row.state.parse::<SessionState>()?,
            door_opened_at: row.door_opened_at,
            door_closed_at: row.door_closed_at,
            before_snapshot: serde_json::from_str(&row.before_snapshot)?,
            after_snapshot: serde_json::from_str(&row.after_snapshot)?,
            sync_status: row.sync_status.parse::<SyncStatus>()?,
            anomalous: row.anomalous,
            anomaly_reason: row.anomaly_reason,
            error_marker: row.error_marker,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Partial update of a session row. Unset fields keep their stored value.
///
/// ```
/// use stockroom_core::SessionState;
/// use stockroom_storage::models::SessionUpdate;
///
/// let update = SessionUpdate::new()
///     .state(SessionState::Processing)
///     .anomaly("door open timeout");
/// assert_eq!(update.state, Some(SessionState::Processing));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionUpdate {
    pub state: Option<SessionState>,
    pub door_opened_at: Option<DateTime<Utc>>,
    pub door_closed_at: Option<DateTime<Utc>>,
    pub before_snapshot: Option<Vec<InventoryItemRecord>>,
    pub after_snapshot: Option<Vec<InventoryItemRecord>>,
    pub sync_status: Option<SyncStatus>,
    /// Marks the session anomalous; appended to any earlier reason.
    pub anomaly: Option<String>,
    pub error_marker: Option<String>,
}

impl SessionUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(mut self, state: SessionState) -> Self {
        self.state = Some(state);
        self
    }

    #[must_use]
    pub fn door_opened_at(mut self, at: DateTime<Utc>) -> Self {
        self.door_opened_at = Some(at);
        self
    }

    #[must_use]
    pub fn door_closed_at(mut self, at: DateTime<Utc>) -> Self {
        self.door_closed_at = Some(at);
        self
    }

    #[must_use]
    pub fn before_snapshot(mut self, records: Vec<InventoryItemRecord>) -> Self {
        self.before_snapshot = Some(records);
        self
    }

    #[must_use]
    pub fn after_snapshot(mut self, records: Vec<InventoryItemRecord>) -> Self {
        self.after_snapshot = Some(records);
        self
    }

    #[must_use]
    pub fn sync_status(mut self, status: SyncStatus) -> Self {
        self.sync_status = Some(status);
        self
    }

    #[must_use]
    pub fn anomaly(mut self, reason: impl Into<String>) -> Self {
        self.anomaly = Some(reason.into());
        self
    }

    #[must_use]
    pub fn error_marker(mut self, marker: impl Into<String>) -> Self {
        self.error_marker = Some(marker.into());
        self
    }

    /// Apply the update to an in-memory session, mirroring the SQL update.
    pub fn apply_to(&self, session: &mut Session) {
        if let Some(state) = self.state {
            session.state = state;
        }
        if let Some(at) = self.door_opened_at {
            session.door_opened_at = Some(at);
        }
        if let Some(at) = self.door_closed_at {
            session.door_closed_at = Some(at);
        }
        if let Some(records) = &self.before_snapshot {
            session.before_snapshot = records.clone();
        }
        if let Some(records) = &self.after_snapshot {
            session.after_snapshot = records.clone();
        }
        if let Some(status) = self.sync_status {
            session.sync_status = status;
        }
        if let Some(reason) = &self.anomaly {
            session.anomalous = true;
            session.anomaly_reason = Some(match session.anomaly_reason.take() {
                Some(previous) => format!("{previous}; {reason}"),
                None => reason.clone(),
            });
        }
        if let Some(marker) = &self.error_marker {
            session.error_marker = Some(marker.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_appends_anomaly_reasons() {
        let mut session = Session::start(CardId::new("C0001").unwrap());

        SessionUpdate::new()
            .anomaly("recovered after restart")
            .apply_to(&mut session);
        SessionUpdate::new()
            .state(SessionState::Processing)
            .anomaly("door open timeout")
            .apply_to(&mut session);

        assert!(session.anomalous);
        assert_eq!(session.state, SessionState::Processing);
        assert_eq!(
            session.anomaly_reason.as_deref(),
            Some("recovered after restart; door open timeout")
        );
    }

    #[test]
    fn test_row_conversion_rejects_unknown_state() {
        let session = Session::start(CardId::new("C0001").unwrap());
        let row = SessionRow {
            session_id: session.session_id.to_string(),
            card_id: "C0001".into(),
            state: "dancing".into(),
            door_opened_at: None,
            door_closed_at: None,
            before_snapshot: "[]".into(),
            after_snapshot: "[]".into(),
            sync_status: "pending".into(),
            anomalous: false,
            anomaly_reason: None,
            error_marker: None,
            created_at: session.created_at,
            updated_at: session.updated_at,
        };
        assert!(matches!(
            Session::try_from(row),
            Err(StorageError::Corrupt(_))
        ));
    }
}
