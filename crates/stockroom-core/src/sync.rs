//! Upload payloads carried by the sync queue.
//!
//! Each session produces one [`SessionUpload`] (queue seq 0) followed by
//! zero or more [`ChangeBatch`]es. Both carry identifiers derived only from
//! the session id and queue position, so a retried upload is recognisable
//! server-side as the same delivery.

use crate::types::{
    CardId, ChangeRecord, InventoryItemRecord, Session, SessionId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session summary sent ahead of its change records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUpload {
    pub session_id: SessionId,
    pub card_id: CardId,
    pub door_opened_at: Option<DateTime<Utc>>,
    pub door_closed_at: Option<DateTime<Utc>>,
    pub before_snapshot: Vec<InventoryItemRecord>,
    pub after_snapshot: Vec<InventoryItemRecord>,
    pub anomalous: bool,
    pub anomaly_reason: Option<String>,
    pub change_count: usize,
}

impl SessionUpload {
    pub fn from_session(session: &Session, change_count: usize) -> Self {
        Self {
            session_id: session.session_id,
            card_id: session.card_id.clone(),
            door_opened_at: session.door_opened_at,
            door_closed_at: session.door_closed_at,
            before_snapshot: session.before_snapshot.clone(),
            after_snapshot: session.after_snapshot.clone(),
            anomalous: session.anomalous,
            anomaly_reason: session.anomaly_reason.clone(),
            change_count,
        }
    }
}

/// A slice of one session's change records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBatch {
    /// `"{session_id}#{seq}"`.
    pub batch_id: String,
    pub session_id: SessionId,
    pub seq: u32,
    pub changes: Vec<ChangeRecord>,
}

impl ChangeBatch {
    pub fn new(session_id: SessionId, seq: u32, changes: Vec<ChangeRecord>) -> Self {
        Self {
            batch_id: format!("{session_id}#{seq}"),
            session_id,
            seq,
            changes,
        }
    }
}

/// Payload of one sync queue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UploadRequest {
    Session(SessionUpload),
    Changes(ChangeBatch),
}

impl UploadRequest {
    /// Stable identifier used as the idempotency key.
    #[must_use]
    pub fn upload_id(&self) -> String {
        match self {
            UploadRequest::Session(upload) => upload.session_id.to_string(),
            UploadRequest::Changes(batch) => batch.batch_id.clone(),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        match self {
            UploadRequest::Session(upload) => upload.session_id,
            UploadRequest::Changes(batch) => batch.session_id,
        }
    }

    /// Short name of the payload kind, used in logs and endpoint routing.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            UploadRequest::Session(_) => "session",
            UploadRequest::Changes(_) => "changes",
        }
    }

    /// Split a finished session into its ordered upload sequence.
    ///
    /// The session summary always comes first, then the change records in
    /// chunks of at most `max_changes` (a value of 0 is treated as 1).
    pub fn plan(session: &Session, changes: &[ChangeRecord], max_changes: usize) -> Vec<Self> {
        let mut uploads = vec![UploadRequest::Session(SessionUpload::from_session(
            session,
            changes.len(),
        ))];

        for (i, chunk) in changes.chunks(max_changes.max(1)).enumerate() {
            let seq = u32::try_from(i + 1).unwrap_or(u32::MAX);
            uploads.push(UploadRequest::Changes(ChangeBatch::new(
                session.session_id,
                seq,
                chunk.to_vec(),
            )));
        }

        uploads
    }
}
