use crate::{
    Result,
    constants::{MAX_CARD_LENGTH, MIN_CARD_LENGTH},
    error::Error,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Proximity card identifier.
///
/// # Security
/// This type implements constant-time comparison to prevent timing attacks
/// when comparing card identifiers during authentication.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CardId(String);

impl CardId {
    /// Create a new card identifier with validation.
    ///
    /// The identifier is normalized (trimmed and converted to uppercase) before validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidCardFormat` if:
    /// - The identifier length is not between 4-32 characters
    /// - The identifier contains non-ASCII or non-alphanumeric characters
    pub fn new(id: &str) -> Result<Self> {
        let id = id.trim().to_uppercase();

        let len = id.len();
        if !(MIN_CARD_LENGTH..=MAX_CARD_LENGTH).contains(&len) {
            return Err(Error::InvalidCardFormat(format!(
                "Card id must be {MIN_CARD_LENGTH}-{MAX_CARD_LENGTH} chars, got {len}"
            )));
        }

        if !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidCardFormat(
                "Card id must be ASCII alphanumeric".to_string(),
            ));
        }

        Ok(CardId(id))
    }

    /// Get the card identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CardId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CardId::new(s)
    }
}

impl TryFrom<String> for CardId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        CardId::new(&value)
    }
}

impl From<CardId> for String {
    fn from(id: CardId) -> String {
        id.0
    }
}

impl PartialEq for CardId {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl std::hash::Hash for CardId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// Session identifier, assigned at AUTH success.
///
/// Doubles as the idempotency key of the session upload, so it must never be
/// regenerated for an existing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn generate() -> Self {
        SessionId(Uuid::new_v4())
    }

    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        SessionId(uuid)
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(SessionId)
            .map_err(|e| Error::Config(format!("Invalid session id {s}: {e}")))
    }
}

/// Inventory item identifier as reported by the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        ItemId(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        ItemId(s.to_string())
    }
}

/// Observed state of an item during a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemPresence {
    Present,
    Absent,
}

/// One item observation inside a snapshot. Immutable once captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItemRecord {
    pub item_id: ItemId,
    pub location: String,
    pub presence: ItemPresence,
    pub scanned_at: DateTime<Utc>,
}

impl InventoryItemRecord {
    /// Record for an item observed present at `location`.
    pub fn present(item_id: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            item_id: ItemId::new(item_id),
            location: location.into(),
            presence: ItemPresence::Present,
            scanned_at: Utc::now(),
        }
    }

    /// Override the scan timestamp.
    #[must_use]
    pub fn at(mut self, scanned_at: DateTime<Utc>) -> Self {
        self.scanned_at = scanned_at;
        self
    }

    #[inline]
    #[must_use]
    pub fn is_present(&self) -> bool {
        matches!(self.presence, ItemPresence::Present)
    }
}

/// Kind of item-level change between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Added,
    Removed,
    Moved,
}

impl ChangeKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Removed => "removed",
            ChangeKind::Moved => "moved",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "added" => Ok(ChangeKind::Added),
            "removed" => Ok(ChangeKind::Removed),
            "moved" => Ok(ChangeKind::Moved),
            other => Err(Error::Config(format!("Unknown change kind: {other}"))),
        }
    }
}

/// Item-level change derived from diffing two snapshots. The unit of sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Stable identifier, `"{session_id}:{item_id}"`.
    pub change_id: String,
    pub session_id: SessionId,
    pub item_id: ItemId,
    pub kind: ChangeKind,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
}

impl ChangeRecord {
    pub fn new(
        session_id: SessionId,
        item_id: ItemId,
        kind: ChangeKind,
        from_location: Option<String>,
        to_location: Option<String>,
    ) -> Self {
        Self {
            change_id: format!("{session_id}:{item_id}"),
            session_id,
            item_id,
            kind,
            from_location,
            to_location,
        }
    }
}

/// Session lifecycle states.
///
/// `Idle` and `Auth` exist only in memory: a session row is first written
/// when authentication succeeds, already in `SessionStart`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// No session in motion; waiting for a card.
    Idle,

    /// Card presented, credential being validated.
    Auth,

    /// Door unlocked, capturing the before-scan.
    SessionStart,

    /// Waiting for the door to close (or the open timeout).
    Monitor,

    /// Door closed, capturing the after-scan and diffing.
    Processing,

    /// Changes committed and queued for upload.
    Sync,
}

impl SessionState {
    /// Check if transition to target state is valid from this state.
    ///
    /// ```
    /// use stockroom_core::SessionState;
    ///
    /// assert!(SessionState::Idle.can_transition_to(&SessionState::Auth));
    /// assert!(!SessionState::Idle.can_transition_to(&SessionState::Monitor));
    /// ```
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        matches!(
            (self, target),
            (SessionState::Idle, SessionState::Auth)
                | (SessionState::Auth, SessionState::SessionStart | SessionState::Idle)
                | (SessionState::SessionStart, SessionState::Monitor)
                | (SessionState::Monitor, SessionState::Processing)
                | (SessionState::Processing, SessionState::Sync)
                | (SessionState::Sync, SessionState::Idle)
        )
    }

    /// Returns `true` while the session still owns the door.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::SessionStart | SessionState::Monitor | SessionState::Processing
        )
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Auth => "auth",
            SessionState::SessionStart => "session_start",
            SessionState::Monitor => "monitor",
            SessionState::Processing => "processing",
            SessionState::Sync => "sync",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            SessionState::Idle => "IDLE",
            SessionState::Auth => "AUTH",
            SessionState::SessionStart => "SESSION_START",
            SessionState::Monitor => "MONITOR",
            SessionState::Processing => "PROCESSING",
            SessionState::Sync => "SYNC",
        };
        write!(f, "{}", state_str)
    }
}

impl FromStr for SessionState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "idle" => Ok(SessionState::Idle),
            "auth" => Ok(SessionState::Auth),
            "session_start" => Ok(SessionState::SessionStart),
            "monitor" => Ok(SessionState::Monitor),
            "processing" => Ok(SessionState::Processing),
            "sync" => Ok(SessionState::Sync),
            other => Err(Error::Config(format!("Unknown session state: {other}"))),
        }
    }
}

/// Upload status of a session or sync queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Pending,
    InFlight,
    Confirmed,
    FailedPermanent,
}

impl SyncStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::InFlight => "in_flight",
            SyncStatus::Confirmed => "confirmed",
            SyncStatus::FailedPermanent => "failed_permanent",
        }
    }

    /// Returns `true` once no further upload attempt will be made.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Confirmed | SyncStatus::FailedPermanent)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "in_flight" => Ok(SyncStatus::InFlight),
            "confirmed" => Ok(SyncStatus::Confirmed),
            "failed_permanent" => Ok(SyncStatus::FailedPermanent),
            other => Err(Error::Config(format!("Unknown sync status: {other}"))),
        }
    }
}

/// One physical visit to the inventory room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub card_id: CardId,
    pub state: SessionState,
    pub door_opened_at: Option<DateTime<Utc>>,
    pub door_closed_at: Option<DateTime<Utc>>,
    pub before_snapshot: Vec<InventoryItemRecord>,
    pub after_snapshot: Vec<InventoryItemRecord>,
    pub sync_status: SyncStatus,
    pub anomalous: bool,
    pub anomaly_reason: Option<String>,
    /// Set when the session's diff failed; such sessions need manual review.
    pub error_marker: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// New session for a card that just passed validation.
    pub fn start(card_id: CardId) -> Self {
        let now = Utc::now();
        Self {
            session_id: SessionId::generate(),
            card_id,
            state: SessionState::SessionStart,
            door_opened_at: None,
            door_closed_at: None,
            before_snapshot: Vec::new(),
            after_snapshot: Vec::new(),
            sync_status: SyncStatus::Pending,
            anomalous: false,
            anomaly_reason: None,
            error_marker: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` while the session still owns the door.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Returns `true` if the session is frozen for audit.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.sync_status == SyncStatus::Confirmed
    }

    #[must_use]
    pub fn needs_review(&self) -> bool {
        self.error_marker.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("04abcdef", "04ABCDEF")]
    #[case("  c001 ", "C001")]
    #[case("12345678901234567890", "12345678901234567890")]
    fn test_card_id_valid(#[case] input: &str, #[case] expected: &str) {
        let card = CardId::new(input).unwrap();
        assert_eq!(card.as_str(), expected);
    }

    #[rstest]
    #[case("C1")] // too short
    #[case("123456789012345678901234567890123")] // too long
    #[case("04-AB-CD")] // punctuation
    #[case("cartão01")] // non-ASCII
    fn test_card_id_invalid(#[case] input: &str) {
        assert!(CardId::new(input).is_err());
    }

    #[test]
    fn test_card_id_equality_is_case_insensitive_after_normalization() {
        assert_eq!(CardId::new("abcd1234").unwrap(), CardId::new("ABCD1234").unwrap());
    }

    #[test]
    fn test_card_id_serde_validates() {
        let parsed: std::result::Result<CardId, _> = serde_json::from_str("\"x\"");
        assert!(parsed.is_err());

        let card: CardId = serde_json::from_str("\"c0ffee01\"").unwrap();
        assert_eq!(card.as_str(), "C0FFEE01");
    }

    #[rstest]
    #[case(SessionState::Idle, SessionState::Auth)]
    #[case(SessionState::Auth, SessionState::SessionStart)]
    #[case(SessionState::Auth, SessionState::Idle)]
    #[case(SessionState::SessionStart, SessionState::Monitor)]
    #[case(SessionState::Monitor, SessionState::Processing)]
    #[case(SessionState::Processing, SessionState::Sync)]
    #[case(SessionState::Sync, SessionState::Idle)]
    fn test_valid_transitions(#[case] from: SessionState, #[case] to: SessionState) {
        assert!(from.can_transition_to(&to));
    }

    #[rstest]
    #[case(SessionState::Idle, SessionState::SessionStart)]
    #[case(SessionState::Auth, SessionState::Monitor)]
    #[case(SessionState::SessionStart, SessionState::Processing)]
    #[case(SessionState::Monitor, SessionState::Sync)]
    #[case(SessionState::Processing, SessionState::Idle)]
    #[case(SessionState::Sync, SessionState::Auth)]
    #[case(SessionState::Monitor, SessionState::Monitor)]
    fn test_invalid_transitions(#[case] from: SessionState, #[case] to: SessionState) {
        assert!(!from.can_transition_to(&to));
    }

    #[test]
    fn test_active_states() {
        assert!(!SessionState::Idle.is_active());
        assert!(!SessionState::Auth.is_active());
        assert!(SessionState::SessionStart.is_active());
        assert!(SessionState::Monitor.is_active());
        assert!(SessionState::Processing.is_active());
        assert!(!SessionState::Sync.is_active());
    }

    #[test]
    fn test_state_and_status_string_forms() {
        for state in [
            SessionState::Idle,
            SessionState::Auth,
            SessionState::SessionStart,
            SessionState::Monitor,
            SessionState::Processing,
            SessionState::Sync,
        ] {
            assert_eq!(state.as_str().parse::<SessionState>().unwrap(), state);
        }
        for status in [
            SyncStatus::Pending,
            SyncStatus::InFlight,
            SyncStatus::Confirmed,
            SyncStatus::FailedPermanent,
        ] {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<SyncStatus>().is_err());
        assert_eq!(SessionState::SessionStart.to_string(), "SESSION_START");
    }

    #[test]
    fn test_change_record_has_stable_id() {
        let session_id = SessionId::generate();
        let record = ChangeRecord::new(
            session_id,
            ItemId::new("A1"),
            ChangeKind::Moved,
            Some("slot1".into()),
            Some("slot2".into()),
        );
        assert_eq!(record.change_id, format!("{session_id}:A1"));
    }

    #[test]
    fn test_new_session_starts_pending() {
        let session = Session::start(CardId::new("C0001").unwrap());
        assert_eq!(session.state, SessionState::SessionStart);
        assert_eq!(session.sync_status, SyncStatus::Pending);
        assert!(session.is_active());
        assert!(!session.is_read_only());
        assert!(!session.needs_review());
    }
}
