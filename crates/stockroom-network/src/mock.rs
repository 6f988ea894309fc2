//! In-process stand-in for the remote server.
//!
//! [`MockUploader`] behaves like an idempotent server: the first delivery of
//! an `upload_id` is applied, repeats are acknowledged without effect. Tests
//! script failures ahead of time and inspect what the "server" saw.

use crate::error::UploadError;
use crate::uploader::Uploader;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use stockroom_core::UploadRequest;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// Scripted reaction to the next upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockResponse {
    /// Apply and acknowledge.
    Accept,

    /// Fail before reaching the server.
    Transient(String),

    /// Reject the payload.
    Permanent(String),

    /// Apply, but lose the acknowledgement on the way back.
    AckLost,
}

/// One upload as observed by the mock.
#[derive(Debug, Clone)]
pub struct UploadAttempt {
    pub upload_id: String,
    pub kind: &'static str,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct MockState {
    script: VecDeque<MockResponse>,
    offline: bool,
    attempts: Vec<UploadAttempt>,
    applied: HashSet<String>,
    applied_order: Vec<String>,
    held: usize,
}

/// Idempotent test double for [`Uploader`].
///
/// Clones share state, so a test keeps one clone for inspection while the
/// sync engine owns another. [`MockUploader::hold`] parks uploads before
/// they reach the "server", which lets a test look at the queue while an
/// entry is in flight.
///
/// ```
/// use stockroom_network::{MockResponse, MockUploader};
///
/// let uploader = MockUploader::new();
/// uploader.push_response(MockResponse::Transient("503 Service Unavailable".into()));
/// uploader.push_response(MockResponse::Accept);
/// assert_eq!(uploader.applied_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct MockUploader {
    state: Arc<Mutex<MockState>>,
    gate: Arc<watch::Sender<bool>>,
}

impl Default for MockUploader {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            gate: Arc::new(watch::Sender::new(false)),
        }
    }
}

impl MockUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park every upload until [`MockUploader::release`].
    pub fn hold(&self) {
        self.gate.send_replace(true);
    }

    pub fn release(&self) {
        self.gate.send_replace(false);
    }

    /// Uploads currently parked by [`MockUploader::hold`].
    pub fn held_uploads(&self) -> usize {
        self.state().held
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A poisoned lock only means a test already panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue the reaction to a future upload. Unscripted uploads are
    /// accepted.
    pub fn push_response(&self, response: MockResponse) {
        self.state().script.push_back(response);
    }

    /// While offline every upload fails transiently, scripted or not.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Every upload call, in order.
    pub fn attempts(&self) -> Vec<UploadAttempt> {
        self.state().attempts.clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.state().attempts.len()
    }

    /// Distinct payloads applied, i.e. the side effects the server saw.
    pub fn applied_count(&self) -> usize {
        self.state().applied.len()
    }

    /// Applied upload ids in the order they first took effect.
    pub fn applied_ids(&self) -> Vec<String> {
        self.state().applied_order.clone()
    }

    pub fn has_applied(&self, upload_id: &str) -> bool {
        self.state().applied.contains(upload_id)
    }
}

impl MockState {
    fn apply(&mut self, upload_id: &str) {
        if self.applied.insert(upload_id.to_string()) {
            self.applied_order.push(upload_id.to_string());
        } else {
            debug!(upload_id, "Duplicate delivery ignored");
        }
    }
}

impl Uploader for MockUploader {
    async fn upload(&self, request: &UploadRequest) -> Result<(), UploadError> {
        let mut gate = self.gate.subscribe();
        let held = *gate.borrow_and_update();
        if held {
            self.state().held += 1;
            let _ = gate.wait_for(|held| !*held).await;
            self.state().held -= 1;
        }

        let upload_id = request.upload_id();
        let mut state = self.state();

        state.attempts.push(UploadAttempt {
            upload_id: upload_id.clone(),
            kind: request.kind(),
            at: Instant::now(),
        });

        if state.offline {
            return Err(UploadError::Transient("network unreachable".into()));
        }

        match state.script.pop_front().unwrap_or(MockResponse::Accept) {
            MockResponse::Accept => {
                state.apply(&upload_id);
                Ok(())
            }
            MockResponse::AckLost => {
                state.apply(&upload_id);
                Err(UploadError::Transient("acknowledgement lost".into()))
            }
            MockResponse::Transient(msg) => Err(UploadError::Transient(msg)),
            MockResponse::Permanent(msg) => Err(UploadError::Permanent(msg)),
        }
    }
}
