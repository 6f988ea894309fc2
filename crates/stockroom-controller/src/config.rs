//! Typed controller configuration.
//!
//! Defaults come from [`stockroom_core::constants`]; the binary overlays its
//! TOML file on top.

use std::time::Duration;
use stockroom_core::constants::*;
use stockroom_core::{Error, Result};

/// Session pipeline and supervisor settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// How long the door may stay open before PROCESSING is forced.
    pub door_open_timeout: Duration,

    /// Capture attempts per snapshot before the session is held for review.
    pub scan_attempts: u32,

    /// Upper bound on one capture attempt.
    pub scan_timeout: Duration,

    /// How long shutdown waits for an in-flight session. Must cover
    /// [`ControllerConfig::worst_case_session`].
    pub shutdown_grace: Duration,

    /// Change records per upload batch.
    pub changes_per_upload: usize,

    pub sync: SyncConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            door_open_timeout: Duration::from_secs(DEFAULT_DOOR_OPEN_TIMEOUT_SECS),
            scan_attempts: DEFAULT_SCAN_ATTEMPTS,
            scan_timeout: Duration::from_secs(DEFAULT_SCAN_TIMEOUT_SECS),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
            changes_per_upload: DEFAULT_CHANGES_PER_UPLOAD,
            sync: SyncConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn door_open_timeout(mut self, timeout: Duration) -> Self {
        self.door_open_timeout = timeout;
        self
    }

    pub fn scan_attempts(mut self, attempts: u32) -> Self {
        self.scan_attempts = attempts;
        self
    }

    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn changes_per_upload(mut self, count: usize) -> Self {
        self.changes_per_upload = count;
        self
    }

    pub fn sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    /// Longest a session can hold the door cycle: the door timeout plus
    /// every capture attempt of both scans timing out.
    pub fn worst_case_session(&self) -> Duration {
        let scans = self.scan_timeout.saturating_mul(self.scan_attempts.saturating_mul(2));
        self.door_open_timeout.saturating_add(scans)
    }

    /// Reject settings that would let the controller hang or spin.
    pub fn validate(&self) -> Result<()> {
        if self.door_open_timeout.is_zero() {
            return Err(Error::Config("door_open_timeout must be positive".into()));
        }
        if self.scan_attempts == 0 {
            return Err(Error::Config("scan_attempts must be at least 1".into()));
        }
        if self.scan_timeout.is_zero() {
            return Err(Error::Config("scan_timeout must be positive".into()));
        }
        if self.changes_per_upload == 0 {
            return Err(Error::Config("changes_per_upload must be at least 1".into()));
        }
        let worst_case = self.worst_case_session();
        if self.shutdown_grace < worst_case {
            return Err(Error::Config(format!(
                "shutdown_grace must be at least {}s so shutdown never cuts a door cycle short",
                worst_case.as_secs_f64()
            )));
        }
        self.sync.validate()
    }
}

/// Sync engine settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub poll_interval: Duration,

    /// Entries claimed per drain.
    pub batch_size: u32,

    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,

    /// Symmetric randomization of each delay, as a fraction of it.
    pub jitter_ratio: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_SYNC_POLL_INTERVAL_MS),
            batch_size: DEFAULT_SYNC_BATCH_SIZE,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_secs(DEFAULT_MAX_BACKOFF_SECS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter_ratio: DEFAULT_JITTER_RATIO,
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn batch_size(mut self, size: u32) -> Self {
        self.batch_size = size;
        self
    }

    pub fn backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn jitter_ratio(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio;
        self
    }

    /// Jitter must stay below `(multiplier - 1) / (multiplier + 1)` so that
    /// consecutive uncapped delays strictly increase.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::Config("sync poll_interval must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("sync batch_size must be at least 1".into()));
        }
        if self.initial_backoff.is_zero() || self.max_backoff < self.initial_backoff {
            return Err(Error::Config(
                "sync backoff requires 0 < initial_backoff <= max_backoff".into(),
            ));
        }
        if !(self.backoff_multiplier > 1.0) {
            return Err(Error::Config("sync backoff_multiplier must exceed 1".into()));
        }
        let jitter_limit = (self.backoff_multiplier - 1.0) / (self.backoff_multiplier + 1.0);
        if !(0.0..jitter_limit).contains(&self.jitter_ratio) {
            return Err(Error::Config(format!(
                "sync jitter_ratio must be in [0, {jitter_limit:.3})"
            )));
        }
        Ok(())
    }
}
