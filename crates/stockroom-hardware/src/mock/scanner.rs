//! Mock inventory scanner.
//!
//! Returns the room's current inventory on every capture, unless scripted
//! results are queued through the handle.

use crate::{HardwareError, Result, traits::InventoryScanner, types::DeviceInfo};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stockroom_core::InventoryItemRecord;

#[derive(Debug)]
enum Scripted {
    Scan(Vec<InventoryItemRecord>),
    Failure(String),
    Hang,
}

#[derive(Debug, Default)]
struct ScannerState {
    inventory: Vec<InventoryItemRecord>,
    script: VecDeque<Scripted>,
    delay: Option<Duration>,
}

/// Mock inventory scanner.
///
/// ```
/// use stockroom_core::InventoryItemRecord;
/// use stockroom_hardware::mock::MockScanner;
/// use stockroom_hardware::traits::InventoryScanner;
///
/// #[tokio::main]
/// async fn main() -> stockroom_hardware::Result<()> {
///     let (mut scanner, handle) = MockScanner::new();
///     handle.set_inventory(vec![InventoryItemRecord::present("A1", "slot1")]);
///
///     let scan = scanner.capture_scan().await?;
///     assert_eq!(scan.len(), 1);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockScanner {
    state: Arc<Mutex<ScannerState>>,
    captures: Arc<AtomicU32>,
    name: String,
}

impl MockScanner {
    pub fn new() -> (Self, MockScannerHandle) {
        Self::with_name("Mock Inventory Scanner".to_string())
    }

    pub fn with_name(name: String) -> (Self, MockScannerHandle) {
        let state = Arc::new(Mutex::new(ScannerState::default()));
        let captures = Arc::new(AtomicU32::new(0));
        let scanner = Self {
            state: Arc::clone(&state),
            captures: Arc::clone(&captures),
            name,
        };
        (scanner, MockScannerHandle { state, captures })
    }

    fn next_result(&self) -> Result<(Option<Scripted>, Vec<InventoryItemRecord>, Option<Duration>)> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| HardwareError::scan("scanner state poisoned"))?;
        let scripted = state.script.pop_front();
        Ok((scripted, state.inventory.clone(), state.delay))
    }
}

impl InventoryScanner for MockScanner {
    async fn capture_scan(&mut self) -> Result<Vec<InventoryItemRecord>> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        let (scripted, inventory, delay) = self.next_result()?;

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let now = Utc::now();
        let stamp = |records: Vec<InventoryItemRecord>| {
            records
                .into_iter()
                .map(|record| record.at(now))
                .collect::<Vec<_>>()
        };

        match scripted {
            None => Ok(stamp(inventory)),
            Some(Scripted::Scan(records)) => Ok(stamp(records)),
            Some(Scripted::Failure(message)) => Err(HardwareError::scan(message)),
            Some(Scripted::Hang) => std::future::pending().await,
        }
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        Ok(DeviceInfo::new(self.name.clone(), "MOCK-SCANNER"))
    }
}

/// Handle for scripting a [`MockScanner`].
#[derive(Debug, Clone)]
pub struct MockScannerHandle {
    state: Arc<Mutex<ScannerState>>,
    captures: Arc<AtomicU32>,
}

impl MockScannerHandle {
    /// Replace the room's current inventory.
    pub fn set_inventory(&self, records: Vec<InventoryItemRecord>) {
        self.with_state(|state| state.inventory = records);
    }

    /// Return `records` from the next capture instead of the inventory.
    pub fn push_scan(&self, records: Vec<InventoryItemRecord>) {
        self.with_state(|state| state.script.push_back(Scripted::Scan(records)));
    }

    /// Fail the next capture.
    pub fn push_failure(&self, message: impl Into<String>) {
        let message = message.into();
        self.with_state(|state| state.script.push_back(Scripted::Failure(message)));
    }

    /// Make the next capture never complete.
    pub fn push_hang(&self) {
        self.with_state(|state| state.script.push_back(Scripted::Hang));
    }

    /// Delay every capture by `delay`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.with_state(|state| state.delay = delay);
    }

    /// Number of captures attempted so far.
    pub fn capture_count(&self) -> u32 {
        self.captures.load(Ordering::SeqCst)
    }

    fn with_state(&self, f: impl FnOnce(&mut ScannerState)) {
        if let Ok(mut state) = self.state.lock() {
            f(&mut state);
        }
    }
}
