//! Mock door lock with a scriptable close sensor.

use crate::{HardwareError, Result, traits::DoorLock, types::DeviceInfo};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};

#[derive(Debug)]
struct DoorShared {
    locked: AtomicBool,
    unlock_count: AtomicU32,
    lock_count: AtomicU32,
    fail_next_unlock: AtomicBool,
    auto_close: Mutex<Option<Duration>>,
    unlocked: Notify,
}

/// Mock door lock.
///
/// The door starts locked. After an unlock, [`DoorLock::wait_closed`]
/// resolves either when the handle reports a close, or after the configured
/// auto-close delay. With neither, the door stays open forever.
///
/// ```
/// use stockroom_hardware::mock::MockDoor;
/// use stockroom_hardware::traits::DoorLock;
///
/// #[tokio::main]
/// async fn main() -> stockroom_hardware::Result<()> {
///     let (mut door, handle) = MockDoor::new();
///
///     door.unlock().await?;
///     handle.close_door();
///     door.wait_closed().await?;
///     door.lock().await?;
///
///     assert!(handle.is_locked());
///     assert_eq!(handle.unlock_count(), 1);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockDoor {
    close_rx: mpsc::UnboundedReceiver<()>,
    shared: Arc<DoorShared>,
    name: String,
}

impl MockDoor {
    pub fn new() -> (Self, MockDoorHandle) {
        Self::with_name("Mock Door".to_string())
    }

    pub fn with_name(name: String) -> (Self, MockDoorHandle) {
        let (close_tx, close_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(DoorShared {
            locked: AtomicBool::new(true),
            unlock_count: AtomicU32::new(0),
            lock_count: AtomicU32::new(0),
            fail_next_unlock: AtomicBool::new(false),
            auto_close: Mutex::new(None),
            unlocked: Notify::new(),
        });

        let door = Self {
            close_rx,
            shared: Arc::clone(&shared),
            name,
        };
        (door, MockDoorHandle { close_tx, shared })
    }

    fn auto_close(&self) -> Option<Duration> {
        self.shared
            .auto_close
            .lock()
            .map(|guard| *guard)
            .unwrap_or(None)
    }
}

impl DoorLock for MockDoor {
    async fn unlock(&mut self) -> Result<()> {
        if self.shared.fail_next_unlock.swap(false, Ordering::SeqCst) {
            return Err(HardwareError::actuator("unlock solenoid did not respond"));
        }

        // Close events from a previous visit must not end this one.
        while self.close_rx.try_recv().is_ok() {}

        self.shared.locked.store(false, Ordering::SeqCst);
        self.shared.unlock_count.fetch_add(1, Ordering::SeqCst);
        self.shared.unlocked.notify_one();
        Ok(())
    }

    async fn lock(&mut self) -> Result<()> {
        self.shared.locked.store(true, Ordering::SeqCst);
        self.shared.lock_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn wait_closed(&mut self) -> Result<()> {
        if let Some(delay) = self.auto_close() {
            tokio::time::sleep(delay).await;
            return Ok(());
        }

        self.close_rx
            .recv()
            .await
            .ok_or_else(|| HardwareError::disconnected("door sensor channel closed"))
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        Ok(DeviceInfo::new(self.name.clone(), "MOCK-DOOR"))
    }
}

/// Handle for driving a [`MockDoor`] and observing its actuator.
#[derive(Debug, Clone)]
pub struct MockDoorHandle {
    close_tx: mpsc::UnboundedSender<()>,
    shared: Arc<DoorShared>,
}

impl MockDoorHandle {
    /// Report a door-close from the sensor.
    pub fn close_door(&self) {
        let _ = self.close_tx.send(());
    }

    /// Close the door automatically `delay` after each wait begins.
    pub fn set_auto_close(&self, delay: Option<Duration>) {
        if let Ok(mut guard) = self.shared.auto_close.lock() {
            *guard = delay;
        }
    }

    /// Make the next unlock fail.
    pub fn fail_next_unlock(&self) {
        self.shared.fail_next_unlock.store(true, Ordering::SeqCst);
    }

    /// Wait until the door is unlocked (consumes one unlock notification).
    pub async fn wait_for_unlock(&self) {
        self.shared.unlocked.notified().await;
    }

    pub fn is_locked(&self) -> bool {
        self.shared.locked.load(Ordering::SeqCst)
    }

    pub fn unlock_count(&self) -> u32 {
        self.shared.unlock_count.load(Ordering::SeqCst)
    }

    pub fn lock_count(&self) -> u32 {
        self.shared.lock_count.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stale_close_is_discarded_on_unlock() {
        let (mut door, handle) = MockDoor::new();
        handle.close_door();

        door.unlock().await.unwrap();
        let waited = tokio::time::timeout(Duration::from_millis(20), door.wait_closed()).await;
        assert!(waited.is_err(), "stale close event ended the wait");
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_close() {
        let (mut door, handle) = MockDoor::new();
        handle.set_auto_close(Some(Duration::from_secs(5)));

        door.unlock().await.unwrap();
        let start = tokio::time::Instant::now();
        door.wait_closed().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_fail_next_unlock() {
        let (mut door, handle) = MockDoor::new();
        handle.fail_next_unlock();

        assert!(door.unlock().await.is_err());
        assert!(handle.is_locked());
        door.unlock().await.unwrap();
        assert!(!handle.is_locked());
        assert_eq!(handle.unlock_count(), 1);
    }

    #[tokio::test]
    async fn test_wait_for_unlock() {
        let (mut door, handle) = MockDoor::new();
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.wait_for_unlock().await })
        };

        door.unlock().await.unwrap();
        waiter.await.unwrap();
    }
}
