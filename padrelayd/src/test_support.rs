//! Recording controller used by unit and end-to-end tests

use padrelay_common::Side;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::controller::{Controller, ControllerError, ControllerFactory};

/// One call made against a controller
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    Press(u16),
    Release(u16),
    Joystick(Side, f32, f32),
    Sync,
}

/// Controller that records every call instead of touching a device
#[derive(Debug, Default)]
pub struct MockController {
    calls: Mutex<Vec<DeviceCall>>,
}

impl MockController {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of the calls made so far
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DeviceCall>> {
        // A panicking test thread must not hide the calls from the others
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: DeviceCall) -> Result<(), ControllerError> {
        self.lock().push(call);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Controller for MockController {
    async fn press_button(&self, code: u16) -> Result<(), ControllerError> {
        self.record(DeviceCall::Press(code))
    }

    async fn release_button(&self, code: u16) -> Result<(), ControllerError> {
        self.record(DeviceCall::Release(code))
    }

    async fn set_joystick(&self, side: Side, x: f32, y: f32) -> Result<(), ControllerError> {
        self.record(DeviceCall::Joystick(side, x, y))
    }

    async fn sync(&self) -> Result<(), ControllerError> {
        self.record(DeviceCall::Sync)
    }
}

/// Hands out a new [`MockController`] per session and remembers each one
#[derive(Debug, Default)]
pub struct MockFactory {
    opened: Mutex<Vec<Arc<MockController>>>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Controllers opened so far, in session order
    pub fn opened(&self) -> Vec<Arc<MockController>> {
        self.opened
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait::async_trait]
impl ControllerFactory for MockFactory {
    async fn open(&self) -> Result<Arc<dyn Controller>, ControllerError> {
        let controller = MockController::new();
        self.opened
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Arc::clone(&controller));
        Ok(controller)
    }
}
