//! Padrelay daemon library
//!
//! Accepts authenticated TCP clients and replays named controller macros on a
//! per-client virtual gamepad:
//! - Macro DSL compiler and content-addressed macro table
//! - Connection handshake
//! - Per-session trigger queue with cooldowns
//! - uinput controller backend

use std::sync::Arc;
use std::time::{Duration, Instant};

pub mod buttons;
pub mod compiler;
pub mod config;
pub mod control;
pub mod controller;
pub mod cooldown;
pub mod handshake;
pub mod macro_engine;
pub mod macro_table;
pub mod server;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use padrelay_common::{digest, MacroId};

use control::ControlPlane;
use controller::ControllerFactory;
use macro_table::MacroTable;
use session::SessionSettings;

/// DaemonState holds everything connections share
pub struct DaemonState {
    pub start_time: Instant,
    pub macros: Arc<MacroTable>,
    pub control: Arc<ControlPlane>,
    pub controllers: Arc<dyn ControllerFactory>,
    pub session: SessionSettings,
    pub handshake_timeout: Duration,
}

impl DaemonState {
    pub fn new(macros: Arc<MacroTable>, controllers: Arc<dyn ControllerFactory>) -> Self {
        Self {
            start_time: Instant::now(),
            macros,
            control: Arc::new(ControlPlane::new()),
            controllers,
            session: SessionSettings::default(),
            handshake_timeout: Duration::from_secs(5),
        }
    }
}
