use padrelay_common::tracing;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Process-wide run and pause flags shared by the server and every session
#[derive(Debug, Default)]
pub struct ControlPlane {
    paused: AtomicBool,
    shutdown: CancellationToken,
    reload: Notify,
}

impl ControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Flip the pause flag, returning the new state
    pub fn toggle_pause(&self) -> bool {
        let paused = !self.paused.fetch_xor(true, Ordering::SeqCst);
        if paused {
            info!("Paused!");
        } else {
            info!("Resumed!");
        }
        paused
    }

    /// Stop accepting clients and wind down all sessions
    pub fn request_shutdown(&self) {
        if self.is_running() {
            info!("Shutdown requested");
        }
        self.shutdown.cancel();
    }

    pub async fn cancelled(&self) {
        self.shutdown.cancelled().await
    }

    /// Ask the reload task to recompile the macro directory
    pub fn request_reload(&self) {
        info!("Macro reload requested");
        self.reload.notify_one();
    }

    /// Wait for the next reload request
    pub async fn reload_requested(&self) {
        self.reload.notified().await
    }

    /// Apply one console command line
    pub fn handle_command(&self, line: &str) {
        match line.trim() {
            "" => {}
            "pause" => {
                self.toggle_pause();
            }
            "quit" => self.request_shutdown(),
            "reload" => self.request_reload(),
            other => warn!("Unknown console command '{}'", other),
        }
    }
}

/// Read console commands until `quit`, end of input or shutdown.
///
/// Blocking; run it on a dedicated thread.
pub fn console_monitor<R: BufRead>(control: &ControlPlane, input: R) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Console read failed: {}", e);
                break;
            }
        };
        control.handle_command(&line);
        if !control.is_running() {
            break;
        }
    }
}
