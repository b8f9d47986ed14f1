use padrelay_common::{tracing, MacroId, DISCONNECT_FLAG, MACRO_ID_LEN};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use crate::control::ControlPlane;
use crate::controller::Controller;
use crate::cooldown::{CooldownPolicy, CooldownTracker, Verdict};
use crate::macro_engine::MacroEngine;

/// Tunables shared by every session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Triggers beyond this many pending ones are dropped
    pub queue_capacity: usize,
    /// How long the dispatch loop sleeps on an empty queue
    pub poll_interval: Duration,
    pub cooldown: CooldownPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            poll_interval: Duration::from_millis(10),
            cooldown: CooldownPolicy::default(),
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    queue: VecDeque<MacroId>,
    cooldowns: CooldownTracker,
}

/// One authenticated client.
///
/// The receive loop fills the trigger queue from the socket; the dispatch
/// loop drains it, applies cooldowns and launches playback. Both stop once
/// the session is marked terminal.
#[derive(Debug)]
pub struct ClientSession {
    peer: SocketAddr,
    settings: SessionSettings,
    state: Mutex<SessionState>,
    terminal: AtomicBool,
}

impl ClientSession {
    pub fn new(peer: SocketAddr, settings: SessionSettings) -> Arc<Self> {
        Arc::new(Self {
            peer,
            settings,
            state: Mutex::new(SessionState::default()),
            terminal: AtomicBool::new(false),
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.load(Ordering::SeqCst)
    }

    /// Returns true only for the call that actually ended the session
    pub fn mark_terminal(&self) -> bool {
        !self.terminal.swap(true, Ordering::SeqCst)
    }

    /// Queue a trigger. Returns false if the queue was full and it was dropped.
    pub async fn enqueue(&self, id: MacroId) -> bool {
        let mut state = self.state.lock().await;
        if state.queue.len() >= self.settings.queue_capacity {
            return false;
        }
        state.queue.push_back(id);
        true
    }

    #[cfg(test)]
    pub async fn pending(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    /// Pop the oldest trigger and run it through the cooldown policy
    pub async fn next_trigger(&self, now: std::time::Instant) -> Option<(MacroId, Verdict)> {
        let mut state = self.state.lock().await;
        let id = state.queue.pop_front()?;
        let verdict = state.cooldowns.evaluate(id, now, &self.settings.cooldown);
        Some((id, verdict))
    }

    /// Run both loops to completion.
    ///
    /// The session's handle on `controller` is released when this returns;
    /// playbacks still in flight keep the device alive until they finish.
    pub async fn run<R>(
        self: Arc<Self>,
        reader: R,
        engine: MacroEngine,
        controller: Arc<dyn Controller>,
        control: Arc<ControlPlane>,
    ) where
        R: AsyncRead + Unpin + Send,
    {
        info!("Session started for {}", self.peer);
        tokio::join!(
            self.receive_loop(reader, &control),
            self.dispatch_loop(&engine, controller, &control),
        );
        info!("Session ended for {}", self.peer);
    }

    /// Read identifiers off the wire until disconnect or shutdown
    pub async fn receive_loop<R>(&self, mut reader: R, control: &ControlPlane)
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = [0u8; MACRO_ID_LEN];

        while !self.is_terminal() {
            let read = tokio::select! {
                _ = control.cancelled() => break,
                read = reader.read(&mut buf) => read,
            };

            match read {
                Ok(0) => {
                    debug!("{} disconnected", self.peer);
                    break;
                }
                Ok(2) if u16::from_be_bytes([buf[0], buf[1]]) == DISCONNECT_FLAG => {
                    debug!("{} sent disconnect flag", self.peer);
                    break;
                }
                Ok(MACRO_ID_LEN) => {
                    let id = MacroId::from_bytes(buf);
                    if control.is_paused() {
                        trace!("Paused, discarding {}", id);
                    } else if !self.enqueue(id).await {
                        trace!("Queue full, dropping {}", id);
                    }
                }
                Ok(n) => warn!("Ignoring {}-byte frame from {}", n, self.peer),
                Err(e) => {
                    warn!("Read from {} failed: {}", self.peer, e);
                    break;
                }
            }
        }

        self.mark_terminal();
    }

    /// Launch playback for queued triggers until the session ends
    pub async fn dispatch_loop(
        &self,
        engine: &MacroEngine,
        controller: Arc<dyn Controller>,
        control: &ControlPlane,
    ) {
        while !self.is_terminal() && control.is_running() {
            let now = tokio::time::Instant::now().into_std();
            match self.next_trigger(now).await {
                None => tokio::time::sleep(self.settings.poll_interval).await,
                Some((id, Verdict::Play)) => {
                    let engine = engine.clone();
                    let controller = Arc::clone(&controller);
                    // Detached: teardown never waits on or cancels playback
                    tokio::spawn(async move {
                        engine.play_macro(id, controller.as_ref()).await;
                    });
                }
                Some((id, Verdict::Suppressed { cooldown })) => {
                    debug!("Macro {} on cooldown ({:?})", id, cooldown);
                }
            }
        }

        self.mark_terminal();
    }
}
