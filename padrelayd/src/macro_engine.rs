use padrelay_common::{tracing, MacroId};
use rand::seq::SliceRandom;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::buttons;
use crate::compiler::{Action, MacroSequence};
use crate::controller::{Controller, ControllerError};
use crate::macro_table::MacroTable;

type PlayFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Plays compiled macros against a controller
#[derive(Clone)]
pub struct MacroEngine {
    table: Arc<MacroTable>,
}

impl MacroEngine {
    pub fn new(table: Arc<MacroTable>) -> Self {
        Self { table }
    }

    /// Play the macro registered under `id`.
    ///
    /// Unknown identifiers fall back to a sequence that only syncs the
    /// device. Device errors are logged and playback moves on to the next
    /// action.
    pub fn play_macro<'a>(&'a self, id: MacroId, controller: &'a dyn Controller) -> PlayFuture<'a> {
        // Boxed so nested `play` actions can recurse
        Box::pin(async move {
            let sequence = match self.table.lookup(&id).await {
                Some(sequence) => sequence,
                None => {
                    warn!("Undefined macro '{}'", id);
                    Arc::new(MacroSequence::undefined())
                }
            };

            debug!("Playing macro {} ({} actions)", id, sequence.len());
            for action in sequence.actions() {
                debug!("{}: {:?}", id, action);
                if let Err(e) = self.execute_action(action, controller).await {
                    error!("Macro {}: {}", id, e);
                }
            }
        })
    }

    /// Execute a single action
    pub async fn execute_action(
        &self,
        action: &Action,
        controller: &dyn Controller,
    ) -> Result<(), ControllerError> {
        match action {
            Action::PressButton(name) => controller.press_button(resolve(name)?).await?,
            Action::ReleaseButton(name) => controller.release_button(resolve(name)?).await?,
            Action::Wait(ms) => {
                controller.sync().await?;
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            Action::SetJoystick { side, x, y } => controller.set_joystick(*side, *x, *y).await?,
            Action::PlayMacro(candidates) => {
                if let Some(id) = pick_candidate(candidates) {
                    self.play_macro(id, controller).await;
                }
            }
            Action::Sync => controller.sync().await?,
        }
        Ok(())
    }
}

fn resolve(name: &str) -> Result<u16, ControllerError> {
    buttons::button_code(name).ok_or_else(|| ControllerError::UnknownButton(name.to_string()))
}

/// Uniform choice. Kept out of the async body so the thread-local RNG is
/// never held across an await point.
fn pick_candidate(candidates: &[MacroId]) -> Option<MacroId> {
    candidates.choose(&mut rand::thread_rng()).copied()
}
