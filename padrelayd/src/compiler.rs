//! Macro definition compiler
//!
//! A macro file holds one instruction per line:
//!
//! ```text
//! press <button>
//! release <button>
//! wait <ms>
//! joy_l [<x>,<y>]
//! joy_r [<x>,<y>]
//! play [<name>, <name>, ...]
//! ```
//!
//! Structural errors abort the whole file. Unknown commands are logged and
//! skipped. Button names are only checked when the macro is played.

use padrelay_common::{digest, tracing, MacroId, Side};
use thiserror::Error;
use tracing::warn;

/// One primitive step of a compiled macro
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Press a button, resolved by name at playback time
    PressButton(String),
    /// Release a button, resolved by name at playback time
    ReleaseButton(String),
    /// Sync the device, then sleep for the given number of milliseconds
    Wait(u64),
    /// Move an analog stick; axes range over [-1.0, 1.0]
    SetJoystick { side: Side, x: f32, y: f32 },
    /// Play one of the candidates, picked uniformly at playback time
    PlayMacro(Vec<MacroId>),
    /// Commit pending device state as one input frame
    Sync,
}

/// Compiled, immutable list of actions. Always ends with [`Action::Sync`].
#[derive(Debug, Clone, PartialEq)]
pub struct MacroSequence {
    actions: Vec<Action>,
}

impl MacroSequence {
    /// Wrap a list of actions, appending the trailing sync
    pub fn new(mut actions: Vec<Action>) -> Self {
        actions.push(Action::Sync);
        Self { actions }
    }

    /// Sequence played for identifiers missing from the macro table
    pub fn undefined() -> Self {
        Self::new(Vec::new())
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Why a single line failed to compile
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileErrorKind {
    #[error("'{0}' command requires a button name")]
    MissingButton(&'static str),

    #[error("'wait' command requires a time in milliseconds")]
    MissingDuration,

    #[error("'wait' duration '{0}' is not an integer number of milliseconds")]
    InvalidDuration(String),

    #[error("'{0}' command expects an opening bracket '['")]
    MissingOpenBracket(&'static str),

    #[error("'{0}' command expects a closing bracket ']'")]
    MissingCloseBracket(&'static str),

    #[error("'{0}' command requires two float values separated by a comma")]
    InvalidCoordinates(&'static str),

    #[error("'play' command requires at least one macro name")]
    NoCandidates,

    #[error("unexpected trailing input in '{command}': '{trailing}'")]
    Trailing { command: &'static str, trailing: String },
}

/// A compile failure, pinned to the file and line that caused it
#[derive(Debug, Clone, PartialEq, Error)]
#[error("error while parsing [{source_name}] @ line {line_number}: \"{line}\": {kind}")]
pub struct CompileError {
    pub source_name: String,
    /// 1-based
    pub line_number: usize,
    pub line: String,
    pub kind: CompileErrorKind,
}

/// Compile a macro document. `source_name` only labels diagnostics.
pub fn compile(source_name: &str, document: &str) -> Result<MacroSequence, CompileError> {
    let mut actions = Vec::new();

    for (index, line) in document.lines().enumerate() {
        let fail = |kind| CompileError {
            source_name: source_name.to_string(),
            line_number: index + 1,
            line: line.to_string(),
            kind,
        };

        if let Some(action) = compile_line(source_name, index + 1, line).map_err(fail)? {
            actions.push(action);
        }
    }

    Ok(MacroSequence::new(actions))
}

fn compile_line(
    source_name: &str,
    line_number: usize,
    line: &str,
) -> Result<Option<Action>, CompileErrorKind> {
    let line = line.trim();
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim_start()),
        None => (line, ""),
    };

    let action = match command {
        "" => return Ok(None),
        "press" => Action::PressButton(single_word("press", rest)?),
        "release" => Action::ReleaseButton(single_word("release", rest)?),
        "wait" => {
            let mut words = rest.split_whitespace();
            let ms = words.next().ok_or(CompileErrorKind::MissingDuration)?;
            let ms = ms
                .parse::<i64>()
                .map_err(|_| CompileErrorKind::InvalidDuration(ms.to_string()))?;
            no_trailing("wait", words)?;
            // Negative waits sleep for nothing
            Action::Wait(ms.max(0) as u64)
        }
        "joy_l" => joystick("joy_l", Side::Left, rest)?,
        "joy_r" => joystick("joy_r", Side::Right, rest)?,
        "play" => {
            let inner = bracketed("play", rest)?;
            let candidates: Vec<MacroId> = inner
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|name| !name.is_empty())
                .map(digest)
                .collect();
            if candidates.is_empty() {
                return Err(CompileErrorKind::NoCandidates);
            }
            Action::PlayMacro(candidates)
        }
        other => {
            warn!("Unknown command '{}' in [{}] @ line {}, skipping", other, source_name, line_number);
            return Ok(None);
        }
    };

    Ok(Some(action))
}

fn single_word(command: &'static str, rest: &str) -> Result<String, CompileErrorKind> {
    let mut words = rest.split_whitespace();
    let word = words.next().ok_or(CompileErrorKind::MissingButton(command))?;
    no_trailing(command, words)?;
    Ok(word.to_string())
}

fn no_trailing<'a>(
    command: &'static str,
    mut words: impl Iterator<Item = &'a str>,
) -> Result<(), CompileErrorKind> {
    match words.next() {
        Some(trailing) => Err(CompileErrorKind::Trailing {
            command,
            trailing: trailing.to_string(),
        }),
        None => Ok(()),
    }
}

/// Returns the text between `[` and `]`, rejecting anything after the `]`
fn bracketed<'a>(command: &'static str, rest: &'a str) -> Result<&'a str, CompileErrorKind> {
    let inner = rest
        .strip_prefix('[')
        .ok_or(CompileErrorKind::MissingOpenBracket(command))?;
    let (inner, after) = inner
        .split_once(']')
        .ok_or(CompileErrorKind::MissingCloseBracket(command))?;
    no_trailing(command, after.split_whitespace())?;
    Ok(inner)
}

fn joystick(command: &'static str, side: Side, rest: &str) -> Result<Action, CompileErrorKind> {
    let inner = bracketed(command, rest)?;
    let (x, y) = inner
        .split_once(',')
        .ok_or(CompileErrorKind::InvalidCoordinates(command))?;
    let axis = |value: &str| {
        value
            .trim()
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or(CompileErrorKind::InvalidCoordinates(command))
    };
    Ok(Action::SetJoystick {
        side,
        x: axis(x)?,
        y: axis(y)?,
    })
}
