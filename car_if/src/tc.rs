//! # Operator command module
//!
//! Commands issued by the operator while the car is driving, either typed at the keyboard or
//! read from a script.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Serialize, Deserialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserCmd {
    /// Stop the car and suspend both lane following and sign detection.
    Pause,

    /// Undo a previous pause, restoring the speed the car had before it.
    Resume,

    /// End the drive session, neutralising the actuators.
    Quit,
}

/// Possible parsing errors.
#[derive(Debug, Error)]
pub enum UserCmdParseError {
    #[error("Command contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("No command is bound to the key {0:?}")]
    UnknownKey(char),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl UserCmd {
    /// Parse a command from its JSON representation (e.g. `"pause"`).
    pub fn from_json(json_str: &str) -> Result<Self, UserCmdParseError> {
        serde_json::from_str(json_str.trim()).map_err(UserCmdParseError::InvalidJson)
    }

    /// Map a keyboard key onto a command.
    ///
    /// `p` pauses, `g` goes (resumes) and `q` quits.
    pub fn from_key(key: char) -> Result<Self, UserCmdParseError> {
        match key.to_ascii_lowercase() {
            'p' => Ok(UserCmd::Pause),
            'g' => Ok(UserCmd::Resume),
            'q' => Ok(UserCmd::Quit),
            k => Err(UserCmdParseError::UnknownKey(k))
        }
    }
}
