//! # User command script interpreter module
//!
//! This module provides an interpreter for timed user command scripts, allowing a drive session
//! to be paused, resumed and ended at fixed times without an operator at the keyboard.
//!
//! Scripts contain one command per entry, in the form `<seconds>: <json command>;`, for example:
//!
//! ```text
//! 12.0: "pause";
//! 15.5: "resume";
//! 60.0: "quit";
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::fs;
use regex::RegexBuilder;
use thiserror::Error;

// Internal
use car_if::tc::{UserCmd, UserCmdParseError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A command which is scripted to occur at a specific time.
#[derive(Debug)]
struct Command {
    /// The time the command is supposed to execute at
    exec_time_s: f64,

    /// The command to run
    cmd: UserCmd
}

/// A script interpreter.
///
/// After initialising with the path to the script to run use `.get_pending_cmds` to
/// acquire a list of commands that need executing.
#[derive(Debug)]
pub struct ScriptInterpreter {
    _script_path: PathBuf,
    cmds: VecDeque<Command>
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Could not find the script at {0:?}")]
    ScriptNotFound(PathBuf),

    #[error("Could not load the script: {0}")]
    ScriptLoadError(std::io::Error),

    #[error("The script is empty (or is so bad it can't be read)")]
    ScriptEmpty,

    #[error(
        "Script contains an invalid timestamp: {0}. \
        Should be a float (like 1.0)")]
    InvalidTimestamp(String),

    #[error("Script contains an invalid command at {0} s: {1}")]
    InvalidCmd(f64, UserCmdParseError)
}

#[derive(Debug, PartialEq)]
pub enum PendingCmds {
    None,
    Some(Vec<UserCmd>),
    EndOfScript
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ScriptInterpreter {

    /// Create a new interpreter from the given script path.
    pub fn new<P: AsRef<Path>>(script_path: P) -> Result<Self, ScriptError> {

        // Get the path in a buffer
        let path = PathBuf::from(script_path.as_ref());
        
        // Check that the script file exists.
        if !path.exists() {
            return Err(ScriptError::ScriptNotFound(path));
        }

        // Load the script into a string
        let script = fs::read_to_string(&path)
            .map_err(ScriptError::ScriptLoadError)?;

        Ok(ScriptInterpreter {
            cmds: Self::parse(&script)?,
            _script_path: path,
        })
    }

    /// Parse the contents of a script into a time-ordered queue of commands.
    fn parse(script: &str) -> Result<VecDeque<Command>, ScriptError> {
        // Empty queue of commands
        let mut cmd_queue: Vec<Command> = vec![];

        // Go through the script executing __the magic regex__.
        let re = RegexBuilder::
            new(r"^\s*(\d+(\.\d+)?)\s*:\s*([^;]*);")
            .multi_line(true)
            .build()
            .map_err(|e| ScriptError::InvalidTimestamp(e.to_string()))?;

        for cap in re.captures_iter(script) {
            let time_str = cap.get(1).map(|m| m.as_str()).unwrap_or("");
            let cmd_str = cap.get(3).map(|m| m.as_str()).unwrap_or("");

            // Parse the exec time
            let exec_time_s: f64 = time_str.parse()
                .map_err(|e| ScriptError::InvalidTimestamp(format!("{}", e)))?;

            // Parse the command from the payload. The scripts contain JSON only.
            let cmd = UserCmd::from_json(cmd_str)
                .map_err(|e| ScriptError::InvalidCmd(exec_time_s, e))?;

            cmd_queue.push(Command {
                exec_time_s,
                cmd
            });
        }

        if cmd_queue.is_empty() {
            return Err(ScriptError::ScriptEmpty)
        }

        // Stable sort keeps the written order of commands sharing a timestamp
        cmd_queue.sort_by(|a, b| a.exec_time_s
            .partial_cmp(&b.exec_time_s)
            .unwrap_or(std::cmp::Ordering::Equal));

        Ok(cmd_queue.into())
    }

    /// Return the commands whose execution time is before `current_time_s`.
    pub fn get_pending_cmds(&mut self, current_time_s: f64) -> PendingCmds {

        // If the queue is empty the script is over and we return the end of
        // script variant
        if self.cmds.is_empty() {
            return PendingCmds::EndOfScript
        }

        let mut cmd_vec: Vec<UserCmd> = vec![];

        // Pop items from the queue while the head's exec time is lower than the current time
        while let Some(front) = self.cmds.front() {
            if front.exec_time_s >= current_time_s {
                break;
            }
            if let Some(c) = self.cmds.pop_front() {
                cmd_vec.push(c.cmd);
            }
        }

        // If the vector is longer than 0 return Some, otherwise None
        if cmd_vec.is_empty() {
            PendingCmds::None
        }
        else {
            PendingCmds::Some(cmd_vec)
        }
    }

    /// Get the number of commands remaining in the script
    pub fn get_num_cmds(&self) -> usize {
        self.cmds.len()
    }

    /// Get the length of the script in seconds
    pub fn get_duration(&self) -> f64 {
        match self.cmds.back() {
            Some(c) => c.exec_time_s,
            None => 0f64
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn interpreter(script: &str) -> Result<ScriptInterpreter, ScriptError> {
        Ok(ScriptInterpreter {
            _script_path: PathBuf::from("test.script"),
            cmds: ScriptInterpreter::parse(script)?
        })
    }

    #[test]
    fn test_pending_cmds() {
        let mut si = interpreter(
            "# drive for a while then stop\n\
             4.0: \"resume\";\n\
             1.5: \"pause\";\n\
             10: \"quit\";\n"
        ).unwrap();

        assert_eq!(si.get_num_cmds(), 3);
        assert_eq!(si.get_duration(), 10.0);

        assert_eq!(si.get_pending_cmds(1.0), PendingCmds::None);
        assert_eq!(si.get_pending_cmds(1.6), PendingCmds::Some(vec![UserCmd::Pause]));
        assert_eq!(
            si.get_pending_cmds(11.0), 
            PendingCmds::Some(vec![UserCmd::Resume, UserCmd::Quit])
        );
        assert_eq!(si.get_pending_cmds(12.0), PendingCmds::EndOfScript);
    }

    #[test]
    fn test_invalid_scripts() {
        assert!(matches!(interpreter("nothing here"), Err(ScriptError::ScriptEmpty)));
        assert!(matches!(
            interpreter("2.0: \"reverse\";"), 
            Err(ScriptError::InvalidCmd(t, _)) if t == 2.0
        ));
    }
}
