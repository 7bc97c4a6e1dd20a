//! # Operator commands
//!
//! Applies pause, resume and quit commands to the vehicle, whether typed at the keyboard or read
//! from a timed script.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use car_if::tc::UserCmd;
use log::{info, warn};
use util::script_interpreter::{PendingCmds, ScriptInterpreter};

use crate::clock::Clock;
use crate::vehicle::{Vehicle, VehicleError};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Time between two checks of the script for pending commands.
const SCRIPT_POLL: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Apply a command to the vehicle. Returns true if the command ends the session.
pub fn apply(vehicle: &Vehicle, cmd: UserCmd) -> Result<bool, VehicleError> {
    info!("User command: {:?}", cmd);

    match cmd {
        UserCmd::Pause => vehicle.pause()?,
        UserCmd::Resume => vehicle.resume()?,
        UserCmd::Quit => {
            vehicle.shutdown();
            return Ok(true)
        }
    }

    Ok(false)
}

/// Spawn a thread applying the keys typed on stdin, one or more keys per line.
///
/// The thread ends on quit or when stdin closes. It is not meant to be joined, since it may be
/// blocked reading stdin when the session ends.
pub fn spawn_keyboard(vehicle: Arc<Vehicle>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("keyboard".into())
        .spawn(move || {
            info!("Keyboard commands: p = pause, g = go, q = quit");

            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(l) => l,
                    Err(e) => {
                        warn!("Could not read stdin: {}", e);
                        break
                    }
                };

                for key in line.chars().filter(|c| !c.is_whitespace()) {
                    let cmd = match UserCmd::from_key(key) {
                        Ok(c) => c,
                        Err(e) => {
                            warn!("{}", e);
                            continue
                        }
                    };

                    match apply(&vehicle, cmd) {
                        Ok(true) => return,
                        Ok(false) => (),
                        Err(e) => warn!("Could not apply {:?}: {}", cmd, e)
                    }
                }
            }
        })
}

/// Apply the commands of a script at their scheduled times, until the script ends, a quit is
/// applied, or the vehicle shuts down.
///
/// Script times are measured on `clock`.
pub fn run_script(vehicle: &Vehicle, mut si: ScriptInterpreter, clock: &dyn Clock) {
    info!(
        "Running user command script: {} commands over {:.2} s", 
        si.get_num_cmds(), 
        si.get_duration()
    );

    loop {
        match vehicle.is_running() {
            Ok(true) => (),
            _ => break
        }

        match si.get_pending_cmds(clock.now().as_secs_f64()) {
            PendingCmds::None => (),
            PendingCmds::Some(cmds) => {
                for cmd in cmds {
                    match apply(vehicle, cmd) {
                        Ok(true) => return,
                        Ok(false) => (),
                        Err(e) => warn!("Could not apply scripted {:?}: {}", cmd, e)
                    }
                }
            },
            PendingCmds::EndOfScript => {
                info!("End of user command script");
                break
            }
        }

        clock.sleep(SCRIPT_POLL);
    }
}

/// Spawn a thread running the script.
pub fn spawn_script(
    vehicle: Arc<Vehicle>, 
    si: ScriptInterpreter, 
    clock: Arc<dyn Clock>
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("user_script".into())
        .spawn(move || run_script(&vehicle, si, clock.as_ref()))
}
