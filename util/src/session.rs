//! Session management

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use chrono::{DateTime, Utc};
use conquer_once::OnceCell;
use image::RgbImage;
use log::{info, warn};
use serde::Serialize;
use std::ffi::OsStr;
use std::fs;
use std::fs::OpenOptions;
use std::path::Path;
use std::path::PathBuf;
use std::sync::mpsc::channel;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::thread::JoinHandle;
use thiserror::Error;

// Internal imports
use crate::time;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static SESSION_EPOCH: OnceCell<DateTime<Utc>> = OnceCell::uninit();
static SAVE_SENDER: OnceCell<Mutex<Sender<SaveMsg>>> = OnceCell::uninit();

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// A chrono format string which diplays a timestamp. See
/// https://docs.rs/chrono/0.4.11/chrono/format/strftime/index.html for more
/// information.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S%.3f";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A struct storing information about the current session
#[derive(Clone)]
pub struct Session {
    /// The root directory for this session
    pub session_root: PathBuf,

    /// The path to the session's log file
    pub log_file_path: PathBuf,

    save_sender: Sender<SaveMsg>,

    save_thread: Arc<Mutex<Option<JoinHandle<()>>>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors associated with the session module.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Cannot determine the software root directory: {0}")]
    SwRootUnavailable(std::io::Error),

    #[error("Cannot create the session directory: {0}")]
    CannotCreateDir(std::io::Error),

    #[error(
        "Cannot initialise the session epoch, have you already initialised the\
         session? (conquer_once error: {0})"
    )]
    CannotInitEpoch(conquer_once::TryInitError),

    #[error("Cannot get the epoch time, did you forget to initialise the session?")]
    CannotGetEpoch,
}

/// Data which can be written into the session directory by the save thread.
pub enum SaveData {
    /// Serialised as pretty JSON, the path must end in `.json`
    Json(serde_json::Value),

    /// Encoded according to the path's extension (e.g. `.png`)
    Image(RgbImage),
}

enum SaveMsg {
    Save(PathBuf, SaveData),
    Stop,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Session {
    /// Start a new session within the given directory.
    ///
    /// This will create a new session directory named `{exec_name}_{timestamp}`
    pub fn new(exec_name: &str, sessions_dir: &str) -> Result<Self, SessionError> {
        // Set the session epoch
        SESSION_EPOCH
            .try_init_once(Utc::now)
            .map_err(SessionError::CannotInitEpoch)?;

        // Format the session epoch as a timestamp
        let timestamp = match SESSION_EPOCH.get() {
            Some(e) => e.format(TIMESTAMP_FORMAT),
            None => return Err(SessionError::CannotGetEpoch),
        };

        // Get the root directory
        let root = crate::host::get_sw_root().map_err(SessionError::SwRootUnavailable)?;

        // Create the session path
        let mut path: PathBuf = root;
        path.push(String::from(sessions_dir));
        path.push(format!("{}_{}", exec_name, timestamp));

        // Create the directory
        fs::create_dir_all(&path).map_err(SessionError::CannotCreateDir)?;

        // Create the log file path
        let mut log_file_path = path.clone();
        log_file_path.push(format!("{}.log", exec_name));

        // Create sender/receiver
        let (tx, rx) = channel();

        // Save copy in the static
        SAVE_SENDER.init_once(|| Mutex::new(tx.clone()));

        // Spawn background thread
        let session_root = path.clone();
        let handle = thread::Builder::new()
            .name("session_save".into())
            .spawn(move || save_thread(session_root, rx))
            .map_err(SessionError::CannotCreateDir)?;

        // Build the session struct
        Ok(Session {
            session_root: path,
            log_file_path,
            save_sender: tx,
            save_thread: Arc::new(Mutex::new(Some(handle))),
        })
    }

    /// Exit the session, waiting for the save thread to finish any pending actions
    pub fn exit(self) {
        info!("Stopping save thread");

        if self.save_sender.send(SaveMsg::Stop).is_err() {
            warn!("Save thread already stopped");
        }

        let handle = match self.save_thread.lock() {
            Ok(mut h) => h.take(),
            Err(_) => None
        };

        if let Some(h) = handle {
            if h.join().is_err() {
                warn!("Save thread panicked");
            }
        }

        info!("Save thread exited");
    }

    /// Saves the given data to the given session-relative path in a background thread.
    pub fn save<P: AsRef<Path>>(&self, path: P, data: SaveData) {
        if let Err(e) = self
            .save_sender
            .send(SaveMsg::Save(path.as_ref().to_path_buf(), data))
        {
            warn!(
                "Could not send data to be saved to path {:?}: {}",
                path.as_ref(),
                e
            )
        }
    }
}

impl SaveData {
    /// Build JSON save data from any serialisable value.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(SaveData::Json(serde_json::to_value(value)?))
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the number of seconds elapsed since the start of the session.
///
/// # Panics
/// - This function will panic if the session epoch has not been
///   initialised, which is performed on creating a new Session instance.
pub fn get_elapsed_seconds() -> f64 {
    match SESSION_EPOCH.get() {
        Some(e) => {
            let elapsed = Utc::now() - *e;
            match time::duration_to_seconds(elapsed) {
                Some(s) => s,
                None => std::f64::NAN,
            }
        }
        None => panic!("Cannot get the session epoch!"),
    }
}

/// Return a reference to the session's epoch.
///
/// # Panics
/// - This function will panic if the session epoch has not been
///   initialised, which is performed on creating a new Session instance.
pub fn get_epoch() -> &'static DateTime<Utc> {
    match SESSION_EPOCH.get() {
        Some(e) => e,
        None => panic!("Cannot get the session epoch!"),
    }
}

/// Returns true if a session has been started in this process.
pub fn is_initialised() -> bool {
    SESSION_EPOCH.get().is_some()
}

/// Save the given data into the session-relative path
///
/// If no session is running the data is dropped with a debug message, this allows modules to
/// save artefacts unconditionally.
pub fn save<P: AsRef<Path>>(path: P, data: SaveData) {
    match SAVE_SENDER.get() {
        Some(m) => match m.lock() {
            Ok(s) => match s.send(SaveMsg::Save(path.as_ref().to_path_buf(), data)) {
                Ok(_) => (),
                Err(e) => warn!(
                    "Couldn't send data to save thread for file {:?}: {}",
                    path.as_ref(),
                    e
                ),
            },
            Err(_) => {
                warn!("Couldn't get lock on save sender");
            }
        },
        None => {
            log::debug!("Session not initialised, not saving {:?}", path.as_ref());
        }
    }
}

/// Saves the given data to the path, appending a timestamp before the path's extension
pub fn save_with_timestamp<P: AsRef<Path>>(path: P, data: SaveData) {
    save(timestamped_path(path, Utc::now()), data);
}

// -----------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// -----------------------------------------------------------------------------------------------

fn timestamped_path<P: AsRef<Path>>(path: P, now: DateTime<Utc>) -> PathBuf {
    let stem = path.as_ref().file_stem().unwrap_or(OsStr::new(""));

    let mut file_name = stem.to_os_string();
    file_name.push("_");
    file_name.push(now.format(TIMESTAMP_FORMAT).to_string());

    if let Some(ext) = path.as_ref().extension() {
        file_name.push(".");
        file_name.push(ext);
    }

    path.as_ref().with_file_name(file_name)
}

fn save_thread(session_root: PathBuf, receiver: Receiver<SaveMsg>) {
    while let Ok(msg) = receiver.recv() {
        let (path, data) = match msg {
            SaveMsg::Save(p, d) => (p, d),
            SaveMsg::Stop => break,
        };

        let full_path = session_root.join(path);

        // Create the parent path if needed
        match full_path.parent() {
            Some(p) => {
                if let Err(e) = fs::create_dir_all(p) {
                    warn!("Couldn't create parent directory for {:?}: {}", full_path, e);
                    continue;
                }
            }
            None => {
                warn!("Couldn't find parent directory for {:?}", full_path);
                continue;
            }
        }

        match data {
            SaveData::Json(value) => {
                let file = match OpenOptions::new()
                    .write(true)
                    .truncate(true)
                    .create(true)
                    .open(&full_path)
                {
                    Ok(f) => f,
                    Err(e) => {
                        warn!("Couldn't create file {:?}: {}", full_path, e);
                        continue;
                    }
                };

                if let Err(e) = serde_json::to_writer_pretty(&file, &value) {
                    warn!("Couldn't serialize data for file {:?}: {}", full_path, e);
                }
            }
            SaveData::Image(img) => {
                if let Err(e) = img.save(&full_path) {
                    warn!("Couldn't save image {:?}: {}", full_path, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamped_path() {
        let now = Utc.ymd(2024, 5, 1).and_hms_milli(12, 30, 15, 250);
        assert_eq!(
            timestamped_path("maneuvers/stop.json", now),
            PathBuf::from("maneuvers/stop_20240501_123015.250.json")
        );
        assert_eq!(
            timestamped_path("frame", now),
            PathBuf::from("frame_20240501_123015.250")
        );
    }
}
