//! Host platform utility functions

use std::path::PathBuf;

/// Environment variable giving the root of the software tree (the directory holding `params/`
/// and `sessions/`).
pub const SW_ROOT_ENV_VAR: &str = "SMART_CAR_SW_ROOT";

/// Get the software root directory.
///
/// Falls back to the current working directory if the environment variable is not set.
pub fn get_sw_root() -> std::io::Result<PathBuf> {
    match std::env::var_os(SW_ROOT_ENV_VAR) {
        Some(root) => Ok(PathBuf::from(root)),
        None => std::env::current_dir()
    }
}
