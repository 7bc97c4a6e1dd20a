//! Generic parameters functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use thiserror::Error;
use toml;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Cannot determine the software root directory: {0}")]
    SwRootUnavailable(std::io::Error),

    #[error("Cannot load the parmeter file {0:?}: {1}")]
    FileLoadError(PathBuf, std::io::Error),

    #[error("Cannot read the parameter file: {0}")]
    DeserialiseError(toml::de::Error)
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a parameter file
///
/// The file path is relative to the `params` directory under the software root, unless it is
/// absolute in which case it is used as is.
pub fn load<P>(param_file_path: &str) -> Result<P, LoadError> 
where
    P: DeserializeOwned
{
    let path = resolve(param_file_path)?;

    // Load the file into a string
    let params_str = read_to_string(&path)
        .map_err(|e| LoadError::FileLoadError(path.clone(), e))?;

    from_str(&params_str)
}

/// Parse parameters from a TOML string.
pub fn from_str<P>(params_str: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned
{
    toml::from_str(params_str).map_err(LoadError::DeserialiseError)
}

/// Resolve a path relative to the params directory.
pub fn resolve(param_file_path: &str) -> Result<PathBuf, LoadError> {
    if Path::new(param_file_path).is_absolute() {
        return Ok(PathBuf::from(param_file_path))
    }

    let mut path = crate::host::get_sw_root()
        .map_err(LoadError::SwRootUnavailable)?;
    path.push("params");
    path.push(param_file_path);

    Ok(path)
}

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct TestParams {
        period_s: f64,
        names: Vec<String>
    }

    #[test]
    fn test_from_str() {
        let p: TestParams = from_str("period_s = 2.0\nnames = [\"a\", \"b\"]").unwrap();
        assert_eq!(p.period_s, 2.0);
        assert_eq!(p.names, vec!["a", "b"]);

        let bad: Result<TestParams, _> = from_str("period_s = \"two\"");
        assert!(matches!(bad, Err(LoadError::DeserialiseError(_))));
    }

    #[test]
    fn test_resolve_absolute() {
        let abs = if cfg!(windows) { "C:\\params\\a.toml" } else { "/tmp/a.toml" };
        assert_eq!(resolve(abs).unwrap(), PathBuf::from(abs));
    }
}
