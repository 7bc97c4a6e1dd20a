//! Detector class labels

use std::fs;
use std::path::{Path, PathBuf};

/// Ordered list of the detector's class labels, indexed by class id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    labels: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum LabelMapError {
    #[error("Could not read the labelmap at {0:?}: {1}")]
    LoadError(PathBuf, std::io::Error),

    #[error("The labelmap contains no labels")]
    Empty,
}

impl LabelMap {
    /// Load the labelmap from a file with one label per line.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LabelMapError> {
        let s = fs::read_to_string(path.as_ref())
            .map_err(|e| LabelMapError::LoadError(path.as_ref().to_path_buf(), e))?;

        Self::from_str(&s)
    }

    /// Parse a labelmap, ignoring trailing blank lines.
    pub fn from_str(s: &str) -> Result<Self, LabelMapError> {
        let mut labels: Vec<String> = s.lines().map(|l| l.trim().to_string()).collect();

        while labels.last().map(|l| l.is_empty()).unwrap_or(false) {
            labels.pop();
        }

        if labels.is_empty() {
            return Err(LabelMapError::Empty)
        }

        Ok(Self {
            labels
        })
    }

    /// Get the label of a class, `None` if the class is unknown.
    pub fn label(&self, class_id: usize) -> Option<&str> {
        self.labels.get(class_id).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }
}
