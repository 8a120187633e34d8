//! Error types for the propagation engine
//!
//! Two families exist. [`ConfigurationError`] covers anything wrong with how
//! components were assembled (unsupported stencil radius, a grid of the wrong
//! formulation handed to a component, invalid knobs). Callers are expected to
//! treat it as fatal. [`StorageError`] covers checkpoint spill files. A failed
//! read always surfaces here and never yields stale frames.

use std::fmt;
use std::path::PathBuf;

use crate::grid::Formulation;

/// Fatal assembly errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// Stencil radius outside {1, 2, 4, 6, 8}
    UnsupportedHalfLength(usize),
    /// Component handed a grid of the wrong formulation
    GridMismatch {
        /// Component that rejected the grid
        component: &'static str,
        /// Formulation the component works on
        expected: Formulation,
        /// Formulation of the grid it received
        found: Formulation,
    },
    /// A numeric or textual knob is out of range
    InvalidParameter {
        /// Parameter name as it appears in configuration
        name: &'static str,
        /// Why the value was rejected
        message: String,
    },
    /// Geometry that cannot hold a stencil plus boundary
    InvalidGeometry(String),
    /// Forward collector cannot reconstruct frames under this boundary
    IncompatibleCollector {
        /// Collector strategy name
        collector: &'static str,
        /// Boundary manager name
        boundary: &'static str,
    },
    /// Operation needs state that was never prepared
    MissingGrid(&'static str),
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::UnsupportedHalfLength(hl) => write!(
                f,
                "Unsupported half length {hl}: expected one of 1, 2, 4, 6, 8"
            ),
            ConfigurationError::GridMismatch {
                component,
                expected,
                found,
            } => write!(
                f,
                "{component} requires a {expected} grid but received a {found} grid"
            ),
            ConfigurationError::InvalidParameter { name, message } => {
                write!(f, "Invalid parameter '{name}': {message}")
            }
            ConfigurationError::InvalidGeometry(msg) => write!(f, "Invalid geometry: {msg}"),
            ConfigurationError::IncompatibleCollector {
                collector,
                boundary,
            } => write!(
                f,
                "Forward collector '{collector}' cannot reconstruct frames with the irreversible '{boundary}' boundary"
            ),
            ConfigurationError::MissingGrid(what) => write!(f, "Missing state: {what}"),
        }
    }
}

impl std::error::Error for ConfigurationError {}

/// Checkpoint storage failures
#[derive(Debug)]
pub enum StorageError {
    /// Could not create the spill directory
    CreateDirectory {
        /// Directory path
        path: PathBuf,
        /// Underlying error message
        message: String,
    },
    /// Could not write a spill file
    Write {
        /// File path
        path: PathBuf,
        /// Underlying error message
        message: String,
    },
    /// Could not read a spill file back
    Read {
        /// File path
        path: PathBuf,
        /// Underlying error message
        message: String,
    },
    /// Spill file exists but its content does not match the expected frame layout
    Corrupt {
        /// File path
        path: PathBuf,
        /// What did not match
        message: String,
    },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::CreateDirectory { path, message } => {
                write!(f, "Failed to create {}: {message}", path.display())
            }
            StorageError::Write { path, message } => {
                write!(f, "Failed to write {}: {message}", path.display())
            }
            StorageError::Read { path, message } => {
                write!(f, "Failed to read {}: {message}", path.display())
            }
            StorageError::Corrupt { path, message } => {
                write!(f, "Corrupt checkpoint {}: {message}", path.display())
            }
        }
    }
}

impl std::error::Error for StorageError {}

/// Any error surfaced by the engine
#[derive(Debug)]
pub enum RtmError {
    /// See [`ConfigurationError`]
    Configuration(ConfigurationError),
    /// See [`StorageError`]
    Storage(StorageError),
}

impl fmt::Display for RtmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtmError::Configuration(e) => write!(f, "Configuration error: {e}"),
            RtmError::Storage(e) => write!(f, "Storage error: {e}"),
        }
    }
}

impl std::error::Error for RtmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RtmError::Configuration(e) => Some(e),
            RtmError::Storage(e) => Some(e),
        }
    }
}

impl From<ConfigurationError> for RtmError {
    fn from(e: ConfigurationError) -> Self {
        RtmError::Configuration(e)
    }
}

impl From<StorageError> for RtmError {
    fn from(e: StorageError) -> Self {
        RtmError::Storage(e)
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, RtmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let err = ConfigurationError::UnsupportedHalfLength(3);
        assert!(err.to_string().contains("half length 3"));

        let err = ConfigurationError::GridMismatch {
            component: "SpongeBoundaryManager",
            expected: Formulation::AcousticSecond,
            found: Formulation::Staggered,
        };
        let msg = err.to_string();
        assert!(msg.contains("SpongeBoundaryManager"));
        assert!(msg.contains("staggered"));
    }

    #[test]
    fn test_rtm_error_wraps_sources() {
        let err: RtmError = StorageError::Read {
            path: PathBuf::from("/tmp/temp_0"),
            message: "gone".to_string(),
        }
        .into();
        assert!(matches!(err, RtmError::Storage(StorageError::Read { .. })));
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().starts_with("Storage error"));
    }
}
