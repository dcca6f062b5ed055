//! Error kinds surfaced by kubesealplus operations

use std::path::PathBuf;
use thiserror::Error;

/// kubesealplus errors
///
/// None of these are retried; each one aborts the current operation before
/// the manifest on disk is touched.
#[derive(Error, Debug)]
pub enum Error {
    /// Template guard or manifest shape violation
    #[error("{0}")]
    Format(String),

    /// Manifest filename does not follow `secret-<name>.<environment>.yaml`
    #[error("invalid manifest filename '{filename}': {reason}")]
    Filename { filename: String, reason: String },

    /// Interactive input stream exhausted or unreadable
    #[error("input error: {0}")]
    Input(String),

    /// Sealer failure or sealed output that does not match the input keys
    #[error("sealing failed: {0}")]
    Sealing(String),

    /// Missing or unreadable environment configuration
    #[error("{message}\nrun 'kubesealplus config {environment} cert <path-or-url>' first")]
    Config {
        environment: String,
        message: String,
    },

    /// Certificate could not be loaded
    #[error("certificate error: {0}")]
    Certificate(String),

    /// User-supplied value failed validation
    #[error("{0}")]
    Validation(String),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
