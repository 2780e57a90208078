use std::path::PathBuf;

use thiserror::Error;

use srv_core::{ProcessError, RegistryError};

/// Error surface for the daemon runtime and service management.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("{binary} is not installed; daemon service uninstalled")]
    RuntimeMissing { binary: &'static str },

    #[error("background services are not supported on {0}")]
    UnsupportedPlatform(String),

    #[error("daemon service is not installed")]
    NotInstalled,

    #[error("{task} task join failure: {reason}")]
    Join { task: &'static str, reason: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
