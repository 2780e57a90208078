//! Error types for srv-core.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while resolving the process-wide [`Config`](crate::Config).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `SRV_ROOT` was set to a relative path.
    #[error("SRV_ROOT must be an absolute path: {0}")]
    RelativeRoot(PathBuf),

    /// No `SRV_ROOT`, no `XDG_CONFIG_HOME` and no home directory.
    #[error("cannot determine home directory; set $HOME or SRV_ROOT")]
    HomeNotFound,

    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// All errors that can arise from site registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Malformed `metadata.yml`. Carries the file path and serde_yaml's line context.
    #[error("failed to parse site metadata at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("site '{0}' is not registered")]
    SiteNotFound(String),

    #[error("proxy '{0}' is not registered")]
    ProxyNotFound(String),

    #[error("invalid proxy target '{0}': use <container>:<port>")]
    InvalidTarget(String),

    #[error("invalid site name '{0}': use lowercase letters, digits, '-' and '_' (max 63 chars)")]
    InvalidName(String),
}

/// Failures of the process runner itself. A command that ran and exited
/// non-zero is *not* an error here; see [`ProcessOutput::success`](crate::ProcessOutput::success).
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("I/O error while running `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The command exited non-zero; carries trimmed combined output.
    #[error("`{program}` failed (status {status}): {output}")]
    Failed {
        program: String,
        status: String,
        output: String,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RegistryError {
    RegistryError::Io {
        path: path.into(),
        source,
    }
}
