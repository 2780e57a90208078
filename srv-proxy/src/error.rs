//! Error types for srv-proxy.

use std::path::PathBuf;

use thiserror::Error;

use srv_dns::DnsError;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("template engine error: {0}")]
    Template(#[from] tera::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("proxy config I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Dns(#[from] DnsError),

    #[error("invalid email address '{0}'")]
    InvalidEmail(String),

    #[error("no ACME email configured; run `srv init --email <address>`")]
    MissingEmail,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ProxyError {
    ProxyError::Io {
        path: path.into(),
        source,
    }
}
