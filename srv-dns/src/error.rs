//! Error types for srv-dns.

use std::path::PathBuf;

use thiserror::Error;

use srv_core::ProcessError;

#[derive(Debug, Error)]
pub enum DnsError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("invalid domain '{0}'")]
    InvalidDomain(String),

    /// No supported resolver strategy was detected on this host.
    #[error(
        "unsupported DNS configuration; configure your system to use 127.0.0.1 for .test, .local and .localhost domains"
    )]
    UnsupportedResolver,

    /// The domain registry change was persisted but the system resolver
    /// step failed. Registry and resolver state may now disagree.
    #[error("domain '{domain}' updated but system resolver step failed: {source}")]
    ResolverFailed {
        domain: String,
        #[source]
        source: Box<DnsError>,
    },
}

impl DnsError {
    /// True when the domain registry change succeeded and only the resolver step failed.
    pub fn is_partial(&self) -> bool {
        matches!(self, DnsError::ResolverFailed { .. })
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DnsError {
    DnsError::Io {
        path: path.into(),
        source,
    }
}
