//! srv core library — configuration, site registry, process runner, shared helpers.
//!
//! Public API surface:
//! - [`config`] — explicit, reloadable [`Config`]
//! - [`registry`] — per-site YAML metadata (read / write / list)
//! - [`process`] — the [`ProcessRunner`] contract and its system implementation
//! - [`batch`] — bounded worker pool for multi-site operations
//! - [`fsutil`] — atomic writes

pub mod batch;
pub mod config;
pub mod constants;
pub mod error;
pub mod fsutil;
pub mod process;
pub mod registry;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use config::{Config, ConfigSource};
pub use error::{ConfigError, ProcessError, RegistryError};
pub use process::{Invocation, ProcessOutput, ProcessRunner, SystemRunner};
pub use registry::{ProxyRegistry, SiteRegistry, SiteSource};
pub use types::{ProxyMetadata, ProxyRecord, ProxyTarget, Site, SiteKind, SiteMetadata, SiteName};
