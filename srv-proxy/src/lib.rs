//! # srv-proxy
//!
//! Generates the reverse-proxy stack under `<root>/traefik`: the static and
//! dynamic proxy configs, the compose file for the proxy and DNS containers,
//! the dnsmasq config and the ACME store.
//!
//! The static config is never blindly overwritten. [`merge`] keeps the
//! sections a user may edit and resets the ones srv depends on. [`route`]
//! writes one file-provider route per proxy record.

pub mod email;
pub mod error;
pub mod merge;
pub mod route;
pub mod stack;
pub mod template;

pub use email::{load_email, save_email};
pub use error::ProxyError;
pub use merge::{merge_documents, MergeKind, MergeOutcome, SectionClass};
pub use route::{remove_route, render_route, write_route};
pub use stack::{diff_static_config, ensure_config, EnsureReport};
pub use template::{DnsCredentials, Templates};
