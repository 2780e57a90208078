//! # srv-dns
//!
//! Local development DNS: the persisted domain registry, the dnsmasq
//! configuration synthesized from it, and the OS resolver adapter that routes
//! local TLD queries to dnsmasq.
//!
//! [`DnsManager`] ties them together. System-wide resolver configuration is
//! engaged when the first domain is registered and disengaged when the last
//! one is removed.

pub mod diagnostics;
pub mod dnsmasq;
pub mod domains;
pub mod error;
pub mod manager;
pub mod resolver;
pub mod server;

pub use domains::{normalize_domain, DomainRegistry};
pub use error::DnsError;
pub use manager::{DnsManager, DomainChange};
pub use resolver::{Resolver, ResolverChange, ResolverKind, ResolverPaths, SystemResolver};
pub use server::{ComposeDnsServer, DnsServer};
