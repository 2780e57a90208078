//! Domain registration with boundary-triggered resolver engagement.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use srv_core::{Config, ProcessRunner};

use crate::dnsmasq;
use crate::domains::{normalize_domain, DomainRegistry};
use crate::error::DnsError;
use crate::resolver::{Resolver, SystemResolver};
use crate::server::{ComposeDnsServer, DnsServer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainChange {
    Added,
    Removed,
    /// Already in the requested state; nothing was written.
    Unchanged,
}

pub struct DnsManager {
    domains: DomainRegistry,
    dnsmasq_path: PathBuf,
    resolver: Arc<dyn Resolver>,
    server: Arc<dyn DnsServer>,
}

impl DnsManager {
    pub fn new(
        domains: DomainRegistry,
        dnsmasq_path: impl Into<PathBuf>,
        resolver: Arc<dyn Resolver>,
        server: Arc<dyn DnsServer>,
    ) -> Self {
        Self {
            domains,
            dnsmasq_path: dnsmasq_path.into(),
            resolver,
            server,
        }
    }

    /// Production wiring: system resolver, dnsmasq in the proxy compose stack.
    pub fn from_config(config: &Config, runner: Arc<dyn ProcessRunner>) -> Self {
        Self::new(
            DomainRegistry::new(config.local_domains_path()),
            config.dnsmasq_conf_path(),
            Arc::new(SystemResolver::new(runner.clone())),
            Arc::new(ComposeDnsServer::new(runner, config.proxy_dir.clone())),
        )
    }

    pub fn domains(&self) -> Result<BTreeSet<String>, DnsError> {
        self.domains.load()
    }

    pub fn resolver(&self) -> &dyn Resolver {
        self.resolver.as_ref()
    }

    /// Add `domain`. Engages the system resolver only when the set was empty
    /// before this call. A resolver failure leaves the domain registered and
    /// is returned as [`DnsError::ResolverFailed`].
    pub async fn register(&self, domain: &str) -> Result<DomainChange, DnsError> {
        let domain = normalize_domain(domain)?;
        let mut set = self.domains.load()?;
        let was_empty = set.is_empty();
        if !set.insert(domain.clone()) {
            tracing::debug!(domain = %domain, "domain already registered");
            return Ok(DomainChange::Unchanged);
        }

        self.commit(&set).await?;
        tracing::info!(domain = %domain, "registered local domain");

        if was_empty {
            match self.resolver.engage().await {
                Ok(change) => tracing::info!(?change, "system resolver engaged"),
                Err(err) => {
                    return Err(DnsError::ResolverFailed {
                        domain,
                        source: Box::new(err),
                    })
                }
            }
        }
        Ok(DomainChange::Added)
    }

    /// Remove `domain`. Disengages the system resolver only when the set
    /// becomes empty.
    pub async fn unregister(&self, domain: &str) -> Result<DomainChange, DnsError> {
        let domain = normalize_domain(domain)?;
        let mut set = self.domains.load()?;
        if !set.remove(&domain) {
            tracing::debug!(domain = %domain, "domain not registered");
            return Ok(DomainChange::Unchanged);
        }

        self.commit(&set).await?;
        tracing::info!(domain = %domain, "unregistered local domain");

        if set.is_empty() {
            match self.resolver.disengage().await {
                Ok(change) => tracing::info!(?change, "system resolver disengaged"),
                Err(err) => {
                    return Err(DnsError::ResolverFailed {
                        domain,
                        source: Box::new(err),
                    })
                }
            }
        }
        Ok(DomainChange::Removed)
    }

    /// Rewrite the dnsmasq config from the persisted set and reload the server.
    pub async fn refresh(&self) -> Result<(), DnsError> {
        let set = self.domains.load()?;
        dnsmasq::write_config(&self.dnsmasq_path, &set)?;
        self.server.reload().await?;
        Ok(())
    }

    async fn commit(&self, set: &BTreeSet<String>) -> Result<(), DnsError> {
        self.domains.save(set)?;
        dnsmasq::write_config(&self.dnsmasq_path, set)?;
        self.server.reload().await?;
        Ok(())
    }
}
