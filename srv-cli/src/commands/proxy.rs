//! `srv proxy` — the proxy stack configuration and standalone proxy records.

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use srv_core::constants::{RUNTIME_BINARY, STATUS_TIMEOUT};
use srv_core::types::is_local_domain;
use srv_core::{Config, Invocation, ProxyRecord, ProxyRegistry, ProxyTarget, SiteName};
use srv_daemon::NetworkBinder;
use srv_dns::{normalize_domain, DnsManager};
use srv_proxy::email::validate_email;
use srv_proxy::{
    diff_static_config, ensure_config, load_email, remove_route, write_route, ProxyError,
};

use super::site::{name_from_domain, report_domain_change};
use super::{block_on, load_config, system_runner};

#[derive(Subcommand, Debug)]
pub enum ProxyCommand {
    /// Rewrite the proxy stack files, keeping user-owned sections.
    Ensure,
    /// Show what `ensure` would change in the static config.
    Diff,
    /// Route a domain to a host port or a container without a site.
    Add(ProxyAddArgs),
    /// Remove a proxy record and its route.
    Remove { name: String },
    /// List proxy records.
    List,
}

#[derive(Args, Debug)]
pub struct ProxyAddArgs {
    /// Hostname to route (e.g. api.test).
    #[arg(long, short = 'd')]
    pub domain: String,

    /// Port on the host machine.
    #[arg(
        long,
        short = 'p',
        conflicts_with = "container",
        required_unless_present = "container",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub port: Option<u16>,

    /// Container and port as `<name>:<port>`.
    #[arg(long, short = 'c')]
    pub container: Option<String>,

    /// Record name. Defaults to the domain with dots replaced.
    #[arg(long, short = 'n')]
    pub name: Option<String>,

    /// Overwrite an existing record with the same name.
    #[arg(long, short = 'f')]
    pub force: bool,
}

pub fn run(command: ProxyCommand) -> Result<()> {
    let config = load_config()?;
    let registry = ProxyRegistry::new(config.proxies_dir());

    match command {
        ProxyCommand::Ensure => {
            let email = resolve_email(&config, None)?;
            let report =
                ensure_config(&config, &email).context("failed to write proxy configuration")?;
            println!(
                "✓ Proxy configuration written ({:?})",
                report.static_config
            );
        }
        ProxyCommand::Diff => {
            let email = resolve_email(&config, None)?;
            match diff_static_config(&config, &email).context("failed to compute proxy diff")? {
                Some(diff) => print!("{diff}"),
                None => println!("No changes for {}", config.static_config_path().display()),
            }
        }
        ProxyCommand::Add(args) => add(&config, &registry, args)?,
        ProxyCommand::Remove { name } => remove(&config, &registry, &name)?,
        ProxyCommand::List => list(&registry)?,
    }
    Ok(())
}

/// Explicit address if given, else the one saved by `srv init`.
pub(crate) fn resolve_email(config: &Config, explicit: Option<&str>) -> Result<String> {
    if let Some(email) = explicit {
        return Ok(validate_email(email)?.to_string());
    }
    load_email(&config.proxy_env_path())
        .context("failed to read saved ACME email")?
        .ok_or_else(|| ProxyError::MissingEmail.into())
}

fn add(config: &Config, registry: &ProxyRegistry, args: ProxyAddArgs) -> Result<()> {
    let domain = normalize_domain(&args.domain)?;
    let name = match &args.name {
        Some(name) => SiteName::parse(name)?,
        None => SiteName::parse(&name_from_domain(&domain))?,
    };
    let target = match (args.port, args.container.as_deref()) {
        (Some(port), None) => ProxyTarget::Localhost { port },
        (None, Some(raw)) => ProxyTarget::parse_container(raw)?,
        _ => bail!("pass exactly one of --port or --container"),
    };
    let previous = if registry.exists(&name) {
        if !args.force {
            bail!("proxy '{name}' already exists; use --force to overwrite");
        }
        registry.get(&name).ok()
    } else {
        None
    };

    if let Some(container) = target.container() {
        attach_container(config, container)?;
    }

    let record = ProxyRecord {
        name,
        domain,
        target,
    };
    registry
        .write(&record)
        .with_context(|| format!("failed to write proxy '{}'", record.name))?;
    write_route(config, &record).context("failed to write proxy route")?;
    println!(
        "✓ Added proxy '{}' ({} -> {})",
        record.name, record.domain, record.target
    );

    let stale = previous
        .as_ref()
        .map(|old| old.domain.as_str())
        .filter(|old| is_local_domain(old) && *old != record.domain);
    let register = is_local_domain(&record.domain);
    if stale.is_none() && !register {
        return Ok(());
    }
    let dns = DnsManager::from_config(config, system_runner());
    if let Some(old) = stale {
        report_domain_change(old, block_on(dns.unregister(old))?)?;
    }
    if register {
        report_domain_change(&record.domain, block_on(dns.register(&record.domain))?)?;
    }
    Ok(())
}

/// The container must exist; it is put on the shared network so the proxy
/// can reach it by name.
fn attach_container(config: &Config, container: &str) -> Result<()> {
    let runner = system_runner();
    if !runner.exists(RUNTIME_BINARY) {
        bail!("{RUNTIME_BINARY} is not installed");
    }
    let binder = NetworkBinder::new(runner.clone(), config.network_name.clone());
    block_on(async {
        let inspect = Invocation::new(RUNTIME_BINARY, ["inspect", container]).timeout(STATUS_TIMEOUT);
        if !runner.run_quiet(&inspect).await?.success() {
            bail!("container '{container}' not found");
        }
        binder.ensure_network().await?;
        binder
            .attach(container)
            .await
            .with_context(|| format!("failed to attach {container} to {}", binder.network()))?;
        Ok(())
    })?
}

fn remove(config: &Config, registry: &ProxyRegistry, name: &str) -> Result<()> {
    let name = SiteName::parse(name)?;
    let record = registry
        .get(&name)
        .with_context(|| format!("failed to load proxy '{name}'"))?;

    remove_route(config, &name).context("failed to remove proxy route")?;
    registry
        .remove(&name)
        .with_context(|| format!("failed to remove proxy '{name}'"))?;
    println!("✓ Removed proxy '{name}'");

    if is_local_domain(&record.domain) {
        let dns = DnsManager::from_config(config, system_runner());
        report_domain_change(&record.domain, block_on(dns.unregister(&record.domain))?)?;
    }
    Ok(())
}

fn list(registry: &ProxyRegistry) -> Result<()> {
    let records = registry.list().context("failed to list proxies")?;
    if records.is_empty() {
        println!("No proxies configured");
        return Ok(());
    }

    let width = records.iter().map(|r| r.name.0.len()).max().unwrap_or(4).max(4);
    let domain_width = records.iter().map(|r| r.domain.len()).max().unwrap_or(6).max(6);
    let targets: Vec<String> = records.iter().map(|r| r.target.to_string()).collect();
    let target_width = targets.iter().map(String::len).max().unwrap_or(6).max(6);
    println!(
        "{:<width$}  {:<domain_width$}  {:<target_width$}  TYPE",
        "NAME", "DOMAIN", "TARGET"
    );
    for (record, target) in records.iter().zip(&targets) {
        println!(
            "{:<width$}  {:<domain_width$}  {:<target_width$}  {}",
            record.name.0,
            record.domain,
            target,
            record.target.kind(),
        );
    }
    Ok(())
}
