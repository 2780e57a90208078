//! `srv site` — register, inspect, remove, list and run sites.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use srv_core::batch::run_batch;
use srv_core::constants::{COMPOSE_TIMEOUT, MAX_WORKERS, RUNTIME_BINARY, STATUS_TIMEOUT};
use srv_core::types::is_local_domain;
use srv_core::{
    Config, Invocation, ProcessRunner, Site, SiteKind, SiteMetadata, SiteName, SiteRegistry,
};
use srv_daemon::{AttachOutcome, NetworkBinder};
use srv_dns::{normalize_domain, DnsError, DnsManager, DomainChange};

use super::{block_on, load_config, system_runner};

const COMPOSE_FILES: [&str; 4] = [
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];

#[derive(Subcommand, Debug)]
pub enum SiteCommand {
    /// Register a project directory as a site.
    Add(AddArgs),
    /// Unregister a site and its local domain.
    Remove {
        name: String,
    },
    /// List registered sites.
    List,
    /// Show one site's configuration and container state.
    Info {
        name: String,
    },
    /// Start sites and attach their containers to the proxy network.
    Up(BatchArgs),
    /// Stop sites.
    Down(BatchArgs),
    /// Restart sites' compose services.
    Restart(BatchArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Project directory.
    pub path: PathBuf,

    /// Hostname the proxy routes to this site (e.g. myapp.test).
    #[arg(long, short = 'd')]
    pub domain: String,

    /// Site name. Defaults to the domain with dots replaced.
    #[arg(long, short = 'n')]
    pub name: Option<String>,

    /// Container name the proxy routes to.
    #[arg(long)]
    pub service: Option<String>,

    /// Compose service name used for compose commands. Defaults to --service.
    #[arg(long)]
    pub compose_service: Option<String>,

    /// Compose profile the service belongs to.
    #[arg(long)]
    pub profile: Option<String>,

    /// Container port.
    #[arg(long, short = 'p', default_value_t = 80)]
    pub port: u16,

    /// Serve the directory as static files instead of a compose project.
    #[arg(long = "static")]
    pub static_site: bool,

    /// Development domain served through local DNS.
    #[arg(long, short = 'l')]
    pub local: bool,

    /// Overwrite an existing site with the same name.
    #[arg(long, short = 'f')]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Sites to operate on.
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub names: Vec<String>,

    /// Operate on every registered site.
    #[arg(long, short = 'a')]
    pub all: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SiteAction {
    Up,
    Down,
    Restart,
}

pub fn run(command: SiteCommand) -> Result<()> {
    let config = load_config()?;
    let registry = SiteRegistry::new(config.sites_dir.clone());

    match command {
        SiteCommand::Add(args) => add(&config, &registry, args),
        SiteCommand::Remove { name } => remove(&config, &registry, &name),
        SiteCommand::List => list(&registry),
        SiteCommand::Info { name } => info(&registry, &name),
        SiteCommand::Up(args) => batch(&config, &registry, args, SiteAction::Up),
        SiteCommand::Down(args) => batch(&config, &registry, args, SiteAction::Down),
        SiteCommand::Restart(args) => batch(&config, &registry, args, SiteAction::Restart),
    }
}

fn add(config: &Config, registry: &SiteRegistry, args: AddArgs) -> Result<()> {
    let project_path = args
        .path
        .canonicalize()
        .with_context(|| format!("cannot resolve path '{}'", args.path.display()))?;
    let domain = normalize_domain(&args.domain)?;
    let name = match &args.name {
        Some(name) => SiteName::parse(name)?,
        None => SiteName::parse(&name_from_domain(&domain))?,
    };
    let previous = if registry.exists(&name) {
        if !args.force {
            bail!("site '{name}' already exists; use --force to overwrite");
        }
        registry.get(&name).ok()
    } else {
        None
    };

    let kind = if args.static_site || find_compose_file(&project_path).is_none() {
        SiteKind::Static
    } else {
        SiteKind::Compose
    };
    let service_name = args.service.unwrap_or_default();
    if kind == SiteKind::Compose && service_name.is_empty() {
        bail!("compose sites need --service <container name>");
    }
    let compose_service_name = args
        .compose_service
        .unwrap_or_else(|| service_name.clone());

    let meta = SiteMetadata {
        kind,
        domain: domain.clone(),
        project_path,
        service_name,
        compose_service_name,
        profile: args.profile.unwrap_or_default(),
        port: args.port,
        is_local: args.local,
        network_name: config.network_name.clone(),
    };
    registry
        .write(&name, &meta)
        .with_context(|| format!("failed to write site '{name}'"))?;
    println!("✓ Added {kind} site '{name}' ({domain})");

    let stale = previous.as_ref().and_then(|old| stale_domain(old, &meta));
    if stale.is_none() && !(args.local && is_local_domain(&domain)) {
        return Ok(());
    }
    let dns = DnsManager::from_config(config, system_runner());
    if let Some(old) = stale {
        report_domain_change(old, block_on(dns.unregister(old))?)?;
    }
    if args.local && is_local_domain(&domain) {
        report_domain_change(&domain, block_on(dns.register(&domain))?)?;
    }
    Ok(())
}

/// Local domain `old` registered that the replacement no longer does.
fn stale_domain<'a>(old: &'a Site, new: &SiteMetadata) -> Option<&'a str> {
    let was_registered = old.is_local && is_local_domain(&old.domain);
    let still_registered = new.is_local && new.domain == old.domain;
    (was_registered && !still_registered).then_some(old.domain.as_str())
}

fn remove(config: &Config, registry: &SiteRegistry, name: &str) -> Result<()> {
    let name = SiteName::parse(name)?;
    let site = registry
        .get(&name)
        .with_context(|| format!("failed to load site '{name}'"))?;

    if site.is_local && is_local_domain(&site.domain) {
        let dns = DnsManager::from_config(config, system_runner());
        report_domain_change(&site.domain, block_on(dns.unregister(&site.domain))?)?;
    }

    registry
        .remove(&name)
        .with_context(|| format!("failed to remove site '{name}'"))?;
    println!("✓ Removed site '{name}'");
    Ok(())
}

/// A resolver failure after the domain file changed is reported, not fatal.
pub(crate) fn report_domain_change(domain: &str, result: Result<DomainChange, DnsError>) -> Result<()> {
    match result {
        Ok(DomainChange::Added) => println!("✓ Registered local domain {domain}"),
        Ok(DomainChange::Removed) => println!("✓ Unregistered local domain {domain}"),
        Ok(DomainChange::Unchanged) => {}
        Err(err) if err.is_partial() => {
            println!("! {err}");
            println!("  Run `srv dns refresh` once the problem is fixed.");
        }
        Err(err) => return Err(err).context("failed to update local DNS"),
    }
    Ok(())
}

fn list(registry: &SiteRegistry) -> Result<()> {
    let sites = registry.list().context("failed to list sites")?;
    if sites.is_empty() {
        println!("No sites registered");
        return Ok(());
    }

    let width = sites.iter().map(|s| s.name.0.len()).max().unwrap_or(4).max(4);
    let domain_width = sites.iter().map(|s| s.domain.len()).max().unwrap_or(6).max(6);
    println!("{:<width$}  {:<domain_width$}  {:<7}  CONTAINER", "NAME", "DOMAIN", "TYPE");
    for site in &sites {
        println!(
            "{:<width$}  {:<domain_width$}  {:<7}  {}",
            site.name.0,
            site.domain,
            site.kind.to_string(),
            if site.container_name.is_empty() {
                "-"
            } else {
                site.container_name.as_str()
            },
        );
    }
    Ok(())
}

fn info(registry: &SiteRegistry, name: &str) -> Result<()> {
    let name = SiteName::parse(name)?;
    let site = registry
        .get(&name)
        .with_context(|| format!("failed to load site '{name}'"))?;
    let status = block_on(site_status(system_runner().as_ref(), &site))?;

    let or_dash = |value: &str| if value.is_empty() { "-".to_string() } else { value.to_string() };
    println!("Name:      {}", site.name);
    println!("Path:      {}", site.project_path.display());
    println!("Domain:    {}", site.domain);
    println!("Type:      {}", site.kind);
    if site.is_compose() {
        println!("Container: {}", or_dash(&site.container_name));
        println!("Service:   {}", or_dash(&site.compose_service));
        println!("Profile:   {}", or_dash(&site.profile));
        println!("Port:      {}", site.port);
    }
    println!("Local:     {}", if site.is_local { "yes" } else { "no" });
    println!("Status:    {status}");
    println!("URL:       https://{}", site.domain);
    Ok(())
}

/// `broken` when the project directory is gone, otherwise the container
/// state reported by the runtime.
async fn site_status(runner: &dyn ProcessRunner, site: &Site) -> String {
    if !site.project_path.is_dir() {
        return "broken (project directory missing)".into();
    }
    if !site.is_compose() {
        return "static".into();
    }
    if site.container_name.is_empty() || !runner.exists(RUNTIME_BINARY) {
        return "unknown".into();
    }
    let inv = Invocation::new(
        RUNTIME_BINARY,
        ["inspect", "-f", "{{.State.Status}}", site.container_name.as_str()],
    )
    .timeout(STATUS_TIMEOUT);
    match runner.run_quiet(&inv).await {
        Ok(out) if out.success() => out.stdout.trim().to_string(),
        Ok(_) => "not created".into(),
        Err(err) => {
            tracing::debug!(site = %site.name, error = %err, "container inspect failed");
            "unknown".into()
        }
    }
}

fn batch(config: &Config, registry: &SiteRegistry, args: BatchArgs, action: SiteAction) -> Result<()> {
    let sites = if args.all {
        registry.list().context("failed to list sites")?
    } else {
        args.names
            .iter()
            .map(|name| {
                let name = SiteName::parse(name)?;
                registry
                    .get(&name)
                    .with_context(|| format!("failed to load site '{name}'"))
            })
            .collect::<Result<Vec<_>>>()?
    };
    if sites.is_empty() {
        println!("No sites registered");
        return Ok(());
    }

    let runner = system_runner();
    if !runner.exists(RUNTIME_BINARY) {
        bail!("{RUNTIME_BINARY} is not installed");
    }
    let binder = Arc::new(NetworkBinder::new(runner.clone(), config.network_name.clone()));

    let results = block_on(run_batch(sites, MAX_WORKERS, move |site: Site| {
        let runner = runner.clone();
        let binder = binder.clone();
        async move { run_site(runner.as_ref(), &binder, &site, action).await }
    }))?;

    let mut failed = 0;
    for outcome in results {
        match outcome.result {
            Ok(message) => println!("✓ {}: {message}", outcome.item.name),
            Err(err) => {
                failed += 1;
                println!("✗ {}: {err:#}", outcome.item.name);
            }
        }
    }
    if failed > 0 {
        bail!("{failed} site(s) failed");
    }
    Ok(())
}

async fn run_site(
    runner: &dyn ProcessRunner,
    binder: &NetworkBinder,
    site: &Site,
    action: SiteAction,
) -> Result<String> {
    if !site.is_compose() {
        return Ok("static site, nothing to run".into());
    }

    let inv = compose_invocation(site, action);
    runner
        .run_checked(&inv)
        .await
        .with_context(|| format!("`{}` failed", inv.command_line()))?;

    match action {
        SiteAction::Down => return Ok("stopped".into()),
        SiteAction::Restart => return Ok("restarted".into()),
        SiteAction::Up => {}
    }
    if site.container_name.is_empty() {
        return Ok("started".into());
    }
    match binder.attach(&site.container_name).await {
        Ok(AttachOutcome::Attached) => Ok(format!("started, attached to {}", binder.network())),
        Ok(AttachOutcome::AlreadyAttached) => Ok("started".into()),
        Err(err) => {
            tracing::warn!(site = %site.name, error = %err, "network attach failed");
            Ok(format!("started, but could not attach to {}: {err}", binder.network()))
        }
    }
}

fn compose_invocation(site: &Site, action: SiteAction) -> Invocation {
    let mut args = vec!["compose".to_string()];
    if !site.profile.is_empty() {
        args.push("--profile".into());
        args.push(site.profile.clone());
    }
    match action {
        SiteAction::Up => args.extend(["up", "-d", "--remove-orphans"].map(String::from)),
        SiteAction::Down => args.push("stop".into()),
        SiteAction::Restart => args.push("restart".into()),
    }
    Invocation::new(RUNTIME_BINARY, args)
        .current_dir(site.project_path.clone())
        .timeout(COMPOSE_TIMEOUT)
}

fn find_compose_file(dir: &Path) -> Option<PathBuf> {
    COMPOSE_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

pub(crate) fn name_from_domain(domain: &str) -> String {
    domain
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}
