//! `srv dns` — local DNS diagnostics and repair.

use anyhow::{Context, Result};
use clap::Subcommand;

use srv_dns::{diagnostics, ComposeDnsServer, DnsManager, Resolver, ResolverChange};

use super::{block_on, load_config, system_runner};

#[derive(Subcommand, Debug)]
pub enum DnsCommand {
    /// Show the resolver strategy and whether local domains resolve.
    Status,
    /// List registered local domains.
    List,
    /// Rewrite the dnsmasq config, reload it and re-apply the system resolver.
    Refresh,
}

pub fn run(command: DnsCommand) -> Result<()> {
    let config = load_config()?;
    let runner = system_runner();
    let manager = DnsManager::from_config(&config, runner.clone());

    match command {
        DnsCommand::Status => block_on(async {
            let server = ComposeDnsServer::new(runner.clone(), config.proxy_dir.clone());
            let running = server.is_running().await;
            let status = diagnostics::status(runner.as_ref(), manager.resolver()).await;

            println!("Resolver:        {}", status.resolver);
            println!(
                "DNS container:   {}",
                if running { "running" } else { "not running" }
            );
            println!("Local server:    {}", status.local_server);
            println!("System resolver: {}", status.system_resolver);
        })?,
        DnsCommand::List => {
            let domains = manager.domains().context("failed to read local domains")?;
            if domains.is_empty() {
                println!("No local domains registered");
            }
            for domain in domains {
                println!("{domain}");
            }
        }
        DnsCommand::Refresh => block_on(async {
            manager.refresh().await.context("failed to refresh dnsmasq")?;
            println!("✓ dnsmasq config rewritten");

            let domains = manager.domains()?;
            let change = if domains.is_empty() {
                manager.resolver().disengage().await
            } else {
                manager.resolver().engage().await
            }
            .context("failed to update system resolver")?;
            match change {
                ResolverChange::Applied => println!("✓ System resolver configured"),
                ResolverChange::AlreadyConfigured => println!("✓ System resolver already configured"),
                ResolverChange::Removed => println!("✓ System resolver configuration removed"),
                ResolverChange::NotPresent => {}
            }
            Ok::<_, anyhow::Error>(())
        })??,
    }
    Ok(())
}
