//! `srv doctor` — host health checks.

use anyhow::{bail, Context, Result};

use srv_dns::{diagnostics, DnsManager, Resolver};

use super::{block_on, load_config, system_runner};

pub fn run() -> Result<()> {
    let config = load_config()?;
    let runner = system_runner();
    let dns = DnsManager::from_config(&config, runner.clone());
    let domains = dns.domains().context("failed to read local domains")?;

    let checks = block_on(diagnostics::doctor(
        runner.as_ref(),
        dns.resolver().detect(),
        &config.network_name,
        &domains,
    ))?;

    for check in &checks {
        let mark = if check.ok { "✓" } else { "✗" };
        println!("{mark} {:<11} {}", check.name, check.detail);
    }
    let failed = checks.iter().filter(|c| !c.ok).count();
    if failed > 0 {
        bail!("{failed} check(s) failed");
    }
    println!("All checks passed");
    Ok(())
}
