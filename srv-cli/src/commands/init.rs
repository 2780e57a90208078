//! `srv init [--email <address>]`

use anyhow::{Context, Result};
use clap::Args;

use srv_core::constants::{COMPOSE_TIMEOUT, RUNTIME_BINARY};
use srv_core::Invocation;
use srv_daemon::NetworkBinder;
use srv_proxy::{ensure_config, save_email, MergeKind};

use super::{block_on, load_config, proxy::resolve_email, system_runner};

/// Write the proxy stack configuration and create the shared network.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// ACME contact address for certificate issuance. Defaults to the
    /// address saved by a previous `srv init`.
    #[arg(long, short = 'e')]
    pub email: Option<String>,

    /// Only write configuration; do not touch the container runtime.
    #[arg(long)]
    pub no_start: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let config = load_config()?;
        let email = resolve_email(&config, self.email.as_deref())?;
        save_email(&config.proxy_env_path(), &email).context("failed to save ACME email")?;

        let report = ensure_config(&config, &email).context("failed to write proxy configuration")?;
        match report.static_config {
            MergeKind::Fresh => println!("✓ Created {}", config.static_config_path().display()),
            MergeKind::Merged => println!("✓ Updated {}", config.static_config_path().display()),
            MergeKind::Replaced => println!(
                "! Replaced unreadable {}",
                config.static_config_path().display()
            ),
        }
        if report.acme_created {
            println!("✓ Created {}", config.acme_path().display());
        }

        if self.no_start {
            return Ok(());
        }

        let runner = system_runner();
        if !runner.exists(RUNTIME_BINARY) {
            println!("! {RUNTIME_BINARY} not found; skipping network and proxy start");
            return Ok(());
        }

        block_on(async {
            let binder = NetworkBinder::new(runner.clone(), config.network_name.clone());
            binder
                .ensure_network()
                .await
                .with_context(|| format!("failed to create network '{}'", config.network_name))?;
            println!("✓ Network '{}' ready", config.network_name);

            let up = Invocation::new(RUNTIME_BINARY, ["compose", "up", "-d"])
                .current_dir(&config.proxy_dir)
                .timeout(COMPOSE_TIMEOUT);
            runner
                .run_checked(&up)
                .await
                .context("failed to start proxy stack")?;
            println!("✓ Proxy stack started");
            Ok::<_, anyhow::Error>(())
        })?
    }
}
