//! srv — local development sites behind a shared reverse proxy.
//!
//! # Usage
//!
//! ```text
//! srv init --email <address>
//! srv site add <path> --domain <domain> [--name N] [--service C] [--compose-service S] [--profile P] [--port N] [--static] [--local]
//! srv site remove <name>
//! srv site list
//! srv site info <name>
//! srv site up|down|restart [<name>...] [--all]
//! srv dns status|list|refresh
//! srv proxy ensure|diff
//! srv proxy add --domain <domain> (--port N | --container NAME:PORT) [--name N] [--force]
//! srv proxy remove <name>
//! srv proxy list
//! srv doctor
//! srv daemon start [--foreground]|stop|restart|status|install|uninstall|logs
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, dns::DnsCommand, init::InitArgs, proxy::ProxyCommand,
    site::SiteCommand,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "srv",
    version,
    about = "Run local sites behind a shared reverse proxy with local DNS",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the proxy stack configuration and create the shared network.
    Init(InitArgs),

    /// Register, remove and run sites.
    Site {
        #[command(subcommand)]
        command: SiteCommand,
    },

    /// Inspect and refresh local DNS for development domains.
    Dns {
        #[command(subcommand)]
        command: DnsCommand,
    },

    /// Proxy stack configuration and standalone proxy routes.
    Proxy {
        #[command(subcommand)]
        command: ProxyCommand,
    },

    /// Manage the background network watcher and its system service.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Check the container runtime, network, proxy and local DNS.
    Doctor,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Site { command } => commands::site::run(command),
        Commands::Dns { command } => commands::dns::run(command),
        Commands::Proxy { command } => commands::proxy::run(command),
        Commands::Daemon { command } => commands::daemon::run(command),
        Commands::Doctor => commands::doctor::run(),
    }
}
