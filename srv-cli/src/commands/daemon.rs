//! `srv daemon` — background watcher lifecycle and service management.

use std::fs::OpenOptions;
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use srv_core::{Config, Invocation, ProcessRunner};
use srv_daemon::paths::{stderr_log_path, stdout_log_path};
use srv_daemon::{current_executable, detect_service_manager, start_blocking, ServiceManager};

use super::{block_on, load_config, system_runner};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Start the daemon through its service, or as a detached process.
    Start(DaemonStartArgs),
    /// Stop the daemon service.
    Stop,
    /// Restart the daemon service.
    Restart,
    /// Show service installation and run state.
    Status,
    /// Install and start the daemon as a per-user system service.
    Install,
    /// Stop and remove the daemon service.
    Uninstall,
    /// Print recent daemon log lines.
    Logs(DaemonLogsArgs),
}

#[derive(Args, Debug)]
pub struct DaemonStartArgs {
    /// Run in the foreground instead of detaching.
    #[arg(long, short = 'f')]
    pub foreground: bool,
}

#[derive(Args, Debug)]
pub struct DaemonLogsArgs {
    /// Number of trailing lines to show.
    #[arg(long, short = 'n', default_value_t = 50)]
    pub tail: usize,

    /// Keep printing as the log grows.
    #[arg(long, short = 'f')]
    pub follow: bool,

    /// Show the stderr log instead of stdout.
    #[arg(long)]
    pub stderr: bool,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let config = load_config()?;
    let home = dirs::home_dir().context("could not determine home directory")?;
    let logs_dir = config.logs_dir();
    let runner = system_runner();

    if let DaemonCommand::Start(DaemonStartArgs { foreground: true }) = command {
        let service = detect_service_manager(runner, &home, &config.root, &logs_dir).ok();
        return start_blocking(config, service).context("daemon exited with error");
    }

    let service = detect_service_manager(runner.clone(), &home, &config.root, &logs_dir)
        .context("no service manager for this platform")?;

    match command {
        DaemonCommand::Start(_) => start_detached(&config, service.as_ref())?,
        DaemonCommand::Stop => {
            if !service.is_installed() {
                println!("daemon service is not installed");
                return Ok(());
            }
            block_on(service.stop())?.context("failed to stop daemon")?;
            println!("✓ Daemon stopped");
        }
        DaemonCommand::Restart => {
            if !service.is_installed() {
                bail!("daemon service is not installed; run `srv daemon install`");
            }
            block_on(service.restart())?.context("failed to restart daemon")?;
            println!("✓ Daemon restarted");
        }
        DaemonCommand::Status => {
            if service.is_installed() {
                let status = block_on(service.status())?;
                println!("Service:  installed ({}, {})", service.kind(), status.detail);
                println!("Location: {}", service.manifest_path().display());
                if status.active {
                    println!("Daemon is running");
                } else {
                    println!("Daemon is not running");
                }
            } else {
                println!("Service:  not installed");
            }
            println!("Log file: {}", stdout_log_path(&logs_dir).display());
        }
        DaemonCommand::Install => {
            let exe = current_executable().context("cannot resolve srv executable")?;
            let path = block_on(service.install(&exe))?
                .with_context(|| format!("failed to install {}", service.kind()))?;
            println!("✓ Installed {}: {}", service.kind(), path.display());
        }
        DaemonCommand::Uninstall => {
            block_on(service.uninstall())?
                .with_context(|| format!("failed to uninstall {}", service.kind()))?;
            println!("✓ Uninstalled {}", service.kind());
        }
        DaemonCommand::Logs(args) => {
            let path = if args.stderr {
                stderr_log_path(&logs_dir)
            } else {
                stdout_log_path(&logs_dir)
            };
            if !path.exists() {
                println!("log file not found: {}", path.display());
                return Ok(());
            }
            let inv = tail_invocation(&path, args.tail, args.follow);
            block_on(runner.run(&inv))?.with_context(|| format!("failed to read {}", path.display()))?;
        }
    }

    Ok(())
}

/// Prefer the installed service; otherwise re-exec ourselves in the
/// background with output appended to the daemon logs.
fn start_detached(config: &Config, service: &dyn ServiceManager) -> Result<()> {
    if service.is_installed() {
        if block_on(service.status())?.active {
            println!("Daemon is already running");
            return Ok(());
        }
        block_on(service.restart())?.context("failed to start daemon service")?;
        println!("✓ Daemon started ({})", service.kind());
        return Ok(());
    }

    let logs_dir = config.logs_dir();
    std::fs::create_dir_all(&logs_dir)
        .with_context(|| format!("create {}", logs_dir.display()))?;
    let stdout = append(&stdout_log_path(&logs_dir))?;
    let stderr = append(&stderr_log_path(&logs_dir))?;

    let exe = current_executable().context("cannot resolve srv executable")?;
    let mut cmd = Command::new(&exe);
    cmd.args(["daemon", "start", "--foreground"])
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    let child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn {}", exe.display()))?;

    println!("✓ Daemon started (PID {})", child.id());
    println!("  Log file: {}", stdout_log_path(&logs_dir).display());
    Ok(())
}

fn append(path: &Path) -> Result<std::fs::File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))
}

fn tail_invocation(path: &Path, lines: usize, follow: bool) -> Invocation {
    let mut args = vec!["-n".to_string(), lines.to_string()];
    if follow {
        args.push("-f".into());
    }
    args.push(path.display().to_string());
    Invocation::new("tail", args)
}
