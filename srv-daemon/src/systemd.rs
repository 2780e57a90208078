//! systemd user unit for Linux.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use srv_core::process::advisory;
use srv_core::{fsutil, Invocation, ProcessRunner};

use crate::error::{io_err, DaemonError};
use crate::paths::{stderr_log_path, stdout_log_path, systemd_unit_path, SYSTEMD_UNIT};
use crate::service::{ServiceKind, ServiceManager, ServiceStatus};

/// Render the unit file for `executable`. `root` is exported as `SRV_ROOT`
/// so the daemon reads the same registry as the CLI that installed it.
pub fn generate_unit(executable: &Path, home: &Path, root: &Path, logs_dir: &Path) -> String {
    let exe = executable.display();
    let home_str = home.display();
    format!(
        "[Unit]
Description=srv daemon - container network connector
After=docker.service
Wants=docker.service

[Service]
Type=simple
ExecStart={exe} daemon start --foreground
Restart=on-failure
RestartSec=5
Environment=HOME={home_str}
Environment=SRV_ROOT={root}
StandardOutput=append:{stdout}
StandardError=append:{stderr}

[Install]
WantedBy=default.target
",
        root = root.display(),
        stdout = stdout_log_path(logs_dir).display(),
        stderr = stderr_log_path(logs_dir).display(),
    )
}

pub struct SystemdUserService {
    runner: Arc<dyn ProcessRunner>,
    home: PathBuf,
    root: PathBuf,
    logs_dir: PathBuf,
    user: Option<String>,
}

impl SystemdUserService {
    pub fn new(runner: Arc<dyn ProcessRunner>, home: &Path, root: &Path, logs_dir: &Path) -> Self {
        Self {
            runner,
            home: home.to_path_buf(),
            root: root.to_path_buf(),
            logs_dir: logs_dir.to_path_buf(),
            user: None,
        }
    }

    /// Login name for `loginctl enable-linger`; skipped when `None`.
    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user.filter(|u| !u.is_empty());
        self
    }

    fn systemctl(args: &[&str]) -> Invocation {
        let mut all = vec!["--user"];
        all.extend_from_slice(args);
        Invocation::new("systemctl", all)
    }
}

#[async_trait]
impl ServiceManager for SystemdUserService {
    fn kind(&self) -> ServiceKind {
        ServiceKind::SystemdUser
    }

    fn manifest_path(&self) -> PathBuf {
        systemd_unit_path(&self.home)
    }

    async fn install(&self, executable: &Path) -> Result<PathBuf, DaemonError> {
        std::fs::create_dir_all(&self.logs_dir).map_err(|e| io_err(&self.logs_dir, e))?;

        let unit = self.manifest_path();
        fsutil::atomic_write(&unit, generate_unit(executable, &self.home, &self.root, &self.logs_dir))
            .map_err(|e| io_err(&unit, e))?;
        tracing::info!(path = %unit.display(), "wrote systemd unit");

        self.runner.run_checked(&Self::systemctl(&["daemon-reload"])).await?;
        self.runner
            .run_checked(&Self::systemctl(&["enable", SYSTEMD_UNIT]))
            .await?;
        self.runner
            .run_checked(&Self::systemctl(&["restart", SYSTEMD_UNIT]))
            .await?;

        // Keeps the user manager alive without an open session.
        if let Some(user) = &self.user {
            advisory(
                self.runner.as_ref(),
                &Invocation::new("loginctl", ["enable-linger", user.as_str()]),
            )
            .await;
        }
        Ok(unit)
    }

    async fn uninstall(&self) -> Result<(), DaemonError> {
        advisory(self.runner.as_ref(), &Self::systemctl(&["stop", SYSTEMD_UNIT])).await;
        advisory(self.runner.as_ref(), &Self::systemctl(&["disable", SYSTEMD_UNIT])).await;

        let unit = self.manifest_path();
        fsutil::remove_if_exists(&unit).map_err(|e| io_err(&unit, e))?;

        advisory(self.runner.as_ref(), &Self::systemctl(&["daemon-reload"])).await;
        Ok(())
    }

    async fn restart(&self) -> Result<(), DaemonError> {
        self.runner
            .run_checked(&Self::systemctl(&["restart", SYSTEMD_UNIT]))
            .await?;
        Ok(())
    }

    async fn stop(&self) -> Result<(), DaemonError> {
        self.runner
            .run_checked(&Self::systemctl(&["stop", SYSTEMD_UNIT]))
            .await?;
        Ok(())
    }

    async fn status(&self) -> ServiceStatus {
        match self
            .runner
            .run_quiet(&Self::systemctl(&["is-active", SYSTEMD_UNIT]))
            .await
        {
            Ok(out) if out.success() => {
                let detail = out.stdout.trim().to_string();
                ServiceStatus {
                    active: detail == "active",
                    detail,
                }
            }
            _ => ServiceStatus::inactive("inactive"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use srv_core::testing::RecordingRunner;
    use srv_core::ProcessOutput;
    use tempfile::TempDir;

    fn service(dir: &TempDir, runner: &Arc<RecordingRunner>) -> SystemdUserService {
        SystemdUserService::new(
            runner.clone(),
            &dir.path().join("home"),
            &dir.path().join("srv"),
            &dir.path().join("srv/logs"),
        )
        .with_user(Some("dev".into()))
    }

    #[test]
    fn unit_runs_foreground_daemon_with_restart_policy() {
        let unit = generate_unit(
            Path::new("/usr/local/bin/srv"),
            Path::new("/home/dev"),
            Path::new("/home/dev/.config/srv"),
            Path::new("/home/dev/.config/srv/logs"),
        );
        assert!(unit.contains("ExecStart=/usr/local/bin/srv daemon start --foreground\n"));
        assert!(unit.contains("After=docker.service\n"));
        assert!(unit.contains("Restart=on-failure\nRestartSec=5\n"));
        assert!(unit.contains("Environment=HOME=/home/dev\n"));
        assert!(unit.contains("Environment=SRV_ROOT=/home/dev/.config/srv\n"));
        assert!(unit.contains("StandardOutput=append:/home/dev/.config/srv/logs/daemon.log\n"));
        assert!(unit.contains("WantedBy=default.target\n"));
    }

    #[test]
    fn unit_pins_a_custom_root() {
        let unit = generate_unit(
            Path::new("/usr/local/bin/srv"),
            Path::new("/home/dev"),
            Path::new("/data/srv-alt"),
            Path::new("/data/srv-alt/logs"),
        );
        assert!(unit.contains("Environment=SRV_ROOT=/data/srv-alt\n"));
        assert!(!unit.contains("XDG_CONFIG_HOME"));
    }

    #[tokio::test]
    async fn install_writes_unit_then_enables_and_starts() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let svc = service(&dir, &runner);

        let path = svc.install(Path::new("/opt/srv")).await.unwrap();
        assert!(path.ends_with(".config/systemd/user/srv-daemon.service"));
        assert!(svc.is_installed());
        let unit = std::fs::read_to_string(&path).unwrap();
        let root_line = format!("Environment=SRV_ROOT={}\n", dir.path().join("srv").display());
        assert!(unit.contains(&root_line), "{unit}");
        assert_eq!(
            runner.command_lines(),
            vec![
                "systemctl --user daemon-reload",
                "systemctl --user enable srv-daemon.service",
                "systemctl --user restart srv-daemon.service",
                "loginctl enable-linger dev",
            ]
        );
    }

    #[tokio::test]
    async fn linger_failure_does_not_fail_install() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.respond("loginctl", ProcessOutput::failed(1, "Access denied"));
        assert!(service(&dir, &runner).install(Path::new("/opt/srv")).await.is_ok());
    }

    #[tokio::test]
    async fn uninstall_ignores_stop_failures_and_missing_unit() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.respond("systemctl --user stop", ProcessOutput::failed(5, "not loaded"));
        let svc = service(&dir, &runner);

        svc.uninstall().await.unwrap();
        assert!(!svc.is_installed());
        assert_eq!(runner.count("systemctl --user daemon-reload"), 1);
    }

    #[tokio::test]
    async fn status_maps_failures_to_inactive() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.respond("systemctl --user is-active", ProcessOutput::ok("active\n"));
        let svc = service(&dir, &runner);
        assert!(svc.status().await.active);

        runner.respond("systemctl --user is-active", ProcessOutput::failed(3, "inactive"));
        assert_eq!(svc.status().await, ServiceStatus::inactive("inactive"));
    }
}
