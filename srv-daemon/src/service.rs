//! Background service management, one implementation per service manager.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use srv_core::ProcessRunner;

use crate::error::{io_err, DaemonError};
use crate::launchd::LaunchdAgent;
use crate::systemd::SystemdUserService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    SystemdUser,
    Launchd,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::SystemdUser => f.write_str("systemd user service"),
            ServiceKind::Launchd => f.write_str("launchd agent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub active: bool,
    /// Service manager's own wording, e.g. `active`, `inactive`, `not loaded`.
    pub detail: String,
}

impl ServiceStatus {
    pub fn inactive(detail: impl Into<String>) -> Self {
        Self {
            active: false,
            detail: detail.into(),
        }
    }
}

#[async_trait]
pub trait ServiceManager: Send + Sync {
    fn kind(&self) -> ServiceKind;

    /// Where the unit/agent manifest lives.
    fn manifest_path(&self) -> PathBuf;

    fn is_installed(&self) -> bool {
        self.manifest_path().exists()
    }

    /// Write the manifest for `executable` and start the service. Reinstalling
    /// over an existing manifest replaces it.
    async fn install(&self, executable: &Path) -> Result<PathBuf, DaemonError>;

    /// Stop the service and remove the manifest. Missing pieces are ignored.
    async fn uninstall(&self) -> Result<(), DaemonError>;

    async fn restart(&self) -> Result<(), DaemonError>;

    async fn stop(&self) -> Result<(), DaemonError>;

    /// Never fails; an unreachable service manager reports inactive.
    async fn status(&self) -> ServiceStatus;
}

/// Service manager for this platform. The installed service runs with
/// `SRV_ROOT` set to `root`.
pub fn detect_service_manager(
    runner: Arc<dyn ProcessRunner>,
    home: &Path,
    root: &Path,
    logs_dir: &Path,
) -> Result<Box<dyn ServiceManager>, DaemonError> {
    match std::env::consts::OS {
        "linux" => Ok(Box::new(
            SystemdUserService::new(runner, home, root, logs_dir)
                .with_user(std::env::var("USER").ok()),
        )),
        "macos" => Ok(Box::new(LaunchdAgent::new(runner, home, root, logs_dir))),
        other => Err(DaemonError::UnsupportedPlatform(other.to_string())),
    }
}

/// Absolute, symlink-free path of the running binary.
pub fn current_executable() -> Result<PathBuf, DaemonError> {
    let exe = std::env::current_exe().map_err(|e| io_err("current executable", e))?;
    std::fs::canonicalize(&exe).map_err(|e| io_err(&exe, e))
}
