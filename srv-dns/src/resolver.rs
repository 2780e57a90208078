//! OS resolver adapter.
//!
//! Routes queries for the local TLDs to the dnsmasq instance on loopback.
//! One strategy is picked per operation by probing, in order: the
//! systemd-resolved stub file, the platform identifier, then `nmcli` on
//! `PATH`. Every file this module writes starts with [`MANAGED_MARKER`];
//! removal never touches a file without it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use srv_core::constants::{LOCALHOST_IP, LOCAL_TLDS};
use srv_core::{Invocation, ProcessRunner};

use crate::error::{io_err, DnsError};

pub const MANAGED_MARKER: &str = "# managed by srv";

const SYSTEMD_STUB: &str = "/run/systemd/resolve/stub-resolv.conf";
const SYSTEMD_DROPIN: &str = "/etc/systemd/resolved.conf.d/srv-local.conf";
const MACOS_RESOLVER_DIR: &str = "/etc/resolver";
const NM_DNSMASQ_CONF: &str = "/etc/NetworkManager/dnsmasq.d/srv-local.conf";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverKind {
    SystemdResolved,
    MacOs,
    NetworkManager,
    Unsupported,
}

impl fmt::Display for ResolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolverKind::SystemdResolved => "systemd-resolved",
            ResolverKind::MacOs => "macOS resolver",
            ResolverKind::NetworkManager => "NetworkManager",
            ResolverKind::Unsupported => "unsupported",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverChange {
    Applied,
    /// Marker already present with the expected content.
    AlreadyConfigured,
    Removed,
    /// Nothing of ours to remove.
    NotPresent,
}

/// Where each strategy looks and writes. Tests point these into a tempdir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverPaths {
    pub systemd_stub: PathBuf,
    pub systemd_dropin: PathBuf,
    pub macos_resolver_dir: PathBuf,
    pub nm_dnsmasq_conf: PathBuf,
}

impl Default for ResolverPaths {
    fn default() -> Self {
        Self {
            systemd_stub: PathBuf::from(SYSTEMD_STUB),
            systemd_dropin: PathBuf::from(SYSTEMD_DROPIN),
            macos_resolver_dir: PathBuf::from(MACOS_RESOLVER_DIR),
            nm_dnsmasq_conf: PathBuf::from(NM_DNSMASQ_CONF),
        }
    }
}

impl ResolverPaths {
    /// Same layout rooted at `root` instead of `/`.
    pub fn under(root: &Path) -> Self {
        let rebase = |p: &str| root.join(p.trim_start_matches('/'));
        Self {
            systemd_stub: rebase(SYSTEMD_STUB),
            systemd_dropin: rebase(SYSTEMD_DROPIN),
            macos_resolver_dir: rebase(MACOS_RESOLVER_DIR),
            nm_dnsmasq_conf: rebase(NM_DNSMASQ_CONF),
        }
    }
}

#[async_trait]
pub trait Resolver: Send + Sync {
    fn detect(&self) -> ResolverKind;

    async fn apply(&self, kind: ResolverKind) -> Result<ResolverChange, DnsError>;

    async fn remove(&self, kind: ResolverKind) -> Result<ResolverChange, DnsError>;

    async fn engage(&self) -> Result<ResolverChange, DnsError> {
        match self.detect() {
            ResolverKind::Unsupported => Err(DnsError::UnsupportedResolver),
            kind => self.apply(kind).await,
        }
    }

    /// Nothing to undo on an unsupported host.
    async fn disengage(&self) -> Result<ResolverChange, DnsError> {
        match self.detect() {
            ResolverKind::Unsupported => Ok(ResolverChange::NotPresent),
            kind => self.remove(kind).await,
        }
    }
}

pub struct SystemResolver {
    runner: Arc<dyn ProcessRunner>,
    paths: ResolverPaths,
    platform: String,
    privileged: bool,
}

impl SystemResolver {
    /// Real system paths; writes go through `sudo`.
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            paths: ResolverPaths::default(),
            platform: std::env::consts::OS.to_string(),
            privileged: true,
        }
    }

    /// Custom paths written directly, without `sudo`.
    pub fn with_paths(runner: Arc<dyn ProcessRunner>, paths: ResolverPaths) -> Self {
        Self {
            runner,
            paths,
            platform: std::env::consts::OS.to_string(),
            privileged: false,
        }
    }

    /// Override the platform identifier used during detection.
    pub fn platform(mut self, os: impl Into<String>) -> Self {
        self.platform = os.into();
        self
    }

    pub fn paths(&self) -> &ResolverPaths {
        &self.paths
    }

    /// Files and contents a strategy owns.
    fn markers(&self, kind: ResolverKind) -> Vec<(PathBuf, String)> {
        match kind {
            ResolverKind::SystemdResolved => {
                let domains = LOCAL_TLDS
                    .iter()
                    .map(|tld| format!("~{tld}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                vec![(
                    self.paths.systemd_dropin.clone(),
                    format!("{MANAGED_MARKER}\n[Resolve]\nDNS={LOCALHOST_IP}\nDomains={domains}\n"),
                )]
            }
            ResolverKind::MacOs => LOCAL_TLDS
                .iter()
                .map(|tld| {
                    (
                        self.paths.macos_resolver_dir.join(tld),
                        format!("{MANAGED_MARKER}\nnameserver {LOCALHOST_IP}\n"),
                    )
                })
                .collect(),
            ResolverKind::NetworkManager => {
                let mut body = format!("{MANAGED_MARKER}\n");
                for tld in LOCAL_TLDS {
                    body.push_str(&format!("server=/{tld}/{LOCALHOST_IP}\n"));
                }
                vec![(self.paths.nm_dnsmasq_conf.clone(), body)]
            }
            ResolverKind::Unsupported => Vec::new(),
        }
    }

    fn restart_command(kind: ResolverKind) -> Option<Invocation> {
        match kind {
            ResolverKind::SystemdResolved => Some(Invocation::sudo(
                "systemctl",
                ["restart", "systemd-resolved"],
            )),
            ResolverKind::MacOs => Some(Invocation::sudo("killall", ["-HUP", "mDNSResponder"])),
            ResolverKind::NetworkManager => {
                Some(Invocation::sudo("systemctl", ["restart", "NetworkManager"]))
            }
            ResolverKind::Unsupported => None,
        }
    }

    async fn restart(&self, kind: ResolverKind) -> Result<(), DnsError> {
        if let Some(inv) = Self::restart_command(kind) {
            tracing::info!(resolver = %kind, "restarting resolver service");
            self.runner.run_checked(&inv).await?;
        }
        Ok(())
    }

    async fn write_file(&self, path: &Path, contents: &str) -> Result<(), DnsError> {
        let parent = path.parent().unwrap_or_else(|| Path::new("/"));
        if self.privileged {
            let dir = parent.to_string_lossy().into_owned();
            self.runner
                .run_checked(&Invocation::sudo("mkdir", ["-p", dir.as_str()]))
                .await?;
            let target = path.to_string_lossy().into_owned();
            self.runner
                .run_checked(&Invocation::sudo("tee", [target]).stdin(contents))
                .await?;
            Ok(())
        } else {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            std::fs::write(path, contents).map_err(|e| io_err(path, e))
        }
    }

    async fn delete_file(&self, path: &Path) -> Result<(), DnsError> {
        if self.privileged {
            let target = path.to_string_lossy().into_owned();
            self.runner
                .run_checked(&Invocation::sudo("rm", ["-f".to_string(), target]))
                .await?;
            Ok(())
        } else {
            srv_core::fsutil::remove_if_exists(path)
                .map(|_| ())
                .map_err(|e| io_err(path, e))
        }
    }
}

fn read_existing(path: &Path) -> Option<String> {
    std::fs::read_to_string(path).ok()
}

#[async_trait]
impl Resolver for SystemResolver {
    fn detect(&self) -> ResolverKind {
        if self.paths.systemd_stub.exists() {
            ResolverKind::SystemdResolved
        } else if self.platform == "macos" {
            ResolverKind::MacOs
        } else if self.runner.exists("nmcli") {
            ResolverKind::NetworkManager
        } else {
            ResolverKind::Unsupported
        }
    }

    async fn apply(&self, kind: ResolverKind) -> Result<ResolverChange, DnsError> {
        if kind == ResolverKind::Unsupported {
            return Err(DnsError::UnsupportedResolver);
        }

        let mut changed = false;
        for (path, expected) in self.markers(kind) {
            if read_existing(&path).as_deref() == Some(expected.as_str()) {
                tracing::debug!(path = %path.display(), "resolver marker already in place");
                continue;
            }
            tracing::info!(path = %path.display(), resolver = %kind, "writing resolver marker");
            self.write_file(&path, &expected).await?;
            changed = true;
        }

        if !changed {
            return Ok(ResolverChange::AlreadyConfigured);
        }
        self.restart(kind).await?;
        Ok(ResolverChange::Applied)
    }

    async fn remove(&self, kind: ResolverKind) -> Result<ResolverChange, DnsError> {
        let mut removed = false;
        for (path, _) in self.markers(kind) {
            let Some(existing) = read_existing(&path) else {
                continue;
            };
            if !existing.contains(MANAGED_MARKER) {
                tracing::warn!(path = %path.display(), "leaving resolver file not created by srv");
                continue;
            }
            tracing::info!(path = %path.display(), resolver = %kind, "removing resolver marker");
            self.delete_file(&path).await?;
            removed = true;
        }

        if !removed {
            return Ok(ResolverChange::NotPresent);
        }
        self.restart(kind).await?;
        Ok(ResolverChange::Removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use srv_core::testing::RecordingRunner;
    use srv_core::ProcessOutput;
    use tempfile::TempDir;

    fn resolver(dir: &TempDir, runner: Arc<RecordingRunner>, os: &str) -> SystemResolver {
        SystemResolver::with_paths(runner, ResolverPaths::under(dir.path())).platform(os)
    }

    fn touch_stub(paths: &ResolverPaths) {
        std::fs::create_dir_all(paths.systemd_stub.parent().unwrap()).unwrap();
        std::fs::write(&paths.systemd_stub, "nameserver 127.0.0.53\n").unwrap();
    }

    #[test]
    fn detection_follows_priority_order() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.with_program("nmcli");

        let r = resolver(&dir, runner.clone(), "linux");
        assert_eq!(r.detect(), ResolverKind::NetworkManager);

        let r = resolver(&dir, runner.clone(), "macos");
        assert_eq!(r.detect(), ResolverKind::MacOs);

        touch_stub(r.paths());
        assert_eq!(r.detect(), ResolverKind::SystemdResolved);

        let bare = resolver(&TempDir::new().unwrap(), Arc::new(RecordingRunner::new()), "linux");
        assert_eq!(bare.detect(), ResolverKind::Unsupported);
    }

    #[tokio::test]
    async fn systemd_engage_writes_dropin_and_restarts_once() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let r = resolver(&dir, runner.clone(), "linux");
        touch_stub(r.paths());

        assert_eq!(r.engage().await.unwrap(), ResolverChange::Applied);
        let dropin = std::fs::read_to_string(&r.paths().systemd_dropin).unwrap();
        assert!(dropin.starts_with(MANAGED_MARKER));
        assert!(dropin.contains("DNS=127.0.0.1\n"));
        assert!(dropin.contains("Domains=~test ~local ~localhost\n"));

        assert_eq!(r.engage().await.unwrap(), ResolverChange::AlreadyConfigured);
        assert_eq!(runner.count("sudo systemctl restart systemd-resolved"), 1);
    }

    #[tokio::test]
    async fn macos_writes_one_file_per_tld() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let r = resolver(&dir, runner.clone(), "macos");

        assert_eq!(r.engage().await.unwrap(), ResolverChange::Applied);
        for tld in LOCAL_TLDS {
            let body = std::fs::read_to_string(r.paths().macos_resolver_dir.join(tld)).unwrap();
            assert!(body.ends_with("nameserver 127.0.0.1\n"), "{tld}: {body}");
        }
        assert_eq!(runner.count("sudo killall -HUP mDNSResponder"), 1);
    }

    #[tokio::test]
    async fn disengage_leaves_foreign_files_alone() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.with_program("nmcli");
        let r = resolver(&dir, runner.clone(), "linux");

        let conf = r.paths().nm_dnsmasq_conf.clone();
        std::fs::create_dir_all(conf.parent().unwrap()).unwrap();
        std::fs::write(&conf, "server=/corp/10.0.0.1\n").unwrap();

        assert_eq!(r.disengage().await.unwrap(), ResolverChange::NotPresent);
        assert!(conf.exists());
        assert_eq!(runner.count("sudo systemctl"), 0);
    }

    #[tokio::test]
    async fn disengage_removes_managed_marker_and_tolerates_absence() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.with_program("nmcli");
        let r = resolver(&dir, runner.clone(), "linux");

        r.engage().await.unwrap();
        assert!(r.paths().nm_dnsmasq_conf.exists());

        assert_eq!(r.disengage().await.unwrap(), ResolverChange::Removed);
        assert!(!r.paths().nm_dnsmasq_conf.exists());
        assert_eq!(r.disengage().await.unwrap(), ResolverChange::NotPresent);
        assert_eq!(runner.count("sudo systemctl restart NetworkManager"), 2);
    }

    #[tokio::test]
    async fn unsupported_host_refuses_to_engage() {
        let dir = TempDir::new().unwrap();
        let r = resolver(&dir, Arc::new(RecordingRunner::new()), "linux");
        assert!(matches!(r.engage().await, Err(DnsError::UnsupportedResolver)));
        assert_eq!(r.disengage().await.unwrap(), ResolverChange::NotPresent);
    }

    #[tokio::test]
    async fn privileged_writes_go_through_sudo_tee() {
        let runner = Arc::new(RecordingRunner::new());
        runner.respond("sudo systemctl", ProcessOutput::failed(1, "Failed to restart"));
        let dir = TempDir::new().unwrap();
        let mut r = SystemResolver::new(runner.clone()).platform("linux");
        r.paths = ResolverPaths::under(dir.path());
        touch_stub(&r.paths);

        let err = r.engage().await.unwrap_err();
        assert!(matches!(err, DnsError::Process(_)), "{err}");

        let calls = runner.calls();
        let tee = calls
            .iter()
            .find(|c| c.command_line().starts_with("sudo tee"))
            .expect("tee call");
        assert!(tee.stdin.as_deref().unwrap().contains("[Resolve]"));
        assert_eq!(runner.count("sudo mkdir -p"), 1);
    }
}
