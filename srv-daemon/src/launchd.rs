use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use srv_core::process::advisory;
use srv_core::{fsutil, Invocation, ProcessRunner};

use crate::error::{io_err, DaemonError};
use crate::paths::{
    launch_agents_dir, launchd_plist_path, stderr_log_path, stdout_log_path, LAUNCHD_LABEL,
};
use crate::service::{ServiceKind, ServiceManager, ServiceStatus};

const AGENT_PATH: &str = "/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin";

/// Generate the launchd agent plist for the srv daemon rooted at `root`.
pub fn generate_plist(binary_path: &Path, root: &Path, logs_dir: &Path) -> String {
    let stdout = stdout_log_path(logs_dir).display().to_string();
    let stderr = stderr_log_path(logs_dir).display().to_string();
    let binary = binary_path.display().to_string();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
  <key>Label</key>
  <string>{label}</string>
  <key>ProgramArguments</key>
  <array>
    <string>{binary}</string>
    <string>daemon</string>
    <string>start</string>
    <string>--foreground</string>
  </array>
  <key>RunAtLoad</key>
  <true/>
  <key>KeepAlive</key>
  <dict>
    <key>SuccessfulExit</key>
    <false/>
  </dict>
  <key>StandardOutPath</key>
  <string>{stdout}</string>
  <key>StandardErrorPath</key>
  <string>{stderr}</string>
  <key>EnvironmentVariables</key>
  <dict>
    <key>PATH</key>
    <string>{path}</string>
    <key>SRV_ROOT</key>
    <string>{root}</string>
  </dict>
</dict>
</plist>
"#,
        label = LAUNCHD_LABEL,
        binary = binary,
        stdout = stdout,
        stderr = stderr,
        path = AGENT_PATH,
        root = root.display(),
    )
}

/// Per-user launchd agent on macOS.
pub struct LaunchdAgent {
    runner: Arc<dyn ProcessRunner>,
    home: PathBuf,
    root: PathBuf,
    logs_dir: PathBuf,
}

impl LaunchdAgent {
    pub fn new(runner: Arc<dyn ProcessRunner>, home: &Path, root: &Path, logs_dir: &Path) -> Self {
        Self {
            runner,
            home: home.to_path_buf(),
            root: root.to_path_buf(),
            logs_dir: logs_dir.to_path_buf(),
        }
    }

    fn launchctl(&self, verb: &str) -> Invocation {
        Invocation::new(
            "launchctl",
            [verb.to_string(), self.manifest_path().display().to_string()],
        )
    }
}

#[async_trait]
impl ServiceManager for LaunchdAgent {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Launchd
    }

    fn manifest_path(&self) -> PathBuf {
        launchd_plist_path(&self.home)
    }

    async fn install(&self, executable: &Path) -> Result<PathBuf, DaemonError> {
        let agents = launch_agents_dir(&self.home);
        fs::create_dir_all(&agents).map_err(|e| io_err(&agents, e))?;
        fs::create_dir_all(&self.logs_dir).map_err(|e| io_err(&self.logs_dir, e))?;

        // A previous agent may still be loaded.
        advisory(self.runner.as_ref(), &self.launchctl("unload")).await;

        let plist = self.manifest_path();
        fsutil::atomic_write(&plist, generate_plist(executable, &self.root, &self.logs_dir))
            .map_err(|e| io_err(&plist, e))?;
        tracing::info!(path = %plist.display(), "wrote launchd agent");

        self.runner.run_checked(&self.launchctl("load")).await?;
        Ok(plist)
    }

    async fn uninstall(&self) -> Result<(), DaemonError> {
        advisory(self.runner.as_ref(), &self.launchctl("unload")).await;
        let plist = self.manifest_path();
        fsutil::remove_if_exists(&plist).map_err(|e| io_err(&plist, e))?;
        Ok(())
    }

    async fn restart(&self) -> Result<(), DaemonError> {
        advisory(self.runner.as_ref(), &self.launchctl("unload")).await;
        self.runner.run_checked(&self.launchctl("load")).await?;
        Ok(())
    }

    async fn stop(&self) -> Result<(), DaemonError> {
        self.runner.run_checked(&self.launchctl("unload")).await?;
        Ok(())
    }

    async fn status(&self) -> ServiceStatus {
        let inv = Invocation::new("launchctl", ["list", LAUNCHD_LABEL]);
        match self.runner.run_quiet(&inv).await {
            Ok(out) if out.success() => match running_pid(&out.stdout) {
                Some(pid) => ServiceStatus {
                    active: true,
                    detail: format!("running (pid {pid})"),
                },
                None => ServiceStatus::inactive("loaded"),
            },
            _ => ServiceStatus::inactive("not loaded"),
        }
    }
}

/// `"PID" = 123;` from `launchctl list <label>` output.
fn running_pid(output: &str) -> Option<u32> {
    output.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("\"PID\"")?;
        rest.trim_start_matches([' ', '='])
            .trim_end_matches(';')
            .trim()
            .parse()
            .ok()
    })
}
