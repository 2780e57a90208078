use std::path::{Path, PathBuf};
use std::time::Duration;

pub const LAUNCHD_LABEL: &str = "dev.stubbe.srv-daemon";
pub const SYSTEMD_UNIT: &str = "srv-daemon.service";

pub const DAEMON_STDOUT_LOG: &str = "daemon.log";
pub const DAEMON_STDERR_LOG: &str = "daemon-err.log";

pub const ROTATION_INTERVAL: Duration = Duration::from_secs(60);

pub fn stdout_log_path(logs_dir: &Path) -> PathBuf {
    logs_dir.join(DAEMON_STDOUT_LOG)
}

pub fn stderr_log_path(logs_dir: &Path) -> PathBuf {
    logs_dir.join(DAEMON_STDERR_LOG)
}

pub fn systemd_user_dir(home: &Path) -> PathBuf {
    home.join(".config").join("systemd").join("user")
}

pub fn systemd_unit_path(home: &Path) -> PathBuf {
    systemd_user_dir(home).join(SYSTEMD_UNIT)
}

pub fn launch_agents_dir(home: &Path) -> PathBuf {
    home.join("Library").join("LaunchAgents")
}

pub fn launchd_plist_path(home: &Path) -> PathBuf {
    launch_agents_dir(home).join(format!("{LAUNCHD_LABEL}.plist"))
}
