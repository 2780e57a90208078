//! Size-based rotation of the daemon's stdout/stderr logs.
//!
//! `daemon.log` is shifted to `daemon.log.1`, older copies move up by one and
//! anything past the retention count is dropped.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use crate::paths::{stderr_log_path, stdout_log_path};

pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
pub const MAX_ROTATED_FILES: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct LogRotator {
    max_bytes: u64,
    keep: usize,
}

impl Default for LogRotator {
    fn default() -> Self {
        Self::new(MAX_LOG_BYTES, MAX_ROTATED_FILES)
    }
}

impl LogRotator {
    pub fn new(max_bytes: u64, keep: usize) -> Self {
        Self {
            max_bytes,
            keep: keep.max(1),
        }
    }

    /// Rotate `log` once it reaches the size cap. `Ok(false)` when the file is
    /// small or absent.
    pub fn rotate(&self, log: &Path) -> io::Result<bool> {
        match fs::metadata(log) {
            Ok(meta) if meta.len() >= self.max_bytes => {}
            Ok(_) => return Ok(false),
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        }

        ignore_missing(fs::remove_file(backup_path(log, self.keep)))?;
        for n in (1..self.keep).rev() {
            ignore_missing(fs::rename(backup_path(log, n), backup_path(log, n + 1)))?;
        }
        fs::rename(log, backup_path(log, 1))?;
        // The service manager reopens by path; leave an empty file behind.
        fs::File::create(log)?;
        Ok(true)
    }
}

/// Rotate both daemon logs under `logs_dir`. Failures are logged, never returned.
pub fn rotate_logs(logs_dir: &Path) {
    let rotator = LogRotator::default();
    for log in [stdout_log_path(logs_dir), stderr_log_path(logs_dir)] {
        match rotator.rotate(&log) {
            Ok(true) => tracing::info!(path = %log.display(), "rotated daemon log"),
            Ok(false) => {}
            Err(err) => tracing::warn!(path = %log.display(), error = %err, "log rotation failed"),
        }
    }
}

fn backup_path(log: &Path, n: usize) -> PathBuf {
    let mut name = log.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

fn ignore_missing(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
