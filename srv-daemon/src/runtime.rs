use std::path::PathBuf;
use std::sync::Arc;

use srv_core::constants::RUNTIME_BINARY;
use srv_core::{Config, ProcessRunner, SiteRegistry, SystemRunner};

use crate::binder::NetworkBinder;
use crate::error::{io_err, DaemonError};
use crate::mapping::MappingCache;
use crate::paths::ROTATION_INTERVAL;
use crate::service::ServiceManager;
use crate::shutdown::Shutdown;
use crate::watcher::{DockerEventSource, Watcher, WatcherSettings};

/// Start the daemon runtime and block the current thread until it exits.
///
/// When the container runtime binary is missing the installed service (if
/// any) is removed first so the service manager stops restarting us.
pub fn start_blocking(
    config: Config,
    service: Option<Box<dyn ServiceManager>>,
) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(async move {
        let runner: Arc<dyn ProcessRunner> = Arc::new(SystemRunner);
        ensure_runtime_installed(runner.as_ref(), service.as_deref()).await?;
        run(config, runner, Shutdown::new()).await
    })
}

/// Fail with [`DaemonError::RuntimeMissing`] when the runtime binary is not on
/// `PATH`, uninstalling `service` on the way out.
pub async fn ensure_runtime_installed(
    runner: &dyn ProcessRunner,
    service: Option<&dyn ServiceManager>,
) -> Result<(), DaemonError> {
    if runner.exists(RUNTIME_BINARY) {
        return Ok(());
    }
    if let Some(service) = service.filter(|s| s.is_installed()) {
        tracing::warn!(kind = %service.kind(), "container runtime missing; uninstalling daemon service");
        if let Err(err) = service.uninstall().await {
            tracing::warn!(error = %err, "failed to uninstall daemon service");
        }
    }
    Err(DaemonError::RuntimeMissing {
        binary: RUNTIME_BINARY,
    })
}

/// Run the daemon until `shutdown` fires or a signal arrives.
pub async fn run(
    config: Config,
    runner: Arc<dyn ProcessRunner>,
    shutdown: Shutdown,
) -> Result<(), DaemonError> {
    let logs = config.logs_dir();
    std::fs::create_dir_all(&logs).map_err(|e| io_err(&logs, e))?;

    let mapping = Arc::new(MappingCache::new(Arc::new(SiteRegistry::new(
        config.sites_dir.clone(),
    ))));
    if let Err(err) = mapping.rebuild().await {
        tracing::warn!(error = %err, "failed to load site mappings");
    }

    let binder = Arc::new(NetworkBinder::new(runner.clone(), config.network_name.clone()));
    let watcher = Watcher::new(
        Arc::new(DockerEventSource::new(runner)),
        mapping,
        binder,
        WatcherSettings::default(),
    );
    tracing::info!(network = %config.network_name, "daemon started");

    let watcher_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let result = watcher.run(shutdown.clone()).await;
            shutdown.trigger();
            result
        })
    };

    let rotation_handle = tokio::spawn(log_rotation_task(logs, shutdown.clone()));
    let signal_handle = tokio::spawn(signal_task(shutdown.clone()));

    let (watcher_result, rotation_result, signal_result) =
        tokio::join!(watcher_handle, rotation_handle, signal_handle);

    handle_join("watcher", watcher_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("daemon stopped");
    Ok(())
}

async fn log_rotation_task(logs_dir: PathBuf, shutdown: Shutdown) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(ROTATION_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await; // consume the first immediate tick

    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            _ = interval.tick() => {
                let logs_dir = logs_dir.clone();
                tokio::task::spawn_blocking(move || crate::log_rotation::rotate_logs(&logs_dir))
                    .await
                    .ok();
            }
        }
    }
    Ok(())
}

async fn signal_task(shutdown: Shutdown) -> Result<(), DaemonError> {
    tokio::select! {
        _ = shutdown.wait() => {}
        _ = wait_for_signal() => {
            tracing::info!("received shutdown signal");
            shutdown.trigger();
        }
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "SIGTERM handler unavailable");
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await;
}

/// Resolves on ctrl-c; never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "ctrl-c handler failed");
        std::future::pending::<()>().await;
    }
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Join {
            task,
            reason: err.to_string(),
        }),
    }
}

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use srv_core::testing::RecordingRunner;
    use tempfile::TempDir;

    use crate::service::{ServiceKind, ServiceStatus};

    #[derive(Default)]
    struct FakeService {
        installed: bool,
        uninstalls: AtomicUsize,
    }

    #[async_trait]
    impl ServiceManager for FakeService {
        fn kind(&self) -> ServiceKind {
            ServiceKind::SystemdUser
        }
        fn manifest_path(&self) -> PathBuf {
            PathBuf::from("/nonexistent/srv-daemon.service")
        }
        fn is_installed(&self) -> bool {
            self.installed
        }
        async fn install(&self, _executable: &Path) -> Result<PathBuf, DaemonError> {
            Ok(self.manifest_path())
        }
        async fn uninstall(&self) -> Result<(), DaemonError> {
            self.uninstalls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn restart(&self) -> Result<(), DaemonError> {
            Ok(())
        }
        async fn stop(&self) -> Result<(), DaemonError> {
            Ok(())
        }
        async fn status(&self) -> ServiceStatus {
            ServiceStatus::inactive("inactive")
        }
    }

    #[tokio::test]
    async fn missing_runtime_uninstalls_service_and_errors() {
        let runner = RecordingRunner::new();
        let service = FakeService {
            installed: true,
            ..Default::default()
        };
        let err = ensure_runtime_installed(&runner, Some(&service))
            .await
            .unwrap_err();
        assert!(matches!(err, DaemonError::RuntimeMissing { .. }));
        assert_eq!(service.uninstalls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn present_runtime_passes() {
        let runner = RecordingRunner::new();
        runner.with_program("docker");
        let service = FakeService::default();
        ensure_runtime_installed(&runner, Some(&service)).await.unwrap();
        assert_eq!(service.uninstalls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_returns_once_shutdown_is_triggered() {
        let dir = TempDir::new().unwrap();
        let config = Config::at(dir.path().join("srv"), "abc_traefik");
        let runner = Arc::new(RecordingRunner::new());
        let shutdown = Shutdown::new();
        shutdown.trigger();

        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            run(config.clone(), runner.clone(), shutdown),
        )
        .await
        .expect("daemon exits")
        .unwrap();

        assert!(config.logs_dir().is_dir());
        assert_eq!(runner.count("docker network connect"), 0);
    }
}
