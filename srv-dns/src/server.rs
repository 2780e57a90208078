//! Local DNS server lifecycle hooks.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use srv_core::constants::{COMPOSE_TIMEOUT, DNS_COMPOSE_SERVICE, DNS_CONTAINER, RUNTIME_BINARY};
use srv_core::{Invocation, ProcessRunner};

use crate::diagnostics::container_running;
use crate::error::DnsError;

#[async_trait]
pub trait DnsServer: Send + Sync {
    /// Reload the server so it picks up a rewritten config. Returns `false`
    /// when the server is not running and nothing was done.
    async fn reload(&self) -> Result<bool, DnsError>;
}

/// dnsmasq running as the `dns` service of the proxy compose stack.
pub struct ComposeDnsServer {
    runner: Arc<dyn ProcessRunner>,
    proxy_dir: PathBuf,
}

impl ComposeDnsServer {
    pub fn new(runner: Arc<dyn ProcessRunner>, proxy_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            proxy_dir: proxy_dir.into(),
        }
    }

    pub async fn is_running(&self) -> bool {
        container_running(self.runner.as_ref(), DNS_CONTAINER).await
    }
}

#[async_trait]
impl DnsServer for ComposeDnsServer {
    async fn reload(&self) -> Result<bool, DnsError> {
        if !self.is_running().await {
            tracing::debug!("dns container not running; skipping reload");
            return Ok(false);
        }
        let inv = Invocation::new(RUNTIME_BINARY, ["compose", "restart", DNS_COMPOSE_SERVICE])
            .current_dir(&self.proxy_dir)
            .timeout(COMPOSE_TIMEOUT);
        self.runner.run_checked(&inv).await?;
        tracing::info!("dns server reloaded");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use srv_core::testing::RecordingRunner;
    use srv_core::ProcessOutput;

    #[tokio::test]
    async fn reload_skipped_when_container_stopped() {
        let runner = Arc::new(RecordingRunner::new());
        runner.respond("docker inspect", ProcessOutput::ok("false\n"));
        let server = ComposeDnsServer::new(runner.clone(), "/srv/traefik");

        assert!(!server.reload().await.unwrap());
        assert_eq!(runner.count("docker compose"), 0);
    }

    #[tokio::test]
    async fn reload_restarts_compose_service_in_proxy_dir() {
        let runner = Arc::new(RecordingRunner::new());
        runner.respond("docker inspect", ProcessOutput::ok("true\n"));
        let server = ComposeDnsServer::new(runner.clone(), "/srv/traefik");

        assert!(server.reload().await.unwrap());
        let calls = runner.calls();
        let restart = calls.last().unwrap();
        assert_eq!(restart.command_line(), "docker compose restart dns");
        assert_eq!(restart.cwd.as_deref(), Some(std::path::Path::new("/srv/traefik")));
    }

    #[tokio::test]
    async fn reload_failure_is_an_error() {
        let runner = Arc::new(RecordingRunner::new());
        runner
            .respond("docker inspect", ProcessOutput::ok("true"))
            .respond("docker compose", ProcessOutput::failed(1, "no such service"));
        let server = ComposeDnsServer::new(runner, "/srv/traefik");
        assert!(server.reload().await.is_err());
    }
}
