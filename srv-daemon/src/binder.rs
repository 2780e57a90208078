//! Idempotent attachment of containers to the shared proxy network.

use std::sync::Arc;

use srv_core::constants::{RUNTIME_BINARY, STATUS_TIMEOUT};
use srv_core::{Invocation, ProcessRunner};

use crate::error::DaemonError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    Attached,
    AlreadyAttached,
}

pub struct NetworkBinder {
    runner: Arc<dyn ProcessRunner>,
    network: String,
}

impl NetworkBinder {
    pub fn new(runner: Arc<dyn ProcessRunner>, network: impl Into<String>) -> Self {
        Self {
            runner,
            network: network.into(),
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    /// Connect `container` to the network under its own name as alias.
    pub async fn attach(&self, container: &str) -> Result<AttachOutcome, DaemonError> {
        let inv = Invocation::new(
            RUNTIME_BINARY,
            [
                "network",
                "connect",
                "--alias",
                container,
                self.network.as_str(),
                container,
            ],
        )
        .timeout(STATUS_TIMEOUT);

        let output = self.runner.run_quiet(&inv).await?;
        if output.success() {
            return Ok(AttachOutcome::Attached);
        }
        if output.is_idempotent_conflict() {
            return Ok(AttachOutcome::AlreadyAttached);
        }
        output.into_result(&inv)?;
        Ok(AttachOutcome::Attached)
    }

    /// Create the network if it does not exist yet.
    pub async fn ensure_network(&self) -> Result<(), DaemonError> {
        let inspect = Invocation::new(RUNTIME_BINARY, ["network", "inspect", self.network.as_str()])
            .timeout(STATUS_TIMEOUT);
        if self.runner.run_quiet(&inspect).await?.success() {
            return Ok(());
        }

        let create = Invocation::new(RUNTIME_BINARY, ["network", "create", self.network.as_str()])
            .timeout(STATUS_TIMEOUT);
        let output = self.runner.run_quiet(&create).await?;
        if output.success() || output.is_idempotent_conflict() {
            tracing::info!(network = %self.network, "network ready");
            return Ok(());
        }
        output.into_result(&create)?;
        Ok(())
    }
}
