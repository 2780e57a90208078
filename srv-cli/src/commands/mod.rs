pub mod daemon;
pub mod dns;
pub mod doctor;
pub mod init;
pub mod proxy;
pub mod site;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};

use srv_core::{Config, ProcessRunner, SystemRunner};

/// Configuration for this invocation, read once from the environment.
pub(crate) fn load_config() -> Result<Config> {
    Config::load().context("failed to resolve srv configuration")
}

pub(crate) fn system_runner() -> Arc<dyn ProcessRunner> {
    Arc::new(SystemRunner)
}

/// Drive one async command to completion on a fresh runtime.
pub(crate) fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    Ok(runtime.block_on(future))
}
