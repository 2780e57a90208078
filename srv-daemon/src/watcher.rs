//! Event stream watcher and reconnect supervisor.
//!
//! ```text
//! WaitingForRuntime --info ok--> Subscribing --> Streaming
//!        ^  (backoff 1s..30s)                        |
//!        +------------- Restarting (5s) <-- stream ended
//! ```
//!
//! While streaming, a reader task decodes lines into a bounded queue and the
//! handler drains it. Both stop when the shared [`Shutdown`] fires, including
//! in the middle of an attach.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use srv_core::constants::{INFO_TIMEOUT, RUNTIME_BINARY};
use srv_core::{Invocation, ProcessRunner};

use crate::binder::{AttachOutcome, NetworkBinder};
use crate::error::{io_err, DaemonError};
use crate::events::RuntimeEvent;
use crate::mapping::MappingCache;
use crate::shutdown::Shutdown;

/// Exponential delay: starts at `initial`, doubles, never exceeds `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait now; advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[derive(Debug, Clone)]
pub struct WatcherSettings {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub restart_delay: Duration,
    pub queue_capacity: usize,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            restart_delay: Duration::from_secs(5),
            queue_capacity: 64,
        }
    }
}

/// How long a closed stream's process gets to report its exit status.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// An open event subscription.
pub struct Subscription {
    pub lines: Box<dyn AsyncBufRead + Send + Unpin>,
    /// Diagnostics from the stream process; the last line is logged when the
    /// stream closes.
    pub stderr: Option<Box<dyn AsyncRead + Send + Unpin>>,
    /// Killed when the subscription ends.
    pub child: Option<Child>,
}

#[async_trait]
pub trait EventSource: Send + Sync {
    /// True when the runtime answers.
    async fn available(&self) -> bool;

    async fn subscribe(&self) -> Result<Subscription, DaemonError>;
}

/// `docker info` check and `docker events` stream.
pub struct DockerEventSource {
    runner: Arc<dyn ProcessRunner>,
}

impl DockerEventSource {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl EventSource for DockerEventSource {
    async fn available(&self) -> bool {
        let info = Invocation::new(RUNTIME_BINARY, ["info"]).timeout(INFO_TIMEOUT);
        matches!(self.runner.run_quiet(&info).await, Ok(out) if out.success())
    }

    async fn subscribe(&self) -> Result<Subscription, DaemonError> {
        let mut child = Command::new(RUNTIME_BINARY)
            .args([
                "events",
                "--format",
                "{{json .}}",
                "--filter",
                "type=container",
                "--filter",
                "event=start",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| io_err(RUNTIME_BINARY, e))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            io_err(
                RUNTIME_BINARY,
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, "event stream has no stdout"),
            )
        })?;
        let stderr = child
            .stderr
            .take()
            .map(|e| Box::new(e) as Box<dyn AsyncRead + Send + Unpin>);

        Ok(Subscription {
            lines: Box::new(BufReader::new(stdout)),
            stderr,
            child: Some(child),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Shutdown,
    /// The stream closed on its own.
    Closed,
}

pub struct Watcher {
    source: Arc<dyn EventSource>,
    mapping: Arc<MappingCache>,
    binder: Arc<NetworkBinder>,
    settings: WatcherSettings,
}

impl Watcher {
    pub fn new(
        source: Arc<dyn EventSource>,
        mapping: Arc<MappingCache>,
        binder: Arc<NetworkBinder>,
        settings: WatcherSettings,
    ) -> Self {
        Self {
            source,
            mapping,
            binder,
            settings,
        }
    }

    /// Supervise the stream until `shutdown` fires.
    pub async fn run(&self, shutdown: Shutdown) -> Result<(), DaemonError> {
        loop {
            if !self.wait_for_runtime(&shutdown).await {
                return Ok(());
            }
            tracing::info!(network = %self.binder.network(), "runtime available, watching container events");

            match self.stream_once(&shutdown).await {
                Ok(StreamEnd::Shutdown) => return Ok(()),
                Ok(StreamEnd::Closed) => {}
                Err(err) => tracing::warn!(error = %err, "event stream failed"),
            }

            tracing::info!(delay = ?self.settings.restart_delay, "restarting event stream");
            tokio::select! {
                _ = shutdown.wait() => return Ok(()),
                _ = tokio::time::sleep(self.settings.restart_delay) => {}
            }
        }
    }

    /// Poll availability with backoff. Returns `false` on shutdown.
    async fn wait_for_runtime(&self, shutdown: &Shutdown) -> bool {
        let mut backoff = Backoff::new(self.settings.initial_backoff, self.settings.max_backoff);
        loop {
            if shutdown.is_triggered() {
                return false;
            }
            if self.source.available().await {
                return true;
            }
            let delay = backoff.next_delay();
            tracing::info!(retry_in = ?delay, "container runtime not available");
            tokio::select! {
                _ = shutdown.wait() => return false,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One subscription from open to close.
    pub async fn stream_once(&self, shutdown: &Shutdown) -> Result<StreamEnd, DaemonError> {
        let Subscription {
            lines,
            stderr,
            child,
        } = self.source.subscribe().await?;
        let (tx, mut rx) = mpsc::channel(self.settings.queue_capacity);
        let reader = tokio::spawn(read_events(lines, tx, shutdown.clone()));
        let diagnostics = stderr.map(|stderr| tokio::spawn(last_line(stderr)));

        let end = loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break StreamEnd::Shutdown,
                event = rx.recv() => match event {
                    Some(event) => self.handle(event, shutdown).await,
                    None => break StreamEnd::Closed,
                },
            }
        };

        match end {
            StreamEnd::Shutdown => {
                if let Some(mut child) = child {
                    if let Err(err) = child.kill().await {
                        tracing::debug!(error = %err, "event stream process already exited");
                    }
                }
                if let Some(task) = diagnostics {
                    task.abort();
                }
            }
            StreamEnd::Closed => {
                let status = match child {
                    Some(mut child) => exit_status(&mut child).await,
                    None => None,
                };
                let last_stderr = match diagnostics {
                    Some(task) => tokio::time::timeout(EXIT_GRACE, task)
                        .await
                        .ok()
                        .and_then(Result::ok)
                        .flatten(),
                    None => None,
                };
                tracing::warn!(
                    status = status.as_deref().unwrap_or("unknown"),
                    stderr = last_stderr.as_deref().unwrap_or(""),
                    "event stream ended",
                );
            }
        }
        reader.abort();
        let _ = reader.await;
        Ok(end)
    }

    /// Attach the container behind a start event if it belongs to a site.
    /// Returns early, dropping any in-flight command, once `shutdown` fires.
    pub async fn handle(&self, event: RuntimeEvent, shutdown: &Shutdown) {
        tokio::select! {
            biased;
            _ = shutdown.wait() => {
                tracing::debug!(container = ?event.container_name(), "shutdown interrupted event handling");
            }
            _ = self.attach_site(&event) => {}
        }
    }

    async fn attach_site(&self, event: &RuntimeEvent) {
        let Some(container) = event.container_name() else {
            return;
        };
        let Some(site) = self.mapping.resolve(container).await else {
            tracing::debug!(container = %container, "container not managed by srv");
            return;
        };

        match self.binder.attach(container).await {
            Ok(AttachOutcome::Attached) => {
                tracing::info!(container = %container, site = %site, network = %self.binder.network(), "container attached");
            }
            Ok(AttachOutcome::AlreadyAttached) => {
                tracing::debug!(container = %container, site = %site, "container already attached");
            }
            Err(err) => {
                tracing::warn!(container = %container, site = %site, error = %err, "failed to attach container");
            }
        }
    }
}

/// Exit status of a stream process whose stdout has closed. Killed if it
/// lingers past [`EXIT_GRACE`].
async fn exit_status(child: &mut Child) -> Option<String> {
    match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
        Ok(Ok(status)) => Some(status.to_string()),
        Ok(Err(err)) => {
            tracing::debug!(error = %err, "could not collect event stream status");
            None
        }
        Err(_) => {
            let _ = child.kill().await;
            None
        }
    }
}

/// Last non-blank line of `reader`, read to EOF.
async fn last_line(reader: Box<dyn AsyncRead + Send + Unpin>) -> Option<String> {
    let mut lines = BufReader::new(reader).lines();
    let mut last = None;
    while let Ok(Some(line)) = lines.next_line().await {
        if !line.trim().is_empty() {
            last = Some(line.trim().to_string());
        }
    }
    last
}

async fn read_events(
    lines: Box<dyn AsyncBufRead + Send + Unpin>,
    tx: mpsc::Sender<RuntimeEvent>,
    shutdown: Shutdown,
) {
    let mut lines = lines.lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.wait() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, "reading event stream failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match RuntimeEvent::parse(&line) {
            Ok(event) if event.is_container_start() => {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "skipping malformed event"),
        }
    }
}
