use std::collections::VecDeque;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;

use srv_core::testing::RecordingRunner;
use srv_core::{
    Invocation, ProcessError, ProcessOutput, ProcessRunner, Site, SiteKind, SiteName,
};
use srv_daemon::{
    DaemonError, EventSource, MappingCache, NetworkBinder, Shutdown, StreamEnd, Subscription,
    Watcher, WatcherSettings,
};

const NETWORK: &str = "abc123def456_traefik";

fn compose_site(name: &str, container: &str) -> Site {
    Site {
        name: SiteName(name.to_string()),
        kind: SiteKind::Compose,
        domain: format!("{name}.test"),
        container_name: container.to_string(),
        compose_service: "web".to_string(),
        profile: String::new(),
        project_path: PathBuf::from("/projects").join(name),
        port: 80,
        is_local: true,
    }
}

fn start_line(container: &str) -> String {
    format!(
        r#"{{"status":"start","id":"abc","Type":"container","Action":"start","Actor":{{"ID":"abc","Attributes":{{"name":"{container}"}}}},"time":1}}"#
    )
}

/// Scripted availability answers and canned stream bodies.
struct ScriptedSource {
    availability: Mutex<VecDeque<bool>>,
    streams: Mutex<VecDeque<String>>,
    checks: Mutex<Vec<Instant>>,
    subscribes: Mutex<Vec<Instant>>,
    stop_after_subscribes: usize,
    shutdown: Shutdown,
}

impl ScriptedSource {
    fn new(availability: &[bool], streams: Vec<String>, shutdown: Shutdown) -> Self {
        Self {
            availability: Mutex::new(availability.iter().copied().collect()),
            streams: Mutex::new(streams.into()),
            checks: Mutex::new(Vec::new()),
            subscribes: Mutex::new(Vec::new()),
            stop_after_subscribes: usize::MAX,
            shutdown,
        }
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn available(&self) -> bool {
        self.checks.lock().unwrap().push(Instant::now());
        self.availability.lock().unwrap().pop_front().unwrap_or(true)
    }

    async fn subscribe(&self) -> Result<Subscription, DaemonError> {
        let count = {
            let mut subs = self.subscribes.lock().unwrap();
            subs.push(Instant::now());
            subs.len()
        };
        if count >= self.stop_after_subscribes {
            self.shutdown.trigger();
        }
        let body = self.streams.lock().unwrap().pop_front().unwrap_or_default();
        Ok(Subscription {
            lines: Box::new(Cursor::new(body.into_bytes())),
            stderr: None,
            child: None,
        })
    }
}

fn watcher(
    source: Arc<ScriptedSource>,
    runner: &Arc<RecordingRunner>,
    sites: Vec<Site>,
) -> Watcher {
    Watcher::new(
        source,
        Arc::new(MappingCache::new(Arc::new(sites))),
        Arc::new(NetworkBinder::new(runner.clone(), NETWORK)),
        WatcherSettings::default(),
    )
}

#[tokio::test]
async fn start_event_attaches_exactly_once() {
    let shutdown = Shutdown::new();
    let body = format!("{}\n", start_line("myapp-web-1"));
    let source = Arc::new(ScriptedSource::new(&[], vec![body], shutdown.clone()));
    let runner = Arc::new(RecordingRunner::new());
    let w = watcher(source, &runner, vec![compose_site("myapp", "myapp-web-1")]);

    let end = w.stream_once(&shutdown).await.unwrap();
    assert_eq!(end, StreamEnd::Closed);
    assert_eq!(
        runner.command_lines(),
        vec![format!(
            "docker network connect --alias myapp-web-1 {NETWORK} myapp-web-1"
        )]
    );
}

#[tokio::test]
async fn malformed_and_foreign_events_are_skipped() {
    let shutdown = Shutdown::new();
    let body = [
        "this is not json".to_string(),
        String::new(),
        start_line("someone-elses-container"),
        r#"{"Type":"container","Action":"die","Actor":{"Attributes":{"name":"myapp-web-1"}}}"#
            .to_string(),
        start_line("myapp-web-1"),
    ]
    .join("\n");
    let source = Arc::new(ScriptedSource::new(&[], vec![body], shutdown.clone()));
    let runner = Arc::new(RecordingRunner::new());
    let w = watcher(source, &runner, vec![compose_site("myapp", "myapp-web-1")]);

    assert_eq!(w.stream_once(&shutdown).await.unwrap(), StreamEnd::Closed);
    assert_eq!(runner.count("docker network connect"), 1);
}

#[tokio::test]
async fn already_attached_endpoint_is_not_retried() {
    let shutdown = Shutdown::new();
    let body = format!("{}\n", start_line("myapp-web-1"));
    let source = Arc::new(ScriptedSource::new(&[], vec![body], shutdown.clone()));
    let runner = Arc::new(RecordingRunner::new());
    runner.respond(
        "docker network connect",
        ProcessOutput::failed(
            1,
            "Error response from daemon: endpoint with name myapp-web-1 already exists in network",
        ),
    );
    let w = watcher(source, &runner, vec![compose_site("myapp", "myapp-web-1")]);

    assert_eq!(w.stream_once(&shutdown).await.unwrap(), StreamEnd::Closed);
    assert_eq!(runner.count("docker network connect"), 1);
}

#[tokio::test(start_paused = true)]
async fn runtime_check_backs_off_then_stream_restarts_after_delay() {
    let shutdown = Shutdown::new();
    let mut source = ScriptedSource::new(&[false, false, false, true], Vec::new(), shutdown.clone());
    source.stop_after_subscribes = 2;
    let source = Arc::new(source);
    let runner = Arc::new(RecordingRunner::new());
    let w = watcher(source.clone(), &runner, Vec::new());

    tokio::time::timeout(Duration::from_secs(600), w.run(shutdown.clone()))
        .await
        .expect("watcher stops on shutdown")
        .unwrap();

    let checks = source.checks.lock().unwrap().clone();
    let gaps: Vec<Duration> = checks.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(
        gaps[..3],
        [Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
    );

    let subs = source.subscribes.lock().unwrap().clone();
    assert_eq!(subs.len(), 2);
    assert!(subs[1] - subs[0] >= Duration::from_secs(5));
}

/// Never reaches EOF while the writer half is held open.
struct OpenStream(Mutex<Option<tokio::io::DuplexStream>>);

#[async_trait]
impl EventSource for OpenStream {
    async fn available(&self) -> bool {
        true
    }

    async fn subscribe(&self) -> Result<Subscription, DaemonError> {
        let stream = self.0.lock().unwrap().take().expect("single subscription");
        Ok(Subscription {
            lines: Box::new(tokio::io::BufReader::new(stream)),
            stderr: None,
            child: None,
        })
    }
}

#[tokio::test]
async fn shutdown_interrupts_an_idle_stream() {
    let shutdown = Shutdown::new();
    let runner = Arc::new(RecordingRunner::new());
    let (_writer, reader) = tokio::io::duplex(64);
    let w = Watcher::new(
        Arc::new(OpenStream(Mutex::new(Some(reader)))),
        Arc::new(MappingCache::new(Arc::new(Vec::<Site>::new()))),
        Arc::new(NetworkBinder::new(runner.clone(), NETWORK)),
        WatcherSettings::default(),
    );

    let task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { w.stream_once(&shutdown).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown.trigger();

    let end = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("stream stops")
        .unwrap()
        .unwrap();
    assert_eq!(end, StreamEnd::Shutdown);
    assert!(runner.calls().is_empty());
}

/// Every command hangs far longer than any test waits.
#[derive(Default)]
struct StalledRunner {
    started: AtomicUsize,
}

#[async_trait]
impl ProcessRunner for StalledRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
        self.run_quiet(invocation).await
    }

    async fn run_quiet(&self, _invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(20)).await;
        Ok(ProcessOutput::ok(""))
    }

    fn exists(&self, _program: &str) -> bool {
        true
    }
}

#[tokio::test]
async fn shutdown_interrupts_an_attach_in_flight() {
    let shutdown = Shutdown::new();
    let runner = Arc::new(StalledRunner::default());
    let (mut writer, reader) = tokio::io::duplex(1024);
    writer
        .write_all(format!("{}\n", start_line("myapp-web-1")).as_bytes())
        .await
        .unwrap();
    let w = Watcher::new(
        Arc::new(OpenStream(Mutex::new(Some(reader)))),
        Arc::new(MappingCache::new(Arc::new(vec![compose_site(
            "myapp",
            "myapp-web-1",
        )]))),
        Arc::new(NetworkBinder::new(runner.clone(), NETWORK)),
        WatcherSettings::default(),
    );

    let task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { w.stream_once(&shutdown).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(runner.started.load(Ordering::SeqCst), 1);

    let triggered = Instant::now();
    shutdown.trigger();
    let end = tokio::time::timeout(Duration::from_secs(3), task)
        .await
        .expect("attach unwinds on shutdown")
        .unwrap()
        .unwrap();
    assert_eq!(end, StreamEnd::Shutdown);
    assert!(triggered.elapsed() < Duration::from_secs(1));
    drop(writer);
}
