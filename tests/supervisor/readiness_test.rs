//! Readiness race: output banner vs. delayed HTTP probe vs. timeout.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use preview_supervisor::supervisor::{
    HttpProbe, ProjectState, ReqwestProbe, StartError, SupervisorError,
};
use url::Url;

use super::{sh_config, supervisor, supervisor_with_probe, READY_BANNER};

/// Probe that answers from the `answer_on`-th attempt onwards.
struct CountingProbe {
    answer_on: u32,
    calls: AtomicU32,
}

impl CountingProbe {
    fn new(answer_on: u32) -> Arc<Self> {
        Arc::new(Self {
            answer_on,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl HttpProbe for CountingProbe {
    async fn check(&self, _url: &Url) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst) + 1 >= self.answer_on
    }
}

fn fast_probe_config(script: &str) -> preview_supervisor::config::PreviewConfig {
    let mut config = sh_config(script);
    config.readiness.probe_delay_ms = 100;
    config.readiness.probe_interval_ms = 50;
    config.readiness.probe_retries = 3;
    config.readiness.timeout_ms = 3_000;
    config
}

#[tokio::test]
async fn probe_success_reaches_running_without_banner() {
    let dir = tempfile::tempdir().unwrap();
    let probe = CountingProbe::new(2);
    let supervisor = supervisor_with_probe(fast_probe_config("exec sleep 30"), probe.clone());
    supervisor.register_workspace("proj", dir.path());

    let status = supervisor.start("proj").await.unwrap();

    assert_eq!(status.state, ProjectState::Running);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    supervisor.stop("proj").await;
}

#[tokio::test]
async fn exhausted_probe_falls_through_to_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fast_probe_config("exec sleep 30");
    config.readiness.timeout_ms = 600;
    let probe = CountingProbe::new(u32::MAX);
    let supervisor = supervisor_with_probe(config, probe.clone());
    supervisor.register_workspace("proj", dir.path());

    let err = supervisor.start("proj").await.unwrap_err();

    assert!(matches!(
        err,
        SupervisorError::Start(StartError::ReadinessTimeout(_))
    ));
    assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        supervisor.get_status("proj").unwrap().state,
        ProjectState::Error
    );
}

#[tokio::test]
async fn banner_wins_before_probe_starts() {
    let dir = tempfile::tempdir().unwrap();
    let probe = CountingProbe::new(1);
    let mut config = sh_config(&format!("{READY_BANNER}; exec sleep 30"));
    config.readiness.probe_delay_ms = 1_000;
    let supervisor = supervisor_with_probe(config, probe.clone());
    supervisor.register_workspace("proj", dir.path());

    let status = supervisor.start("proj").await.unwrap();
    assert_eq!(status.state, ProjectState::Running);

    // The later probe success must not cause a second transition.
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    let after = supervisor.get_status("proj").unwrap();
    assert_eq!(after.state, ProjectState::Running);
    assert_eq!(after.instance_id, status.instance_id);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 0);

    supervisor.stop("proj").await;
}

#[tokio::test]
async fn real_http_probe_detects_listening_server() {
    let dir = tempfile::tempdir().unwrap();
    // Needs python3 for a throwaway HTTP server.
    if std::process::Command::new("sh")
        .args(["-c", "command -v python3"])
        .output()
        .map(|out| !out.status.success())
        .unwrap_or(true)
    {
        return;
    }
    let script = "exec python3 -m http.server \"$PORT\" --bind 127.0.0.1 >/dev/null 2>&1";
    let mut config = fast_probe_config(script);
    config.readiness.probe_delay_ms = 300;
    config.readiness.probe_interval_ms = 200;
    config.readiness.probe_retries = 10;
    config.readiness.timeout_ms = 10_000;
    let probe = Arc::new(ReqwestProbe::new(Duration::from_millis(500)).unwrap());
    let supervisor = supervisor_with_probe(config, probe);
    supervisor.register_workspace("proj", dir.path());

    let status = supervisor.start("proj").await.unwrap();
    assert_eq!(status.state, ProjectState::Running);

    supervisor.stop("proj").await;
}

#[tokio::test]
async fn silent_probe_and_silent_process_time_out_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = sh_config("exec sleep 30");
    config.readiness.timeout_ms = 300;
    let supervisor = supervisor(config);
    supervisor.register_workspace("proj", dir.path());

    let mut events = supervisor.broadcaster().subscribe("proj");
    assert!(supervisor.start("proj").await.is_err());

    let mut errors = 0;
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(200), events.recv()).await
    {
        if event.kind == preview_supervisor::broadcast::EventKind::Error {
            errors += 1;
        }
    }
    assert_eq!(errors, 1);
}
