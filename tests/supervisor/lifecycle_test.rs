//! Start/stop lifecycle against real child processes.

use std::time::Duration;

use preview_supervisor::broadcast::EventKind;
use preview_supervisor::supervisor::{ProjectState, StartError, SupervisorError};

use super::{sh_config, supervisor, wait_for_state, READY_BANNER};

fn ready_then_sleep() -> String {
    format!("{READY_BANNER}; exec sleep 30")
}

#[tokio::test]
async fn start_becomes_running_on_banner() {
    let dir = tempfile::tempdir().unwrap();
    let config = sh_config(&ready_then_sleep());
    let (range_start, width) = (config.ports.start, config.ports.scan_width);
    let supervisor = supervisor(config);
    supervisor.register_workspace("proj", dir.path());

    let status = tokio::time::timeout(Duration::from_secs(2), supervisor.start("proj"))
        .await
        .expect("ready well before the probe and timeout")
        .unwrap();

    assert_eq!(status.state, ProjectState::Running);
    let port = status.port.unwrap();
    assert!(port >= range_start && u32::from(port) < u32::from(range_start) + u32::from(width));
    assert_eq!(status.url.as_deref(), Some(format!("http://localhost:{port}").as_str()));
    assert!(status.pid.is_some());
    assert!(status.ephemeral);

    assert!(supervisor.stop("proj").await);
    assert!(supervisor.get_status("proj").is_none());
}

#[tokio::test]
async fn start_on_running_returns_existing_instance() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = supervisor(sh_config(&ready_then_sleep()));
    supervisor.register_workspace("proj", dir.path());

    let first = supervisor.start("proj").await.unwrap();
    let second = supervisor.start("proj").await.unwrap();

    assert_eq!(first.instance_id, second.instance_id);
    assert_eq!(first.pid, second.pid);

    supervisor.stop("proj").await;
}

#[tokio::test]
async fn concurrent_starts_spawn_once() {
    let dir = tempfile::tempdir().unwrap();
    let script = format!("echo spawned >> spawns.log; sleep 0.3; {}", ready_then_sleep());
    let supervisor = supervisor(sh_config(&script));
    supervisor.register_workspace("proj", dir.path());

    let (a, b, c) = tokio::join!(
        supervisor.start("proj"),
        supervisor.start("proj"),
        supervisor.start("proj"),
    );
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

    assert_eq!(a.instance_id, b.instance_id);
    assert_eq!(b.instance_id, c.instance_id);
    let spawns = std::fs::read_to_string(dir.path().join("spawns.log")).unwrap();
    assert_eq!(spawns.lines().count(), 1);

    supervisor.stop("proj").await;
}

#[tokio::test]
async fn stop_while_starting_settles_start() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = supervisor(sh_config("exec sleep 30"));
    supervisor.register_workspace("proj", dir.path());

    let starter = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.start("proj").await })
    };
    assert!(wait_for_state(&supervisor, "proj", ProjectState::Starting, Duration::from_secs(2)).await);

    assert!(supervisor.stop("proj").await);

    let result = tokio::time::timeout(Duration::from_secs(2), starter)
        .await
        .expect("start settles after stop")
        .unwrap();
    assert!(matches!(
        result,
        Err(SupervisorError::Start(StartError::Cancelled))
    ));
    assert!(supervisor.get_status("proj").is_none());

    let last = supervisor.broadcaster().last_status("proj").unwrap();
    assert_eq!(last.data["state"], "error");
}

#[tokio::test]
async fn premature_exit_fails_start() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = supervisor(sh_config("echo compiling; exit 3"));
    supervisor.register_workspace("proj", dir.path());

    let err = supervisor.start("proj").await.unwrap_err();
    assert!(matches!(
        err,
        SupervisorError::Start(StartError::Exited(Some(3)))
    ));

    let status = supervisor.get_status("proj").unwrap();
    assert_eq!(status.state, ProjectState::Error);
    assert!(status.last_error.unwrap().contains("exit code 3"));
    assert!(supervisor.reclaimer().is_pending("proj"));
}

#[tokio::test]
async fn readiness_timeout_fails_start_and_kills() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = sh_config("exec sleep 30");
    config.readiness.timeout_ms = 300;
    let supervisor = supervisor(config);
    supervisor.register_workspace("proj", dir.path());

    let err = supervisor.start("proj").await.unwrap_err();
    assert!(matches!(
        err,
        SupervisorError::Start(StartError::ReadinessTimeout(_))
    ));
    assert_eq!(
        supervisor.get_status("proj").unwrap().state,
        ProjectState::Error
    );

    let mut reaped = false;
    for _ in 0..100 {
        if supervisor.get_status("proj").unwrap().pid.is_none() {
            reaped = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(reaped, "timed-out process should be killed");
}

#[tokio::test]
async fn port_in_use_output_fails_start_naming_port() {
    let dir = tempfile::tempdir().unwrap();
    let script = r#"echo "Error: listen EADDRINUSE: address already in use :::$PORT"; exec sleep 30"#;
    let supervisor = supervisor(sh_config(script));
    supervisor.register_workspace("proj", dir.path());

    let err = supervisor.start("proj").await.unwrap_err();
    let SupervisorError::Start(StartError::PortInUse(port)) = err else {
        panic!("expected PortInUse, got {err:?}");
    };

    let status = supervisor.get_status("proj").unwrap();
    assert_eq!(status.state, ProjectState::Error);
    assert_eq!(status.port, Some(port));
    assert!(status.last_error.unwrap().contains(&port.to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn port_in_use_then_exit_still_names_port() {
    let script =
        r#"echo "Error: listen EADDRINUSE: address already in use :::$PORT" >&2; exit 1"#;

    for _ in 0..30 {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor(sh_config(script));
        supervisor.register_workspace("proj", dir.path());

        let err = supervisor.start("proj").await.unwrap_err();
        let SupervisorError::Start(StartError::PortInUse(port)) = err else {
            panic!("expected PortInUse, got {err:?}");
        };
        let status = supervisor.get_status("proj").unwrap();
        assert_eq!(status.state, ProjectState::Error);
        assert!(status.last_error.unwrap().contains(&port.to_string()));
    }
}

#[tokio::test]
async fn crash_after_running_sets_error() {
    let dir = tempfile::tempdir().unwrap();
    let script = format!("{READY_BANNER}; sleep 0.2; exit 1");
    let supervisor = supervisor(sh_config(&script));
    supervisor.register_workspace("proj", dir.path());

    supervisor.start("proj").await.unwrap();
    assert!(wait_for_state(&supervisor, "proj", ProjectState::Error, Duration::from_secs(3)).await);

    let status = supervisor.get_status("proj").unwrap();
    assert!(status.last_error.unwrap().contains("exit code 1"));
    assert!(status.url.is_none());
    assert!(supervisor.reclaimer().is_pending("proj"));
}

#[tokio::test]
async fn clean_exit_after_running_sets_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let script = format!("{READY_BANNER}; sleep 0.2; exit 0");
    let supervisor = supervisor(sh_config(&script));
    supervisor.register_workspace("proj", dir.path());

    let mut events = supervisor.broadcaster().subscribe("proj");
    supervisor.start("proj").await.unwrap();
    assert!(wait_for_state(&supervisor, "proj", ProjectState::Stopped, Duration::from_secs(3)).await);

    // The exit is still reported to observers.
    let mut saw_error = false;
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(200), events.recv()).await
    {
        if event.kind == EventKind::Error {
            assert!(event.data["message"]
                .as_str()
                .unwrap()
                .contains("exited unexpectedly"));
            saw_error = true;
        }
    }
    assert!(saw_error);
}

#[tokio::test]
async fn restart_after_error_is_permitted() {
    let dir = tempfile::tempdir().unwrap();
    let script = format!("if [ -f ok ]; then {}; else touch ok; exit 1; fi", ready_then_sleep());
    let supervisor = supervisor(sh_config(&script));
    supervisor.register_workspace("proj", dir.path());

    assert!(supervisor.start("proj").await.is_err());
    let failed = supervisor.get_status("proj").unwrap();
    assert_eq!(failed.state, ProjectState::Error);

    let status = supervisor.start("proj").await.unwrap();
    assert_eq!(status.state, ProjectState::Running);
    assert_ne!(status.instance_id, failed.instance_id);
    assert!(!supervisor.reclaimer().is_pending("proj"));

    supervisor.stop("proj").await;
}

#[tokio::test]
async fn stop_running_publishes_stopping_then_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = supervisor(sh_config(&ready_then_sleep()));
    supervisor.register_workspace("proj", dir.path());
    supervisor.start("proj").await.unwrap();

    let mut events = supervisor.broadcaster().subscribe("proj");
    assert!(supervisor.stop("proj").await);

    let mut states = Vec::new();
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(100), events.recv()).await
    {
        if event.kind == EventKind::StatusChange {
            states.push(event.data["state"].as_str().unwrap().to_string());
        }
    }
    // The snapshot on subscribe is the running status.
    assert_eq!(states, vec!["running", "stopping", "stopped"]);
    assert!(supervisor.reclaimer().is_pending("proj"));
}

#[tokio::test]
async fn stop_escalates_when_term_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let script = format!("trap '' TERM; {READY_BANNER}; while true; do sleep 0.05; done");
    let mut config = sh_config(&script);
    config.process.terminate_grace_ms = 200;
    let supervisor = supervisor(config);
    supervisor.register_workspace("proj", dir.path());
    supervisor.start("proj").await.unwrap();

    let stopped = tokio::time::timeout(Duration::from_secs(3), supervisor.stop("proj")).await;
    assert_eq!(stopped, Ok(true));
    assert!(supervisor.get_status("proj").is_none());
}

#[tokio::test]
async fn shared_directory_is_never_reclaimed() {
    let shared = tempfile::tempdir().unwrap();
    let mut config = sh_config(&ready_then_sleep());
    config.workspace.shared_dir = shared.path().to_path_buf();
    let supervisor = supervisor(config);

    let status = supervisor.start("proj").await.unwrap();
    assert!(!status.ephemeral);

    supervisor.stop("proj").await;
    assert!(!supervisor.reclaimer().is_pending("proj"));
}

#[tokio::test]
async fn stop_unknown_project_is_noop() {
    let supervisor = supervisor(sh_config("exit 0"));

    assert!(!supervisor.stop("proj-x").await);
    assert_eq!(supervisor.reclaimer().pending_count(), 0);
}

#[tokio::test]
async fn subscribers_observe_start_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = supervisor(sh_config(&ready_then_sleep()));
    supervisor.register_workspace("proj", dir.path());

    let mut events = supervisor.broadcaster().subscribe("proj");
    let status = supervisor.start("proj").await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(100), events.recv()).await
    {
        kinds.push((event.kind, event.data));
    }

    assert_eq!(kinds[0].0, EventKind::Connected);
    let states: Vec<&str> = kinds
        .iter()
        .filter(|(kind, _)| *kind == EventKind::StatusChange)
        .filter_map(|(_, data)| data["state"].as_str())
        .collect();
    assert_eq!(states, vec!["starting", "running"]);
    assert!(kinds
        .iter()
        .any(|(kind, data)| *kind == EventKind::LogsUpdate
            && data["line"].as_str().unwrap().contains("Local:")));
    assert!(kinds
        .iter()
        .any(|(kind, data)| *kind == EventKind::UrlChange
            && data["url"] == status.url.clone().unwrap().as_str()));

    supervisor.stop("proj").await;
}

#[tokio::test]
async fn shutdown_stops_every_instance() {
    let supervisor = supervisor(sh_config(&ready_then_sleep()));
    let dirs: Vec<_> = (0..3).map(|_| tempfile::tempdir().unwrap()).collect();
    for (i, dir) in dirs.iter().enumerate() {
        let id = format!("proj-{i}");
        supervisor.register_workspace(&id, dir.path());
        supervisor.start(&id).await.unwrap();
    }
    assert_eq!(supervisor.list().len(), 3);

    supervisor.shutdown().await;

    assert!(supervisor.list().is_empty());
    assert_eq!(supervisor.reclaimer().pending_count(), 3);
}
