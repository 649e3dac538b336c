//! Tests for preview process spawning and control.

use std::path::PathBuf;
use std::time::Duration;

use preview_supervisor::process::{PreviewProcess, PreviewProcessBuilder, SpawnError, PORT_ENV};
use tokio::io::AsyncReadExt;

#[test]
fn builder_passes_args_through() {
    let builder = PreviewProcessBuilder::new("npm").args(["run", "dev"]);

    assert_eq!(builder.program(), "npm");
    assert_eq!(builder.build_args(), vec!["run", "dev"]);
}

#[test]
fn builder_exports_port_first() {
    let builder = PreviewProcessBuilder::new("npm")
        .env("NODE_ENV", "development")
        .port(3101);
    let envs = builder.build_envs();

    assert_eq!(envs[0], (PORT_ENV.to_string(), "3101".to_string()));
    assert!(envs.contains(&("NODE_ENV".to_string(), "development".to_string())));
    assert_eq!(builder.get_port(), Some(3101));
}

#[test]
fn builder_without_port_sets_no_port_env() {
    let builder = PreviewProcessBuilder::new("npm");
    assert!(builder.build_envs().iter().all(|(key, _)| key != PORT_ENV));
}

#[test]
fn builder_working_dir() {
    let builder = PreviewProcessBuilder::new("npm").working_dir("/tmp/sample-project");

    assert_eq!(
        builder.get_working_dir(),
        Some(&PathBuf::from("/tmp/sample-project"))
    );
}

#[test]
fn spawn_missing_binary_is_not_found() {
    let builder = PreviewProcessBuilder::new("definitely-not-a-real-binary-xyz");
    let result = PreviewProcess::spawn(&builder);

    assert!(matches!(result, Err(SpawnError::NotFound(_))));
}

#[tokio::test]
async fn spawned_process_sees_port_env() {
    let builder = PreviewProcessBuilder::new("sh")
        .args(["-c", "echo \"port=$PORT\""])
        .port(3123);
    let mut process = PreviewProcess::spawn(&builder).unwrap();

    let mut stdout = process.take_stdout().unwrap();
    let mut output = String::new();
    stdout.read_to_string(&mut output).await.unwrap();
    process.wait().await.unwrap();

    assert_eq!(output.trim(), "port=3123");
}

#[tokio::test]
async fn spawned_process_runs_in_working_dir() {
    let dir = tempfile::tempdir().unwrap();
    let builder = PreviewProcessBuilder::new("sh")
        .args(["-c", "pwd"])
        .working_dir(dir.path());
    let mut process = PreviewProcess::spawn(&builder).unwrap();

    let mut stdout = process.take_stdout().unwrap();
    let mut output = String::new();
    stdout.read_to_string(&mut output).await.unwrap();
    process.wait().await.unwrap();

    let expected = dir.path().canonicalize().unwrap();
    assert_eq!(PathBuf::from(output.trim()).canonicalize().unwrap(), expected);
}

#[tokio::test]
async fn take_stdout_once() {
    let builder = PreviewProcessBuilder::new("echo").args(["hello"]);
    let mut process = PreviewProcess::spawn(&builder).unwrap();

    assert!(process.take_stdout().is_some());
    assert!(process.take_stdout().is_none());

    process.wait().await.unwrap();
}

#[tokio::test]
async fn try_wait_on_running_process() {
    let builder = PreviewProcessBuilder::new("sleep").args(["10"]);
    let mut process = PreviewProcess::spawn(&builder).unwrap();

    assert!(process.try_wait().unwrap().is_none());

    process.kill().await.unwrap();
}

#[tokio::test]
async fn kill_running_process() {
    let builder = PreviewProcessBuilder::new("sleep").args(["10"]);
    let mut process = PreviewProcess::spawn(&builder).unwrap();

    process.kill().await.unwrap();

    let status = process.wait().await.unwrap();
    assert!(!status.success());
}

#[cfg(unix)]
#[tokio::test]
async fn graceful_terminate_stops_cooperative_process() {
    let builder = PreviewProcessBuilder::new("sleep").args(["10"]);
    let mut process = PreviewProcess::spawn(&builder).unwrap();

    let forced = process
        .graceful_terminate(Duration::from_secs(2))
        .await
        .unwrap();
    assert!(!forced);
}

#[cfg(unix)]
#[tokio::test]
async fn graceful_terminate_escalates_when_term_ignored() {
    let builder = PreviewProcessBuilder::new("sh")
        .args(["-c", "trap '' TERM; while true; do sleep 0.05; done"]);
    let mut process = PreviewProcess::spawn(&builder).unwrap();
    // Let the shell install its trap.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = std::time::Instant::now();
    let forced = process
        .graceful_terminate(Duration::from_millis(200))
        .await
        .unwrap();

    assert!(forced);
    assert!(started.elapsed() < Duration::from_secs(5));
}
