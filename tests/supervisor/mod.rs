//! Supervisor module tests.
//!
//! These drive real `sh` child processes, so they only run on Unix.

#![cfg(unix)]

mod lifecycle_test;
mod readiness_test;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use preview_supervisor::broadcast::StatusBroadcaster;
use preview_supervisor::config::PreviewConfig;
use preview_supervisor::reclaim::WorkspaceReclaimer;
use preview_supervisor::supervisor::{HttpProbe, ProcessSupervisor, ProjectState};
use url::Url;

/// Banner a Vite-style dev server prints once it is listening.
pub const READY_BANNER: &str = r#"echo "  - Local:        http://localhost:$PORT""#;

/// Probe that never gets an answer.
pub struct SilentProbe;

#[async_trait]
impl HttpProbe for SilentProbe {
    async fn check(&self, _url: &Url) -> bool {
        false
    }
}

/// Config that launches `sh -c <script>` with short timeouts.
pub fn sh_config(script: &str) -> PreviewConfig {
    let mut config = PreviewConfig::default();
    config.process.program = "sh".to_string();
    config.process.args = vec!["-c".to_string(), script.to_string()];
    config.process.terminate_grace_ms = 500;
    config.readiness.timeout_ms = 5_000;
    config.readiness.probe_delay_ms = 60_000;
    config
}

pub fn supervisor(config: PreviewConfig) -> ProcessSupervisor {
    supervisor_with_probe(config, Arc::new(SilentProbe))
}

pub fn supervisor_with_probe(config: PreviewConfig, probe: Arc<dyn HttpProbe>) -> ProcessSupervisor {
    let reclaimer = WorkspaceReclaimer::new(config.workspace.grace());
    ProcessSupervisor::with_probe(config, StatusBroadcaster::default(), reclaimer, probe).unwrap()
}

/// Poll until `project_id` reaches `state` or `within` elapses.
pub async fn wait_for_state(
    supervisor: &ProcessSupervisor,
    project_id: &str,
    state: ProjectState,
    within: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if supervisor
            .get_status(project_id)
            .is_some_and(|status| status.state == state)
        {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Verify the public supervisor types are exported from the library.
#[test]
fn test_all_supervisor_types_exported() {
    use preview_supervisor::supervisor::{
        ExitCause, LogBuffer, ProjectStateMachine, ProjectStatus, Settle, StartError,
        SupervisorError,
    };

    let _ = ProjectStateMachine::new();
    let _ = LogBuffer::new(10);
    let _: Settle<u8> = Settle::new();
    let _: fn() -> SupervisorError = || SupervisorError::InvalidPath("..".to_string());
    let _ = StartError::Cancelled;
    let _ = ExitCause::Natural;
    let _: Option<ProjectStatus> = None;
}
