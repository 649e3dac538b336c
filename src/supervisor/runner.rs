//! Process supervisor for preview projects.
//!
//! This module provides the orchestration layer that connects the port
//! allocator, launch manifest, process spawner, readiness detection, status
//! broadcaster and workspace reclaimer together. Each project id owns at most
//! one live [`ProjectInstance`].

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::broadcast::{StatusBroadcaster, StatusEvent};
use crate::config::PreviewConfig;
use crate::manifest;
use crate::port::PortAllocator;
use crate::process::{PreviewProcess, PreviewProcessBuilder};
use crate::reclaim::WorkspaceReclaimer;

use super::error::{describe_exit, StartError, SupervisorError};
use super::instance::{ExitCause, ExitReport, ProjectInstance, ProjectStatus, StartOutcome};
use super::readiness::{
    probe_url, run_probe, HttpProbe, OutputSignal, ProbePlan, ReadinessPatterns, ReqwestProbe,
};
use super::settle::Settle;
use super::state::ProjectState;

/// Extra time allowed past two grace periods for the exit to be observed.
const STOP_WAIT_MARGIN: Duration = Duration::from_secs(1);

/// How long a natural exit waits for its output readers to hit end of stream.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

type Instances = HashMap<String, ProjectInstance>;

/// Supervisor for preview processes, one per project id.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct ProcessSupervisor {
    inner: Arc<Inner>,
}

struct Inner {
    config: PreviewConfig,
    allocator: PortAllocator,
    patterns: ReadinessPatterns,
    probe: Arc<dyn HttpProbe>,
    broadcaster: StatusBroadcaster,
    reclaimer: WorkspaceReclaimer,
    instances: Mutex<Instances>,
    workspaces: Mutex<HashMap<String, PathBuf>>,
    lifecycle: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// What `start()` finds for a project id.
enum Existing {
    Absent,
    Running(ProjectStatus),
    Starting(Settle<StartOutcome>),
    Other,
}

/// How the monitor task left its `select!`.
enum MonitorEvent {
    Exited(Option<i32>),
    Terminate,
    Kill,
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("instances", &self.inner.instances().len())
            .finish_non_exhaustive()
    }
}

impl ProcessSupervisor {
    /// Create a supervisor that probes readiness over HTTP with `reqwest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the readiness patterns, probe host or HTTP client
    /// cannot be set up from `config`.
    pub fn new(
        config: PreviewConfig,
        broadcaster: StatusBroadcaster,
        reclaimer: WorkspaceReclaimer,
    ) -> Result<Self, SupervisorError> {
        let probe = ReqwestProbe::new(config.readiness.probe_request_timeout())?;
        Self::with_probe(config, broadcaster, reclaimer, Arc::new(probe))
    }

    /// Create a supervisor with a custom HTTP probe.
    ///
    /// # Errors
    ///
    /// Returns an error if the readiness patterns or probe host are invalid.
    pub fn with_probe(
        config: PreviewConfig,
        broadcaster: StatusBroadcaster,
        reclaimer: WorkspaceReclaimer,
        probe: Arc<dyn HttpProbe>,
    ) -> Result<Self, SupervisorError> {
        let host: IpAddr = config
            .ports
            .host
            .parse()
            .map_err(|_| SupervisorError::InvalidHost(config.ports.host.clone()))?;
        let patterns = ReadinessPatterns::new(&config.readiness.extra_patterns)?;

        Ok(Self {
            inner: Arc::new(Inner {
                allocator: PortAllocator::new(host),
                patterns,
                probe,
                broadcaster,
                reclaimer,
                instances: Mutex::new(HashMap::new()),
                workspaces: Mutex::new(HashMap::new()),
                lifecycle: Mutex::new(HashMap::new()),
                config,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &PreviewConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn broadcaster(&self) -> &StatusBroadcaster {
        &self.inner.broadcaster
    }

    #[must_use]
    pub fn reclaimer(&self) -> &WorkspaceReclaimer {
        &self.inner.reclaimer
    }

    /// Start the preview for `project_id` and wait until it is ready.
    ///
    /// A running instance is returned unchanged. A start already in progress
    /// is joined rather than repeated. Any other existing instance is fully
    /// stopped first.
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::Start` if the port range is exhausted, the
    /// manifest cannot be patched, the process fails to spawn, reports its
    /// port in use, exits, is stopped, or does not become ready in time.
    pub async fn start(&self, project_id: &str) -> Result<ProjectStatus, SupervisorError> {
        match self.inner.existing(project_id) {
            Existing::Running(status) => return Ok(status),
            Existing::Starting(readiness) => return Ok(readiness.wait().await?),
            Existing::Absent | Existing::Other => {}
        }

        let lock = self.inner.lifecycle_lock(project_id);
        let readiness = {
            let _guard = lock.lock().await;
            match self.inner.existing(project_id) {
                Existing::Running(status) => return Ok(status),
                Existing::Starting(readiness) => readiness,
                Existing::Other => {
                    self.inner.stop_locked(project_id).await;
                    self.inner.launch(project_id).await
                }
                Existing::Absent => self.inner.launch(project_id).await,
            }
        };

        // The lifecycle lock is released here so that stop() can cancel.
        Ok(readiness.wait().await?)
    }

    /// Stop the preview for `project_id`.
    ///
    /// Returns `false` when no instance exists, in which case nothing is
    /// scheduled for cleanup.
    pub async fn stop(&self, project_id: &str) -> bool {
        let lock = self.inner.lifecycle_lock(project_id);
        let _guard = lock.lock().await;
        self.inner.stop_locked(project_id).await
    }

    /// Snapshot of the instance for `project_id`, if any.
    #[must_use]
    pub fn get_status(&self, project_id: &str) -> Option<ProjectStatus> {
        self.inner
            .instances()
            .get(project_id)
            .map(ProjectInstance::status)
    }

    /// Snapshots of every tracked instance, ordered by project id.
    #[must_use]
    pub fn list(&self) -> Vec<ProjectStatus> {
        let mut statuses: Vec<_> = self
            .inner
            .instances()
            .values()
            .map(ProjectInstance::status)
            .collect();
        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        statuses
    }

    /// Write `files` (relative path to content) into the project directory.
    ///
    /// The directory is the running instance's, else the registered
    /// workspace, else the shared default. Existing files are overwritten.
    /// Returns the number of files written.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if any path is absolute or escapes the
    /// directory (nothing is written then), or `Io` if a write fails.
    pub async fn save_files(
        &self,
        project_id: &str,
        files: &BTreeMap<String, String>,
    ) -> Result<usize, SupervisorError> {
        let root = self.inner.files_dir(project_id);
        let targets = files
            .iter()
            .map(|(relative, content)| Ok((resolve_relative(&root, relative)?, content)))
            .collect::<Result<Vec<_>, SupervisorError>>()?;

        for (path, content) in targets {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, content).await?;
        }

        tracing::info!(
            project_id,
            count = files.len(),
            dir = %root.display(),
            "Saved project files"
        );
        Ok(files.len())
    }

    /// Use `path` as the ephemeral workspace of `project_id`.
    ///
    /// The directory is tracked for forced cleanup and reclaimed after the
    /// project stops.
    pub fn register_workspace(&self, project_id: &str, path: impl Into<PathBuf>) {
        let path = path.into();
        self.inner.reclaimer.cancel(project_id);
        self.inner.reclaimer.track(project_id, path.clone());
        tracing::debug!(project_id, path = %path.display(), "Registered workspace");
        self.inner
            .workspaces()
            .insert(project_id.to_string(), path);
    }

    /// Stop every tracked instance.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.inner.instances().keys().cloned().collect();
        tracing::info!(count = ids.len(), "Stopping all previews");
        futures_util::future::join_all(ids.iter().map(|id| self.stop(id))).await;
    }
}

impl Inner {
    fn instances(&self) -> MutexGuard<'_, Instances> {
        self.instances
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn workspaces(&self) -> MutexGuard<'_, HashMap<String, PathBuf>> {
        self.workspaces
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lifecycle_lock(&self, project_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .lifecycle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(locks.entry(project_id.to_string()).or_default())
    }

    fn existing(&self, project_id: &str) -> Existing {
        match self.instances().get(project_id) {
            None => Existing::Absent,
            Some(instance) => match instance.state() {
                ProjectState::Running => Existing::Running(instance.status()),
                ProjectState::Starting => Existing::Starting(instance.readiness.clone()),
                _ => Existing::Other,
            },
        }
    }

    /// Working directory for a new instance and whether it is ephemeral.
    fn working_dir_for(&self, project_id: &str) -> (PathBuf, bool) {
        match self.workspaces().get(project_id) {
            Some(path) => (path.clone(), true),
            None => (self.config.workspace.shared_dir.clone(), false),
        }
    }

    fn files_dir(&self, project_id: &str) -> PathBuf {
        if let Some(instance) = self.instances().get(project_id) {
            return instance.working_dir.clone();
        }
        self.working_dir_for(project_id).0
    }

    fn preview_url(&self, port: u16) -> String {
        format!("http://{}:{port}", self.config.process.url_host)
    }

    fn publish_status(&self, status: &ProjectStatus) {
        match serde_json::to_value(status) {
            Ok(value) => {
                self.broadcaster
                    .publish(&status.id, StatusEvent::status_change(&status.id, value));
            }
            Err(e) => tracing::warn!(project_id = %status.id, error = %e, "Failed to encode status"),
        }
    }

    /// Create and spawn a fresh instance. Must hold the lifecycle lock.
    async fn launch(self: &Arc<Self>, project_id: &str) -> Settle<StartOutcome> {
        let (working_dir, ephemeral) = self.working_dir_for(project_id);
        self.reclaimer.cancel(project_id);

        let mut instance = ProjectInstance::new(
            project_id,
            working_dir.clone(),
            ephemeral,
            self.config.process.log_capacity,
        );
        let readiness = instance.readiness.clone();
        if let Err(e) = instance.transition(ProjectState::Starting) {
            tracing::error!(project_id, error = %e, "Fresh instance refused to start");
            return readiness;
        }
        let instance_id = instance.instance_id;
        let exited = instance.exited.clone();
        let terminate = instance.terminate.clone();
        let kill = instance.kill.clone();

        {
            let mut instances = self.instances();
            self.publish_status(&instance.status());
            instances.insert(project_id.to_string(), instance);
        }
        tracing::info!(
            project_id,
            %instance_id,
            dir = %working_dir.display(),
            "Starting preview"
        );

        let spawned = self
            .spawn_process(project_id, instance_id, &working_dir)
            .await;
        let (mut process, port) = match spawned {
            Ok(spawned) => spawned,
            Err(e) => {
                exited.settle(ExitReport {
                    cause: ExitCause::NotSpawned,
                    code: None,
                });
                self.resolve_start(project_id, instance_id, Err(e));
                if ephemeral {
                    self.reclaimer.schedule_cleanup(project_id, working_dir);
                }
                return readiness;
            }
        };

        if let Some(instance) = self.instances().get_mut(project_id) {
            instance.pid = process.id();
        }
        tracing::debug!(project_id, port, pid = ?process.id(), "Preview process spawned");

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = process.take_stdout() {
            readers.push(self.spawn_output_reader(project_id, instance_id, port, stdout));
        }
        if let Some(stderr) = process.take_stderr() {
            readers.push(self.spawn_output_reader(project_id, instance_id, port, stderr));
        }
        self.spawn_monitor(project_id, instance_id, process, readers, terminate, kill);
        self.spawn_readiness_race(project_id, instance_id, port, readiness.clone());

        readiness
    }

    async fn spawn_process(
        &self,
        project_id: &str,
        instance_id: Uuid,
        working_dir: &Path,
    ) -> Result<(PreviewProcess, u16), StartError> {
        let ports = &self.config.ports;
        let port = self.allocator.find_available(ports.start, ports.scan_width)?;
        if let Some(instance) = self.instances().get_mut(project_id) {
            if instance.instance_id == instance_id {
                instance.port = Some(port);
            }
        }

        let process_config = &self.config.process;
        manifest::patch_launch_port(
            working_dir,
            &process_config.manifest_file,
            &process_config.script_key,
            port,
        )
        .await
        .map_err(|e| StartError::Manifest(e.to_string()))?;

        let builder = PreviewProcessBuilder::new(&process_config.program)
            .args(&process_config.args)
            .port(port)
            .working_dir(working_dir);
        let process =
            PreviewProcess::spawn(&builder).map_err(|e| StartError::Spawn(e.to_string()))?;

        Ok((process, port))
    }

    fn spawn_output_reader<R>(
        self: &Arc<Self>,
        project_id: &str,
        instance_id: Uuid,
        port: u16,
        stream: R,
    ) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let inner = Arc::clone(self);
        let project_id = project_id.to_string();

        tokio::spawn(async move {
            let mut reader = BufReader::new(stream);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let raw = String::from_utf8_lossy(&buf);
                        inner.on_output_line(&project_id, instance_id, port, &raw);
                    }
                    Err(e) => {
                        tracing::debug!(project_id = %project_id, error = %e, "Output stream failed");
                        break;
                    }
                }
            }
        })
    }

    fn on_output_line(&self, project_id: &str, instance_id: Uuid, port: u16, raw: &str) {
        let line = self.patterns.strip_ansi(raw).trim_end().to_string();
        if line.trim().is_empty() {
            return;
        }

        let starting = {
            let mut instances = self.instances();
            let Some(instance) = matching(&mut instances, project_id, instance_id) else {
                return;
            };
            instance.logs.push_line(line.clone());
            self.broadcaster
                .publish(project_id, StatusEvent::logs(project_id, line.clone()));
            instance.state() == ProjectState::Starting
        };

        if !starting {
            return;
        }
        match self.patterns.classify(&line) {
            Some(OutputSignal::Ready) => {
                tracing::debug!(project_id, line = %line, "Readiness banner matched");
                self.resolve_start(project_id, instance_id, Ok(()));
            }
            Some(OutputSignal::PortInUse) => {
                self.resolve_start(project_id, instance_id, Err(StartError::PortInUse(port)));
            }
            None => {}
        }
    }

    fn spawn_monitor(
        self: &Arc<Self>,
        project_id: &str,
        instance_id: Uuid,
        mut process: PreviewProcess,
        readers: Vec<JoinHandle<()>>,
        terminate: CancellationToken,
        kill: CancellationToken,
    ) {
        let inner = Arc::clone(self);
        let project_id = project_id.to_string();
        let grace = self.config.process.terminate_grace();

        tokio::spawn(async move {
            let event = tokio::select! {
                status = process.wait() => {
                    MonitorEvent::Exited(status.ok().and_then(|s| s.code()))
                }
                () = terminate.cancelled() => MonitorEvent::Terminate,
                () = kill.cancelled() => MonitorEvent::Kill,
            };

            let report = match event {
                MonitorEvent::Exited(code) => {
                    // Trailing output is classified before the exit settles the
                    // start. A detached grandchild may hold the pipe open.
                    let drained = futures_util::future::join_all(readers);
                    if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, drained).await.is_err() {
                        tracing::debug!(project_id = %project_id, "Output still open after exit");
                    }
                    ExitReport {
                        cause: ExitCause::Natural,
                        code,
                    }
                }
                MonitorEvent::Terminate => {
                    match process.graceful_terminate(grace).await {
                        Ok(forced) => {
                            tracing::debug!(project_id = %project_id, forced, "Preview terminated");
                        }
                        Err(e) => {
                            tracing::warn!(
                                project_id = %project_id,
                                error = %e,
                                "Failed to terminate preview"
                            );
                        }
                    }
                    ExitReport {
                        cause: ExitCause::Terminated,
                        code: None,
                    }
                }
                MonitorEvent::Kill => {
                    if let Err(e) = process.kill().await {
                        tracing::warn!(project_id = %project_id, error = %e, "Failed to kill preview");
                    }
                    ExitReport {
                        cause: ExitCause::Killed,
                        code: None,
                    }
                }
            };

            inner.on_exit(&project_id, instance_id, report);
        });
    }

    fn spawn_readiness_race(
        self: &Arc<Self>,
        project_id: &str,
        instance_id: Uuid,
        port: u16,
        readiness: Settle<StartOutcome>,
    ) {
        let inner = Arc::clone(self);
        let project_id = project_id.to_string();
        let readiness_config = &self.config.readiness;
        let timeout = readiness_config.timeout();
        let plan = ProbePlan {
            delay: readiness_config.probe_delay(),
            retries: readiness_config.probe_retries,
            interval: readiness_config.probe_interval(),
        };
        let url = probe_url(self.allocator.host(), port);

        tokio::spawn(async move {
            let probe = async {
                let answered = match &url {
                    Ok(url) => run_probe(inner.probe.as_ref(), url, plan).await,
                    Err(e) => {
                        tracing::warn!(project_id = %project_id, error = %e, "Cannot build probe URL");
                        false
                    }
                };
                if answered {
                    inner.resolve_start(&project_id, instance_id, Ok(()));
                }
                // An exhausted probe leaves the race to the remaining signals.
                std::future::pending::<()>().await;
            };

            tokio::select! {
                _ = readiness.wait() => {}
                () = probe => {}
                () = tokio::time::sleep(timeout) => {
                    inner.resolve_start(
                        &project_id,
                        instance_id,
                        Err(StartError::ReadinessTimeout(timeout)),
                    );
                }
            }
        });
    }

    fn resolve_start(
        &self,
        project_id: &str,
        instance_id: Uuid,
        outcome: Result<(), StartError>,
    ) -> bool {
        let mut instances = self.instances();
        match matching(&mut instances, project_id, instance_id) {
            Some(instance) => self.resolve_locked(instance, outcome),
            None => false,
        }
    }

    /// Settle the start race of `instance`. Only the first caller wins; the
    /// state change and its events are applied by the winner alone.
    fn resolve_locked(&self, instance: &mut ProjectInstance, outcome: Result<(), StartError>) -> bool {
        if instance.state() != ProjectState::Starting {
            return false;
        }

        let next = if outcome.is_ok() {
            ProjectState::Running
        } else {
            ProjectState::Error
        };
        if instance.transition(next).is_err() {
            return false;
        }

        let project_id = instance.project_id.clone();
        match &outcome {
            Ok(()) => instance.url = instance.port.map(|port| self.preview_url(port)),
            Err(e) => instance.last_error = Some(e.to_string()),
        }
        let status = instance.status();
        instance.readiness.settle(match &outcome {
            Ok(()) => Ok(status.clone()),
            Err(e) => Err(e.clone()),
        });

        self.publish_status(&status);
        match outcome {
            Ok(()) => {
                if let Some(url) = status.url {
                    tracing::info!(project_id = %project_id, url = %url, "Preview ready");
                    self.broadcaster
                        .publish(&project_id, StatusEvent::url(&project_id, url));
                }
            }
            Err(error) => {
                tracing::warn!(project_id = %project_id, error = %error, "Preview failed to start");
                self.broadcaster
                    .publish(&project_id, StatusEvent::error(&project_id, error.to_string()));
                if matches!(
                    error,
                    StartError::PortInUse(_) | StartError::ReadinessTimeout(_)
                ) {
                    instance.kill.cancel();
                }
            }
        }
        true
    }

    fn on_exit(&self, project_id: &str, instance_id: Uuid, report: ExitReport) {
        let mut instances = self.instances();
        let Some(instance) = matching(&mut instances, project_id, instance_id) else {
            return;
        };
        instance.pid = None;
        tracing::debug!(project_id, cause = ?report.cause, code = ?report.code, "Preview exited");

        let state = instance.state();
        if report.cause == ExitCause::Natural {
            match state {
                ProjectState::Starting => {
                    self.resolve_locked(instance, Err(StartError::Exited(report.code)));
                }
                ProjectState::Running => self.on_crash(instance, report.code),
                _ => {}
            }
        }

        // Must precede the exit notice awaited by stop().
        if instance.ephemeral
            && report.cause != ExitCause::Terminated
            && state != ProjectState::Stopping
        {
            self.reclaimer
                .schedule_cleanup(project_id, instance.working_dir.clone());
        }
        instance.exited.settle(report);
    }

    /// A running process exited on its own.
    fn on_crash(&self, instance: &mut ProjectInstance, code: Option<i32>) {
        let message = format!("Process exited unexpectedly ({})", describe_exit(code));
        let next = if code == Some(0) {
            ProjectState::Stopped
        } else {
            ProjectState::Error
        };
        if instance.transition(next).is_err() {
            return;
        }

        instance.url = None;
        if next == ProjectState::Error {
            instance.last_error = Some(message.clone());
        }
        tracing::warn!(project_id = %instance.project_id, code = ?code, "{message}");

        self.publish_status(&instance.status());
        self.broadcaster.publish(
            &instance.project_id,
            StatusEvent::error(&instance.project_id, message),
        );
    }

    /// Stop and deregister the instance. Must hold the lifecycle lock.
    async fn stop_locked(&self, project_id: &str) -> bool {
        let (instance_id, exited, terminate) = {
            let mut instances = self.instances();
            let Some(instance) = instances.get_mut(project_id) else {
                tracing::debug!(project_id, "Stop requested for unknown project");
                return false;
            };
            tracing::info!(project_id, state = %instance.state(), "Stopping preview");

            match instance.state() {
                ProjectState::Starting => {
                    self.resolve_locked(instance, Err(StartError::Cancelled));
                }
                ProjectState::Running => {
                    if instance.transition(ProjectState::Stopping).is_ok() {
                        self.publish_status(&instance.status());
                    }
                }
                _ => {}
            }
            (
                instance.instance_id,
                instance.exited.clone(),
                instance.terminate.clone(),
            )
        };

        terminate.cancel();
        let wait = self.config.process.terminate_grace() * 2 + STOP_WAIT_MARGIN;
        if tokio::time::timeout(wait, exited.wait()).await.is_err() {
            tracing::warn!(project_id, ?wait, "Preview exit not observed, deregistering anyway");
        }

        let removed = {
            let mut instances = self.instances();
            let owned = instances
                .get(project_id)
                .is_some_and(|instance| instance.instance_id == instance_id);
            let removed = if owned {
                instances.remove(project_id)
            } else {
                None
            };
            if let Some(mut instance) = removed {
                if instance.state() == ProjectState::Stopping
                    && instance.transition(ProjectState::Stopped).is_ok()
                {
                    instance.url = None;
                    instance.pid = None;
                    self.publish_status(&instance.status());
                }
                Some(instance)
            } else {
                None
            }
        };

        if let Some(instance) = removed {
            if instance.ephemeral {
                self.reclaimer
                    .schedule_cleanup(project_id, instance.working_dir);
            }
            tracing::info!(project_id, "Preview stopped");
        }
        true
    }
}

fn matching<'a>(
    instances: &'a mut Instances,
    project_id: &str,
    instance_id: Uuid,
) -> Option<&'a mut ProjectInstance> {
    instances
        .get_mut(project_id)
        .filter(|instance| instance.instance_id == instance_id)
}

/// Join `relative` onto `root`, rejecting absolute paths and `..`.
fn resolve_relative(root: &Path, relative: &str) -> Result<PathBuf, SupervisorError> {
    let path = Path::new(relative);
    let mut has_name = false;
    for component in path.components() {
        match component {
            Component::Normal(_) => has_name = true,
            Component::CurDir => {}
            _ => return Err(SupervisorError::InvalidPath(relative.to_string())),
        }
    }
    if !has_name {
        return Err(SupervisorError::InvalidPath(relative.to_string()));
    }
    Ok(root.join(path))
}
