//! Grace-window deletion queue.
//!
//! Stopped ephemeral workspaces are kept for a grace window so a quick
//! restart can reuse them. Entries live in a min-heap keyed by the instant
//! they become eligible for deletion; rescheduling bumps a generation
//! counter so older heap entries are skipped lazily.
//!
//! A sweep claims a due workspace by renaming it aside while holding the
//! queue lock, then deletes the renamed directory. A `cancel` that returns
//! `true` therefore always leaves the original path intact.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::ReclaimError;

/// Default minimum retention of a stopped workspace.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(30 * 60);

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug)]
struct Entry {
    path: PathBuf,
    generation: u64,
}

#[derive(Debug, Default)]
struct State {
    pending: HashMap<String, Entry>,
    queue: BinaryHeap<Reverse<(Instant, u64, String)>>,
    tracked: HashMap<String, PathBuf>,
    /// Claimed workspaces whose renamed directory still has to be removed.
    tombstones: Vec<(String, PathBuf)>,
    next_generation: u64,
}

/// Outcome of one sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Workspaces deleted in this sweep.
    pub deleted: Vec<String>,
    /// Deletions that failed and stay queued.
    pub failed: Vec<ReclaimError>,
}

/// Deferred-deletion queue for ephemeral workspaces.
///
/// Cloning is cheap; all clones share the same queue.
#[derive(Debug, Clone)]
pub struct WorkspaceReclaimer {
    state: Arc<Mutex<State>>,
    grace: Duration,
}

impl Default for WorkspaceReclaimer {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE)
    }
}

impl WorkspaceReclaimer {
    /// Create a reclaimer with the given grace window.
    #[must_use]
    pub fn new(grace: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            grace,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// The configured grace window.
    #[must_use]
    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Queue `path` for deletion once the grace window has elapsed.
    ///
    /// Scheduling an id that is already pending replaces its path and
    /// restarts its grace window.
    pub fn schedule_cleanup(&self, workspace_id: &str, path: impl Into<PathBuf>) {
        let path = path.into();
        let eligible_at = Instant::now() + self.grace;

        let mut state = self.lock();
        state.next_generation += 1;
        let generation = state.next_generation;
        state.queue.push(Reverse((
            eligible_at,
            generation,
            workspace_id.to_string(),
        )));
        let previous = state.pending.insert(
            workspace_id.to_string(),
            Entry {
                path: path.clone(),
                generation,
            },
        );
        drop(state);

        tracing::debug!(
            workspace_id,
            path = %path.display(),
            rescheduled = previous.is_some(),
            "Scheduled workspace cleanup"
        );
    }

    /// Remove a pending cleanup. Returns `true` if one existed.
    ///
    /// Once this returns, no sweep will touch the workspace's directory
    /// until it is scheduled again.
    pub fn cancel(&self, workspace_id: &str) -> bool {
        let removed = self.lock().pending.remove(workspace_id).is_some();
        if removed {
            tracing::debug!(workspace_id, "Cancelled workspace cleanup");
        }
        removed
    }

    /// Remember a live workspace so `force_cleanup_all` can remove it.
    pub fn track(&self, workspace_id: &str, path: impl Into<PathBuf>) {
        self.lock()
            .tracked
            .insert(workspace_id.to_string(), path.into());
    }

    /// Whether `workspace_id` is waiting for deletion.
    #[must_use]
    pub fn is_pending(&self, workspace_id: &str) -> bool {
        self.lock().pending.contains_key(workspace_id)
    }

    /// Number of workspaces waiting for deletion.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Delete every workspace whose grace window has elapsed.
    ///
    /// Failed deletions are logged and stay queued for the next sweep.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let claimed = self.claim_due(Instant::now(), &mut report);

        for (workspace_id, tombstone) in claimed {
            match remove_dir(&tombstone).await {
                Ok(()) => {
                    tracing::info!(
                        workspace_id = %workspace_id,
                        path = %tombstone.display(),
                        "Reclaimed workspace"
                    );
                    report.deleted.push(workspace_id);
                }
                Err(source) => {
                    tracing::warn!(
                        workspace_id = %workspace_id,
                        path = %tombstone.display(),
                        error = %source,
                        "Workspace deletion failed, will retry"
                    );
                    self.lock()
                        .tombstones
                        .push((workspace_id.clone(), tombstone.clone()));
                    report.failed.push(ReclaimError {
                        workspace_id,
                        path: tombstone,
                        source,
                    });
                }
            }
        }

        report
    }

    /// Claim every current entry eligible at `now` by renaming its directory
    /// aside under the lock. Returns the renamed paths to delete, including
    /// tombstones left over from earlier failed sweeps.
    fn claim_due(&self, now: Instant, report: &mut SweepReport) -> Vec<(String, PathBuf)> {
        let mut state = self.lock();
        let mut claimed = std::mem::take(&mut state.tombstones);
        let mut retry = Vec::new();

        while let Some(Reverse((eligible_at, _, _))) = state.queue.peek() {
            if *eligible_at > now {
                break;
            }
            let Some(Reverse((eligible_at, generation, workspace_id))) = state.queue.pop() else {
                break;
            };
            let Some(path) = state
                .pending
                .get(&workspace_id)
                .filter(|entry| entry.generation == generation)
                .map(|entry| entry.path.clone())
            else {
                continue;
            };

            let tombstone = tombstone_path(&path, generation);
            match std::fs::rename(&path, &tombstone) {
                Ok(()) => {
                    state.pending.remove(&workspace_id);
                    state.tracked.remove(&workspace_id);
                    claimed.push((workspace_id, tombstone));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    state.pending.remove(&workspace_id);
                    state.tracked.remove(&workspace_id);
                    tracing::debug!(workspace_id = %workspace_id, "Workspace already gone");
                    report.deleted.push(workspace_id);
                }
                Err(source) => {
                    tracing::warn!(
                        workspace_id = %workspace_id,
                        path = %path.display(),
                        error = %source,
                        "Workspace deletion failed, will retry"
                    );
                    retry.push(Reverse((eligible_at, generation, workspace_id.clone())));
                    report.failed.push(ReclaimError {
                        workspace_id,
                        path,
                        source,
                    });
                }
            }
        }

        state.queue.extend(retry);
        claimed
    }

    /// Delete every pending and tracked workspace immediately.
    ///
    /// Used at shutdown. Errors are logged, never returned. Returns the
    /// number of directories removed.
    pub fn force_cleanup_all(&self) -> usize {
        let paths: Vec<(String, PathBuf)> = {
            let mut state = self.lock();
            state.queue.clear();
            let mut paths: Vec<(String, PathBuf)> = state.tombstones.drain(..).collect();
            let mut live: HashMap<String, PathBuf> = state.tracked.drain().collect();
            for (id, entry) in state.pending.drain() {
                live.insert(id, entry.path);
            }
            paths.extend(live);
            paths
        };

        let mut removed = 0;
        for (workspace_id, path) in paths {
            match std::fs::remove_dir_all(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(
                        workspace_id = %workspace_id,
                        path = %path.display(),
                        error = %e,
                        "Forced cleanup failed"
                    );
                }
            }
        }

        tracing::info!(removed, "Forced workspace cleanup complete");
        removed
    }
}

/// Sibling path a claimed workspace is renamed to before deletion.
fn tombstone_path(path: &Path, generation: u64) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(format!(".reclaim-{generation}"));
    path.with_file_name(name)
}

async fn remove_dir(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Spawn the periodic sweep task. Returns its handle for shutdown.
pub fn spawn_sweeper(
    reclaimer: WorkspaceReclaimer,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let report = reclaimer.sweep().await;
                    if !report.deleted.is_empty() || !report.failed.is_empty() {
                        tracing::debug!(
                            deleted = report.deleted.len(),
                            failed = report.failed.len(),
                            "Sweep finished"
                        );
                    }
                }
            }
        }
        tracing::debug!("Sweeper stopped");
    })
}
