//! Subscriber registry and event delivery.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_core::Stream;
use futures_util::StreamExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::event::{EventKind, StatusEvent};

/// Default queue depth per subscriber.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

struct SubscriberEntry {
    client_id: Uuid,
    sender: mpsc::Sender<StatusEvent>,
    connected_at: DateTime<Utc>,
    last_heartbeat: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Registry {
    subscribers: HashMap<String, Vec<SubscriberEntry>>,
    last_status: HashMap<String, StatusEvent>,
}

struct Shared {
    registry: Mutex<Registry>,
    capacity: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        // Registry updates never panic midway, so a poisoned lock still
        // holds consistent data.
        self.registry
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Public view of a registered subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberInfo {
    pub client_id: Uuid,
    pub project_id: String,
    pub connected_at: DateTime<Utc>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// In-memory pub-sub hub keyed by project id.
///
/// Cloning is cheap; all clones share the same registry.
#[derive(Clone)]
pub struct StatusBroadcaster {
    shared: Arc<Shared>,
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

impl std::fmt::Debug for StatusBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusBroadcaster")
            .field("capacity", &self.shared.capacity)
            .field("projects", &self.project_count())
            .finish()
    }
}

impl StatusBroadcaster {
    /// Create a broadcaster whose subscribers each buffer up to `capacity`
    /// events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry::default()),
                // Room for the connection ack plus the status snapshot.
                capacity: capacity.max(2),
            }),
        }
    }

    /// Subscribe to events for `project_id`.
    ///
    /// The returned subscription immediately yields a `connected` ack and,
    /// if one has been published, the last status snapshot. Dropping the
    /// subscription unsubscribes it.
    #[must_use]
    pub fn subscribe(&self, project_id: &str) -> Subscription {
        let client_id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(self.shared.capacity);

        {
            let mut registry = self.shared.lock();

            let _ = sender.try_send(StatusEvent::connected(project_id, client_id));
            if let Some(status) = registry.last_status.get(project_id) {
                let _ = sender.try_send(status.clone());
            }

            registry
                .subscribers
                .entry(project_id.to_string())
                .or_default()
                .push(SubscriberEntry {
                    client_id,
                    sender,
                    connected_at: Utc::now(),
                    last_heartbeat: None,
                });
        }

        tracing::debug!(project_id, %client_id, "Subscriber connected");

        Subscription {
            client_id,
            project_id: project_id.to_string(),
            stream: ReceiverStream::new(receiver),
            hub: Arc::downgrade(&self.shared),
        }
    }

    /// Remove a subscriber. Returns `true` if it was registered.
    pub fn unsubscribe(&self, project_id: &str, client_id: Uuid) -> bool {
        let removed = remove_subscribers(&self.shared, project_id, &[client_id]) > 0;
        if removed {
            tracing::debug!(project_id, %client_id, "Subscriber disconnected");
        }
        removed
    }

    /// Deliver `event` to every subscriber of `project_id`.
    ///
    /// Status-change events also become the snapshot sent to future
    /// subscribers. Subscribers whose stream is closed are removed; a full
    /// queue drops this event for that subscriber only. Returns the number
    /// of subscribers the event was queued for.
    pub fn publish(&self, project_id: &str, event: StatusEvent) -> usize {
        let snapshot: Vec<(Uuid, mpsc::Sender<StatusEvent>)> = {
            let mut registry = self.shared.lock();
            if event.kind == EventKind::StatusChange {
                registry
                    .last_status
                    .insert(project_id.to_string(), event.clone());
            }
            match registry.subscribers.get(project_id) {
                Some(entries) => entries
                    .iter()
                    .map(|e| (e.client_id, e.sender.clone()))
                    .collect(),
                None => return 0,
            }
        };

        let (delivered, dead) = deliver(&snapshot, &event);

        if !dead.is_empty() {
            let removed = remove_subscribers(&self.shared, project_id, &dead);
            tracing::debug!(project_id, removed, "Pruned dead subscribers");
        }

        delivered.len()
    }

    /// Send a ping to every subscriber of every project.
    ///
    /// Returns the number of subscribers that were reached.
    pub fn heartbeat(&self) -> usize {
        let projects: Vec<String> = self.shared.lock().subscribers.keys().cloned().collect();

        let mut reached = 0;
        for project_id in projects {
            let snapshot: Vec<(Uuid, mpsc::Sender<StatusEvent>)> = {
                let registry = self.shared.lock();
                registry
                    .subscribers
                    .get(&project_id)
                    .map(|entries| {
                        entries
                            .iter()
                            .map(|e| (e.client_id, e.sender.clone()))
                            .collect()
                    })
                    .unwrap_or_default()
            };

            let (delivered, dead) = deliver(&snapshot, &StatusEvent::ping(&project_id));
            reached += delivered.len();

            let now = Utc::now();
            let mut registry = self.shared.lock();
            if let Some(entries) = registry.subscribers.get_mut(&project_id) {
                for entry in entries.iter_mut() {
                    if delivered.contains(&entry.client_id) {
                        entry.last_heartbeat = Some(now);
                    }
                }
            }
            drop(registry);

            if !dead.is_empty() {
                remove_subscribers(&self.shared, &project_id, &dead);
            }
        }

        tracing::trace!(reached, "Heartbeat sent");
        reached
    }

    /// Last status snapshot published for `project_id`.
    #[must_use]
    pub fn last_status(&self, project_id: &str) -> Option<StatusEvent> {
        self.shared.lock().last_status.get(project_id).cloned()
    }

    /// Number of subscribers for `project_id`.
    #[must_use]
    pub fn subscriber_count(&self, project_id: &str) -> usize {
        self.shared
            .lock()
            .subscribers
            .get(project_id)
            .map_or(0, Vec::len)
    }

    /// Number of projects with at least one subscriber.
    #[must_use]
    pub fn project_count(&self) -> usize {
        self.shared.lock().subscribers.len()
    }

    /// Describe the subscribers of `project_id`.
    #[must_use]
    pub fn subscribers(&self, project_id: &str) -> Vec<SubscriberInfo> {
        self.shared
            .lock()
            .subscribers
            .get(project_id)
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| SubscriberInfo {
                        client_id: e.client_id,
                        project_id: project_id.to_string(),
                        connected_at: e.connected_at,
                        last_heartbeat: e.last_heartbeat,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Try to queue `event` on every sender. Returns `(delivered, dead)`.
fn deliver(
    snapshot: &[(Uuid, mpsc::Sender<StatusEvent>)],
    event: &StatusEvent,
) -> (Vec<Uuid>, Vec<Uuid>) {
    let mut delivered = Vec::with_capacity(snapshot.len());
    let mut dead = Vec::new();

    for (client_id, sender) in snapshot {
        match sender.try_send(event.clone()) {
            Ok(()) => delivered.push(*client_id),
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    project_id = %event.project_id,
                    %client_id,
                    kind = event.kind.as_str(),
                    "Subscriber queue full, dropping event"
                );
            }
            Err(TrySendError::Closed(_)) => dead.push(*client_id),
        }
    }

    (delivered, dead)
}

fn remove_subscribers(shared: &Shared, project_id: &str, client_ids: &[Uuid]) -> usize {
    let mut registry = shared.lock();
    let Some(entries) = registry.subscribers.get_mut(project_id) else {
        return 0;
    };

    let before = entries.len();
    entries.retain(|e| !client_ids.contains(&e.client_id));
    let removed = before - entries.len();

    if entries.is_empty() {
        registry.subscribers.remove(project_id);
    }
    removed
}

/// A live subscription to one project's events.
///
/// Implements [`Stream`]; the stream ends once the broadcaster is gone.
pub struct Subscription {
    client_id: Uuid,
    project_id: String,
    stream: ReceiverStream<StatusEvent>,
    hub: Weak<Shared>,
}

impl Subscription {
    /// Identifier assigned to this subscriber.
    #[must_use]
    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    /// Project this subscription observes.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Receive the next event.
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        self.stream.next().await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("client_id", &self.client_id)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

impl Stream for Subscription {
    type Item = StatusEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.stream).poll_next(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.hub.upgrade() {
            if remove_subscribers(&shared, &self.project_id, &[self.client_id]) > 0 {
                tracing::debug!(
                    project_id = %self.project_id,
                    client_id = %self.client_id,
                    "Subscriber dropped"
                );
            }
        }
    }
}

/// Spawn the periodic heartbeat task. Returns its handle for shutdown.
pub fn spawn_heartbeat(
    broadcaster: StatusBroadcaster,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    broadcaster.heartbeat();
                }
            }
        }
        tracing::debug!("Heartbeat task stopped");
    })
}
