//! Lifecycle event fan-out to connected observers.
//!
//! Every project id has its own set of subscribers. Publishing an event for
//! a project delivers it to each of them through a bounded per-subscriber
//! queue; a subscriber whose stream has gone away is pruned on the next
//! delivery attempt without affecting the others.

mod event;
mod hub;

pub use event::{EventKind, StatusEvent};
pub use hub::{
    spawn_heartbeat, StatusBroadcaster, SubscriberInfo, Subscription,
    DEFAULT_SUBSCRIBER_CAPACITY,
};
