use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{BoundedChannel, CancelToken, HandoffResult, SyncQueue};

/// `Handoff` is the enqueue-or-wait / dequeue-or-wait capability shared by
/// every store a producer and consumer can meet on.
///
/// Every blocking call takes the caller's [`CancelToken`]; cancellation only
/// interrupts a call that actually has to wait.
pub trait Handoff<T>: Send + Sync {
    /// Blocks while the store is full, then appends `value`.
    ///
    /// # Errors
    ///
    /// [`crate::HandoffError::Cancelled`] when `cancel` fires during the wait,
    /// [`crate::HandoffError::Closed`] once the store was closed.
    fn put(&self, value: T, cancel: &CancelToken) -> HandoffResult<()>;

    /// Like [`Handoff::put`] but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Adds [`crate::HandoffError::Timeout`] to the errors of [`Handoff::put`].
    fn put_timeout(&self, value: T, timeout: Duration, cancel: &CancelToken) -> HandoffResult<()>;

    /// Blocks while the store is empty, then removes the oldest item.
    ///
    /// # Errors
    ///
    /// [`crate::HandoffError::Cancelled`] when `cancel` fires during the wait,
    /// [`crate::HandoffError::Closed`] once the store is closed and drained.
    fn take(&self, cancel: &CancelToken) -> HandoffResult<T>;

    /// Like [`Handoff::take`] but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Adds [`crate::HandoffError::Timeout`] to the errors of [`Handoff::take`].
    fn take_timeout(&self, timeout: Duration, cancel: &CancelToken) -> HandoffResult<T>;

    /// Marks end-of-stream. Returns false if already closed.
    fn close(&self) -> bool;

    fn is_closed(&self) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `None` for unbounded stores.
    fn capacity(&self) -> Option<usize>;
}

/// Which store backs an exchange, picked once at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backing {
    /// Mutex plus explicit "not full"/"not empty" condition variables.
    Manual { capacity: usize },

    /// Blocking queue; unbounded when `capacity` is `None`.
    Queue {
        #[serde(default)]
        capacity: Option<usize>,
    },
}

impl Default for Backing {
    fn default() -> Self {
        Backing::Manual { capacity: 1 }
    }
}

impl core::fmt::Display for Backing {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Backing::Manual { capacity } => write!(f, "manual(capacity={capacity})"),
            Backing::Queue {
                capacity: Some(capacity),
            } => write!(f, "queue(capacity={capacity})"),
            Backing::Queue { capacity: None } => write!(f, "queue(unbounded)"),
        }
    }
}

/// `create_channel` builds the condition-variable store with room for
/// `capacity` items.
///
/// # Errors
///
/// [`crate::HandoffError::ZeroCapacity`] when `capacity` is 0.
pub fn create_channel<T>(capacity: usize) -> HandoffResult<BoundedChannel<T>> {
    BoundedChannel::new(capacity)
}

/// `create_store` builds the store described by `backing` behind the
/// shared [`Handoff`] interface.
///
/// # Errors
///
/// [`crate::HandoffError::ZeroCapacity`] when a bound of 0 is requested.
pub fn create_store<T: Send + 'static>(backing: Backing) -> HandoffResult<Arc<dyn Handoff<T>>> {
    let store: Arc<dyn Handoff<T>> = match backing {
        Backing::Manual { capacity } => Arc::new(BoundedChannel::new(capacity)?),
        Backing::Queue { capacity: None } => Arc::new(SyncQueue::unbounded()),
        Backing::Queue {
            capacity: Some(capacity),
        } => Arc::new(SyncQueue::bounded(capacity)?),
    };
    tracing::debug!(%backing, "created hand-off store");
    Ok(store)
}
