//! Bounded hand-off store using a mutex and two condition variables.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::cancel::Interrupt;
use crate::{CancelToken, Handoff, HandoffError, HandoffResult};

/// A bounded FIFO between one producer and one consumer.
///
/// `put` parks on "not full" and `take` parks on "not empty"; both
/// re-check their condition in a loop after every wakeup.
///
/// # Examples
///
/// ```
/// use foundation_handoff::{BoundedChannel, CancelToken, Handoff};
/// use std::thread;
///
/// let channel = BoundedChannel::new(1).expect("capacity is non-zero");
///
/// let producer_side = channel.clone();
/// let producer = thread::spawn(move || {
///     let cancel = CancelToken::new();
///     for i in 1..=4u64 {
///         producer_side.put(i, &cancel).expect("should put");
///     }
/// });
///
/// let cancel = CancelToken::new();
/// let received: Vec<u64> = (0..4)
///     .map(|_| channel.take(&cancel).expect("should take"))
///     .collect();
///
/// producer.join().unwrap();
/// assert_eq!(received, vec![1, 2, 3, 4]);
/// ```
pub struct BoundedChannel<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for BoundedChannel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,

    /// Largest length ever observed, kept for invariant checks.
    peak: usize,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Send> Interrupt for Shared<T> {
    fn interrupt(&self) {
        // taking the gate orders this wakeup after any waiter has parked.
        drop(self.lock());
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }
}

impl<T> core::fmt::Debug for BoundedChannel<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("BoundedChannel")
            .field("capacity", &self.shared.capacity)
            .field("len", &state.items.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl<T> BoundedChannel<T> {
    /// Creates a channel that holds at most `capacity` items.
    ///
    /// # Errors
    ///
    /// [`HandoffError::ZeroCapacity`] when `capacity` is 0.
    pub fn new(capacity: usize) -> HandoffResult<Self> {
        if capacity == 0 {
            return Err(HandoffError::ZeroCapacity);
        }

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    items: VecDeque::with_capacity(capacity),
                    closed: false,
                    peak: 0,
                }),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
                capacity,
            }),
        })
    }

    /// Highest number of items the channel ever held at once.
    #[must_use]
    pub fn peak_len(&self) -> usize {
        self.shared.lock().peak
    }
}

impl<T: Send + 'static> BoundedChannel<T> {
    fn wait_while<'a, F>(
        &'a self,
        mut guard: MutexGuard<'a, State<T>>,
        condition: &Condvar,
        waiting_for: &'static str,
        deadline: Option<Instant>,
        cancel: &CancelToken,
        blocked: F,
    ) -> HandoffResult<MutexGuard<'a, State<T>>>
    where
        F: Fn(&State<T>) -> bool,
    {
        if !blocked(&guard) {
            return Ok(guard);
        }

        let interrupt: Arc<dyn Interrupt> = self.shared.clone();
        let _watch = cancel.watch(interrupt);

        while blocked(&guard) {
            if cancel.is_cancelled() {
                tracing::warn!(waiting_for, "wait cancelled");
                return Err(HandoffError::Cancelled);
            }

            tracing::debug!(waiting_for, len = guard.items.len(), "store blocked, waiting");
            guard = match deadline {
                None => condition
                    .wait(guard)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        tracing::debug!(waiting_for, "wait timed out");
                        return Err(HandoffError::Timeout);
                    }
                    condition
                        .wait_timeout(guard, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }

        Ok(guard)
    }

    fn put_until(
        &self,
        value: T,
        deadline: Option<Instant>,
        cancel: &CancelToken,
    ) -> HandoffResult<()> {
        let capacity = self.shared.capacity;
        let guard = self.shared.lock();
        let mut guard = self.wait_while(
            guard,
            &self.shared.not_full,
            "not full",
            deadline,
            cancel,
            |state| !state.closed && state.items.len() >= capacity,
        )?;

        if guard.closed {
            return Err(HandoffError::Closed);
        }

        guard.items.push_back(value);

        let len = guard.items.len();
        assert!(
            len <= capacity,
            "capacity violation: {len} items in a channel bounded at {capacity}"
        );
        guard.peak = guard.peak.max(len);

        drop(guard);
        self.shared.not_empty.notify_one();
        Ok(())
    }

    fn take_until(&self, deadline: Option<Instant>, cancel: &CancelToken) -> HandoffResult<T> {
        let guard = self.shared.lock();
        let mut guard = self.wait_while(
            guard,
            &self.shared.not_empty,
            "not empty",
            deadline,
            cancel,
            |state| !state.closed && state.items.is_empty(),
        )?;

        // closed and drained
        let Some(value) = guard.items.pop_front() else {
            return Err(HandoffError::Closed);
        };

        drop(guard);
        self.shared.not_full.notify_one();
        Ok(value)
    }
}

impl<T: Send + 'static> Handoff<T> for BoundedChannel<T> {
    fn put(&self, value: T, cancel: &CancelToken) -> HandoffResult<()> {
        self.put_until(value, None, cancel)
    }

    fn put_timeout(&self, value: T, timeout: Duration, cancel: &CancelToken) -> HandoffResult<()> {
        self.put_until(value, Instant::now().checked_add(timeout), cancel)
    }

    fn take(&self, cancel: &CancelToken) -> HandoffResult<T> {
        self.take_until(None, cancel)
    }

    fn take_timeout(&self, timeout: Duration, cancel: &CancelToken) -> HandoffResult<T> {
        self.take_until(Instant::now().checked_add(timeout), cancel)
    }

    fn close(&self) -> bool {
        let mut guard = self.shared.lock();
        if guard.closed {
            return false;
        }
        guard.closed = true;
        drop(guard);

        self.shared.not_empty.notify_all();
        self.shared.not_full.notify_all();
        true
    }

    fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    fn len(&self) -> usize {
        self.shared.lock().items.len()
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.shared.capacity)
    }
}
