//! Hand-off store delegating all waiting to a blocking queue.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam::channel::{self, select, Receiver, Sender, TryRecvError, TrySendError};

use crate::{CancelToken, Handoff, HandoffError, HandoffResult};

/// `SyncQueue` adapts a blocking queue to the [`Handoff`] interface.
///
/// The queue already orders items and parks callers internally, so no
/// condition variables live here: cancellation is observed by selecting on
/// the token's signal next to the queue operation.
pub struct SyncQueue<T> {
    shared: Arc<QueueShared<T>>,
}

struct QueueShared<T> {
    /// Taken on close; the queue disconnects once in-flight puts finish.
    sender: Mutex<Option<Sender<T>>>,
    receiver: Receiver<T>,
    capacity: Option<usize>,
}

impl<T> Clone for SyncQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> core::fmt::Debug for SyncQueue<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SyncQueue")
            .field("capacity", &self.shared.capacity)
            .field("len", &self.shared.receiver.len())
            .finish_non_exhaustive()
    }
}

impl<T> SyncQueue<T> {
    #[must_use]
    pub fn unbounded() -> Self {
        let (sender, receiver) = channel::unbounded();
        Self::from_parts(sender, receiver, None)
    }

    /// # Errors
    ///
    /// [`HandoffError::ZeroCapacity`] when `capacity` is 0; a zero-sized
    /// queue would be a rendezvous, not a buffer.
    pub fn bounded(capacity: usize) -> HandoffResult<Self> {
        if capacity == 0 {
            return Err(HandoffError::ZeroCapacity);
        }
        let (sender, receiver) = channel::bounded(capacity);
        Ok(Self::from_parts(sender, receiver, Some(capacity)))
    }

    fn from_parts(sender: Sender<T>, receiver: Receiver<T>, capacity: Option<usize>) -> Self {
        Self {
            shared: Arc::new(QueueShared {
                sender: Mutex::new(Some(sender)),
                receiver,
                capacity,
            }),
        }
    }

    fn sender(&self) -> HandoffResult<Sender<T>> {
        self.shared
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(HandoffError::Closed)
    }

    fn put_with(
        &self,
        value: T,
        timeout: Option<Duration>,
        cancel: &CancelToken,
    ) -> HandoffResult<()> {
        let sender = self.sender()?;

        let value = match sender.try_send(value) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Disconnected(_)) => return Err(HandoffError::Closed),
            Err(TrySendError::Full(value)) => value,
        };

        if cancel.is_cancelled() {
            return Err(HandoffError::Cancelled);
        }

        tracing::debug!(len = sender.len(), "queue is full, waiting");
        match timeout {
            None => select! {
                send(sender, value) -> sent => sent.map_err(|_| HandoffError::Closed),
                recv(cancel.signal()) -> _ => Err(HandoffError::Cancelled),
            },
            Some(timeout) => select! {
                send(sender, value) -> sent => sent.map_err(|_| HandoffError::Closed),
                recv(cancel.signal()) -> _ => Err(HandoffError::Cancelled),
                default(timeout) => Err(HandoffError::Timeout),
            },
        }
    }

    fn take_with(&self, timeout: Option<Duration>, cancel: &CancelToken) -> HandoffResult<T> {
        let receiver = &self.shared.receiver;

        match receiver.try_recv() {
            Ok(value) => return Ok(value),
            Err(TryRecvError::Disconnected) => return Err(HandoffError::Closed),
            Err(TryRecvError::Empty) => {}
        }

        if cancel.is_cancelled() {
            return Err(HandoffError::Cancelled);
        }

        tracing::debug!("queue is empty, waiting");
        match timeout {
            None => select! {
                recv(receiver) -> value => value.map_err(|_| HandoffError::Closed),
                recv(cancel.signal()) -> _ => Err(HandoffError::Cancelled),
            },
            Some(timeout) => select! {
                recv(receiver) -> value => value.map_err(|_| HandoffError::Closed),
                recv(cancel.signal()) -> _ => Err(HandoffError::Cancelled),
                default(timeout) => Err(HandoffError::Timeout),
            },
        }
    }
}

impl<T: Send> Handoff<T> for SyncQueue<T> {
    fn put(&self, value: T, cancel: &CancelToken) -> HandoffResult<()> {
        self.put_with(value, None, cancel)
    }

    fn put_timeout(&self, value: T, timeout: Duration, cancel: &CancelToken) -> HandoffResult<()> {
        self.put_with(value, Some(timeout), cancel)
    }

    fn take(&self, cancel: &CancelToken) -> HandoffResult<T> {
        self.take_with(None, cancel)
    }

    fn take_timeout(&self, timeout: Duration, cancel: &CancelToken) -> HandoffResult<T> {
        self.take_with(Some(timeout), cancel)
    }

    fn close(&self) -> bool {
        self.shared
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    fn is_closed(&self) -> bool {
        self.shared
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn len(&self) -> usize {
        self.shared.receiver.len()
    }

    fn capacity(&self) -> Option<usize> {
        self.shared.capacity
    }
}

#[cfg(test)]
mod test_sync_queue {
    use std::thread;
    use std::time::{Duration, Instant};

    use super::SyncQueue;
    use crate::{CancelToken, Handoff, HandoffError};

    #[test]
    fn unbounded_queue_never_applies_backpressure() {
        let queue = SyncQueue::unbounded();
        let cancel = CancelToken::new();

        for value in 1..=1000u64 {
            queue.put(value, &cancel).unwrap();
        }
        assert_eq!(queue.len(), 1000);

        let drained: Vec<u64> = (0..1000).map(|_| queue.take(&cancel).unwrap()).collect();
        assert_eq!(drained, (1..=1000).collect::<Vec<_>>());
    }

    #[test]
    #[ntest::timeout(5000)]
    fn bounded_queue_blocks_producer_until_consumer_takes() {
        let queue = SyncQueue::bounded(1).expect("should create");
        let cancel = CancelToken::new();
        queue.put(1u64, &cancel).unwrap();

        assert_eq!(
            queue.put_timeout(2, Duration::from_millis(50), &cancel),
            Err(HandoffError::Timeout)
        );

        let producer_side = queue.clone();
        let producer = thread::spawn(move || producer_side.put(3, &CancelToken::new()));

        thread::sleep(Duration::from_millis(50));
        assert_eq!(queue.take(&cancel), Ok(1));
        assert_eq!(producer.join().expect("should join"), Ok(()));
        assert_eq!(queue.take(&cancel), Ok(3));
    }

    #[test]
    #[ntest::timeout(5000)]
    fn take_timeout_on_empty_queue_reports_timeout() {
        let queue = SyncQueue::<u64>::unbounded();

        let started = Instant::now();
        let result = queue.take_timeout(Duration::from_secs(1), &CancelToken::new());

        assert_eq!(result, Err(HandoffError::Timeout));
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[test]
    #[ntest::timeout(5000)]
    fn cancel_releases_blocked_take() {
        let queue = SyncQueue::<u64>::unbounded();
        let cancel = CancelToken::new();

        let consumer_side = queue.clone();
        let consumer_cancel = cancel.clone();
        let consumer = thread::spawn(move || consumer_side.take(&consumer_cancel));

        thread::sleep(Duration::from_millis(100));
        cancel.cancel();
        assert_eq!(
            consumer.join().expect("should join"),
            Err(HandoffError::Cancelled)
        );

        let fresh = CancelToken::new();
        queue.put(8, &fresh).unwrap();
        assert_eq!(queue.take(&fresh), Ok(8));
    }

    #[test]
    #[ntest::timeout(5000)]
    fn close_drains_then_reports_closed() {
        let queue = SyncQueue::unbounded();
        let cancel = CancelToken::new();
        queue.put(1u64, &cancel).unwrap();

        assert!(queue.close());
        assert!(!queue.close());
        assert!(queue.is_closed());

        assert_eq!(queue.put(2, &cancel), Err(HandoffError::Closed));
        assert_eq!(queue.take(&cancel), Ok(1));
        assert_eq!(queue.take(&cancel), Err(HandoffError::Closed));
    }
}
