//! The two actors of an exchange.
//!
//! A [`ProducerTask`] puts `1..=count` into a shared store and a
//! [`ConsumerTask`] takes items until it sees its terminal value or the
//! store reports end-of-stream. Both are plain state machines stepped by
//! whatever thread owns them.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::{CancelToken, Handoff, HandoffError, HandoffResult};

/// Store both tasks of an exchange share.
pub type SharedStore = Arc<dyn Handoff<u64>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Idle,
    /// The value has been handed to the store.
    Producing(u64),
    Done,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Consuming,
    Terminated,
    Cancelled,
}

fn pause(interval: Duration) {
    if !interval.is_zero() {
        thread::sleep(interval);
    }
}

pub struct ProducerTask {
    store: SharedStore,
    count: u64,
    pause: Duration,
    close_on_finish: bool,
    cancel: CancelToken,
    state: ProducerState,
    produced: u64,
}

impl ProducerTask {
    /// Producer of the sequence `1..=count` into `store`.
    #[must_use]
    pub fn new(store: SharedStore, count: u64) -> Self {
        Self {
            store,
            count,
            pause: Duration::ZERO,
            close_on_finish: false,
            cancel: CancelToken::new(),
            state: ProducerState::Idle,
            produced: 0,
        }
    }

    /// Sleep taken after every successful put.
    #[must_use]
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Close the store once the last value went in.
    #[must_use]
    pub fn close_on_finish(mut self, close: bool) -> Self {
        self.close_on_finish = close;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn state(&self) -> ProducerState {
        self.state
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Values successfully handed to the store so far.
    #[must_use]
    pub fn produced(&self) -> u64 {
        self.produced
    }

    fn finish(&mut self) {
        if self.close_on_finish && self.store.close() {
            tracing::debug!("producer closed the store");
        }
        self.state = ProducerState::Done;
    }

    /// Advances the state machine by one put.
    ///
    /// # Errors
    ///
    /// Whatever the store's `put` surfaces. On [`HandoffError::Cancelled`]
    /// the producer moves to [`ProducerState::Cancelled`] for good.
    pub fn step(&mut self) -> HandoffResult<ProducerState> {
        let next = match self.state {
            ProducerState::Idle => 1,
            ProducerState::Producing(last) => last + 1,
            finished @ (ProducerState::Done | ProducerState::Cancelled) => return Ok(finished),
        };

        if next > self.count {
            self.finish();
            return Ok(self.state);
        }

        if self.cancel.is_cancelled() {
            return Err(self.cancelled());
        }

        tracing::info!("Producing : {next}");
        if let Err(err) = self.store.put(next, &self.cancel) {
            if err.is_cancelled() {
                return Err(self.cancelled());
            }
            tracing::error!(value = next, error = %err, "producer could not put");
            return Err(err);
        }

        self.produced = next;
        self.state = ProducerState::Producing(next);
        pause(self.pause);

        if next == self.count {
            self.finish();
        }
        Ok(self.state)
    }

    fn cancelled(&mut self) -> HandoffError {
        tracing::warn!(produced = self.produced, "producer cancelled");
        self.state = ProducerState::Cancelled;
        HandoffError::Cancelled
    }

    /// Steps until [`ProducerState::Done`], returning how many values went in.
    ///
    /// # Errors
    ///
    /// The first error [`Self::step`] returns.
    pub fn run(&mut self) -> HandoffResult<u64> {
        loop {
            match self.step()? {
                ProducerState::Done => return Ok(self.produced),
                ProducerState::Cancelled => return Err(HandoffError::Cancelled),
                ProducerState::Idle | ProducerState::Producing(_) => {}
            }
        }
    }
}

pub struct ConsumerTask {
    store: SharedStore,
    terminal: Option<u64>,
    pause: Duration,
    patience: Option<Duration>,
    cancel: CancelToken,
    state: ConsumerState,
    observed: Vec<u64>,
}

impl ConsumerTask {
    /// Consumer that stops after taking `terminal`, or on end-of-stream.
    #[must_use]
    pub fn new(store: SharedStore, terminal: u64) -> Self {
        Self {
            store,
            terminal: Some(terminal),
            pause: Duration::ZERO,
            patience: None,
            cancel: CancelToken::new(),
            state: ConsumerState::Idle,
            observed: Vec::new(),
        }
    }

    /// Consumer that only stops once the store is closed and drained.
    #[must_use]
    pub fn until_closed(store: SharedStore) -> Self {
        Self {
            terminal: None,
            ..Self::new(store, 0)
        }
    }

    /// Sleep taken after every successful take.
    #[must_use]
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Longest a single take may wait before surfacing
    /// [`HandoffError::Timeout`].
    #[must_use]
    pub fn with_patience(mut self, patience: Option<Duration>) -> Self {
        self.patience = patience;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn state(&self) -> ConsumerState {
        self.state
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Values taken so far, in arrival order.
    #[must_use]
    pub fn observed(&self) -> &[u64] {
        &self.observed
    }

    #[must_use]
    pub fn into_observed(self) -> Vec<u64> {
        self.observed
    }

    /// Takes one item and decides whether the exchange is over.
    ///
    /// # Errors
    ///
    /// [`HandoffError::Cancelled`] moves the consumer to
    /// [`ConsumerState::Cancelled`]; [`HandoffError::Timeout`] leaves it
    /// `Consuming` so the caller may retry.
    pub fn step(&mut self) -> HandoffResult<ConsumerState> {
        if matches!(
            self.state,
            ConsumerState::Terminated | ConsumerState::Cancelled
        ) {
            return Ok(self.state);
        }
        self.state = ConsumerState::Consuming;

        let taken = if self.cancel.is_cancelled() {
            Err(HandoffError::Cancelled)
        } else if let Some(patience) = self.patience {
            self.store.take_timeout(patience, &self.cancel)
        } else {
            self.store.take(&self.cancel)
        };

        match taken {
            Ok(value) => {
                tracing::info!("Consuming : {value}");
                self.observed.push(value);
                pause(self.pause);

                if self.terminal == Some(value) {
                    tracing::debug!(value, "terminal value consumed");
                    self.state = ConsumerState::Terminated;
                }
            }
            Err(HandoffError::Closed) => {
                tracing::debug!(consumed = self.observed.len(), "store closed and drained");
                self.state = ConsumerState::Terminated;
            }
            Err(HandoffError::Cancelled) => {
                tracing::warn!(consumed = self.observed.len(), "consumer cancelled");
                self.state = ConsumerState::Cancelled;
                return Err(HandoffError::Cancelled);
            }
            Err(err) => {
                tracing::warn!(error = %err, "consumer gave up waiting");
                return Err(err);
            }
        }

        Ok(self.state)
    }

    /// Steps until [`ConsumerState::Terminated`], returning how many items
    /// were consumed.
    ///
    /// # Errors
    ///
    /// The first error [`Self::step`] returns.
    pub fn run(&mut self) -> HandoffResult<usize> {
        loop {
            match self.step()? {
                ConsumerState::Terminated => return Ok(self.observed.len()),
                ConsumerState::Cancelled => return Err(HandoffError::Cancelled),
                ConsumerState::Idle | ConsumerState::Consuming => {}
            }
        }
    }
}

#[cfg(test)]
mod test_tasks {
    use std::thread;
    use std::time::Duration;

    use tracing_test::traced_test;

    use super::{ConsumerState, ConsumerTask, ProducerState, ProducerTask, SharedStore};
    use crate::{create_store, Backing, CancelToken, HandoffError};

    fn store(backing: Backing) -> SharedStore {
        create_store(backing).expect("should create store")
    }

    #[test]
    fn producer_walks_idle_producing_done() {
        let store = store(Backing::Queue { capacity: None });
        let mut producer = ProducerTask::new(store.clone(), 3);

        assert_eq!(producer.state(), ProducerState::Idle);
        assert_eq!(producer.step(), Ok(ProducerState::Producing(1)));
        assert_eq!(producer.step(), Ok(ProducerState::Producing(2)));
        assert_eq!(producer.step(), Ok(ProducerState::Done));
        assert_eq!(producer.step(), Ok(ProducerState::Done));
        assert_eq!(producer.produced(), 3);
        assert_eq!(store.len(), 3);
        assert!(!store.is_closed());
    }

    #[test]
    fn producer_closes_store_when_asked() {
        let store = store(Backing::Manual { capacity: 4 });
        let mut producer = ProducerTask::new(store.clone(), 2).close_on_finish(true);

        assert_eq!(producer.run(), Ok(2));
        assert!(store.is_closed());
    }

    #[test]
    fn empty_sequence_finishes_immediately() {
        let store = store(Backing::Manual { capacity: 1 });
        let mut producer = ProducerTask::new(store.clone(), 0);

        assert_eq!(producer.run(), Ok(0));
        assert!(store.is_empty());
    }

    #[test]
    fn consumer_terminates_on_terminal_value() {
        let store = store(Backing::Manual { capacity: 4 });
        let cancel = CancelToken::new();
        for value in [1, 2, 3, 4] {
            store.put(value, &cancel).unwrap();
        }

        let mut consumer = ConsumerTask::new(store.clone(), 2);
        assert_eq!(consumer.state(), ConsumerState::Idle);
        assert_eq!(consumer.step(), Ok(ConsumerState::Consuming));
        assert_eq!(consumer.step(), Ok(ConsumerState::Terminated));
        assert_eq!(consumer.step(), Ok(ConsumerState::Terminated));

        assert_eq!(consumer.observed(), &[1, 2]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn consumer_terminates_on_closed_store() {
        let store = store(Backing::Queue { capacity: None });
        let cancel = CancelToken::new();
        store.put(10, &cancel).unwrap();
        store.close();

        let mut consumer = ConsumerTask::until_closed(store);
        assert_eq!(consumer.run(), Ok(1));
        assert_eq!(consumer.into_observed(), vec![10]);
    }

    #[test]
    #[ntest::timeout(5000)]
    fn consumer_surfaces_timeout_and_may_retry() {
        let store = store(Backing::Manual { capacity: 1 });
        let mut consumer = ConsumerTask::new(store.clone(), 1)
            .with_patience(Some(Duration::from_millis(20)));

        assert_eq!(consumer.step(), Err(HandoffError::Timeout));
        assert_eq!(consumer.state(), ConsumerState::Consuming);

        store.put(1, &CancelToken::new()).unwrap();
        assert_eq!(consumer.step(), Ok(ConsumerState::Terminated));
    }

    #[test]
    #[ntest::timeout(5000)]
    fn cancelled_producer_stays_cancelled() {
        let store = store(Backing::Manual { capacity: 1 });
        let mut producer = ProducerTask::new(store.clone(), 5);
        let cancel = producer.cancel_token();

        let handle = thread::spawn(move || {
            let result = producer.run();
            (result, producer.state(), producer.produced())
        });

        thread::sleep(Duration::from_millis(100));
        cancel.cancel();

        let (result, state, produced) = handle.join().expect("should join");
        assert_eq!(result, Err(HandoffError::Cancelled));
        assert_eq!(state, ProducerState::Cancelled);
        assert_eq!(produced, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    #[traced_test]
    fn tasks_log_each_hand_off() {
        let store = store(Backing::Manual { capacity: 4 });

        let mut producer = ProducerTask::new(store.clone(), 4);
        assert_eq!(producer.run(), Ok(4));

        let mut consumer = ConsumerTask::new(store, 4);
        assert_eq!(consumer.run(), Ok(4));

        assert!(logs_contain("Producing : 4"));
        assert!(logs_contain("Consuming : 4"));
    }
}
