// Orchestrates one producer and one consumer over a single store.

use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::tasks::SharedStore;
use crate::{
    create_store, CancelToken, ConfigError, ConsumerState, ConsumerTask, ExchangeConfig,
    HandoffError, ProducerState, ProducerTask,
};

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("exchange is misconfigured: {0}")]
    Config(#[from] ConfigError),

    #[error("store could not be created: {0}")]
    Store(HandoffError),

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },

    #[error("producer failed: {0}")]
    Producer(HandoffError),

    #[error("consumer failed: {0}")]
    Consumer(HandoffError),

    #[error("{0} thread panicked")]
    Panicked(&'static str),
}

pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;

/// What both sides saw once the exchange wound down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeReport {
    pub produced: u64,
    pub consumed: Vec<u64>,
    pub producer_state: ProducerState,
    pub consumer_state: ConsumerState,
    pub elapsed: Duration,
}

/// `Exchange` wires a [`ProducerTask`] and a [`ConsumerTask`] onto two named
/// threads sharing the store described by its [`ExchangeConfig`].
///
/// Each side gets its own [`CancelToken`]; grab them before calling
/// [`Exchange::run`] to stop either side from another thread.
pub struct Exchange {
    config: ExchangeConfig,
    producer_cancel: CancelToken,
    consumer_cancel: CancelToken,
}

impl Exchange {
    #[must_use]
    pub fn new(config: ExchangeConfig) -> Self {
        Self {
            config,
            producer_cancel: CancelToken::new(),
            consumer_cancel: CancelToken::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    #[must_use]
    pub fn producer_cancel(&self) -> CancelToken {
        self.producer_cancel.clone()
    }

    #[must_use]
    pub fn consumer_cancel(&self) -> CancelToken {
        self.consumer_cancel.clone()
    }

    /// Stops both sides wherever they are blocked.
    pub fn cancel(&self) {
        self.producer_cancel.cancel();
        self.consumer_cancel.cancel();
    }

    /// Runs the exchange to completion on the reference sequence
    /// `1..=count`, blocking the calling thread until both sides exit.
    ///
    /// A side that fails unblocks the other: a failed producer closes the
    /// store, a failed consumer cancels the producer.
    ///
    /// # Errors
    ///
    /// The first failure in order: configuration, store creation, thread
    /// spawn, producer, consumer.
    pub fn run(&self) -> ExchangeResult<ExchangeReport> {
        self.config.validate()?;

        let store: SharedStore =
            create_store(self.config.get_backing()).map_err(ExchangeError::Store)?;
        let started = Instant::now();

        tracing::info!(
            backing = %self.config.get_backing(),
            count = self.config.get_count(),
            "starting exchange"
        );

        let mut producer = ProducerTask::new(store.clone(), self.config.get_count())
            .with_pause(self.config.get_producer_delay())
            .close_on_finish(self.config.get_close_on_finish())
            .with_cancel(self.producer_cancel.clone());

        let mut consumer = ConsumerTask::new(store.clone(), self.config.get_count())
            .with_pause(self.config.get_consumer_delay())
            .with_patience(self.config.get_patience())
            .with_cancel(self.consumer_cancel.clone());

        let producer_store = store.clone();
        let producer_handle = thread::Builder::new()
            .name(String::from("producer"))
            .spawn(move || {
                let result = producer.run();
                if result.is_err() {
                    producer_store.close();
                }
                (result, producer.state(), producer.produced())
            })
            .map_err(|source| ExchangeError::Spawn {
                name: "producer",
                source,
            })?;

        let producer_cancel = self.producer_cancel.clone();
        let consumer_handle = match thread::Builder::new()
            .name(String::from("consumer"))
            .spawn(move || {
                let result = consumer.run();
                if result.is_err() {
                    producer_cancel.cancel();
                }
                let state = consumer.state();
                (result, state, consumer.into_observed())
            }) {
            Ok(handle) => handle,
            Err(source) => {
                self.producer_cancel.cancel();
                let _ = producer_handle.join();
                return Err(ExchangeError::Spawn {
                    name: "consumer",
                    source,
                });
            }
        };

        let consumer_outcome = consumer_handle.join();
        let producer_outcome = producer_handle.join();

        let (producer_result, producer_state, produced) =
            producer_outcome.map_err(|_| ExchangeError::Panicked("producer"))?;
        let (consumer_result, consumer_state, consumed) =
            consumer_outcome.map_err(|_| ExchangeError::Panicked("consumer"))?;

        let elapsed = started.elapsed();
        tracing::info!(
            produced,
            consumed = consumed.len(),
            ?elapsed,
            "exchange finished"
        );

        producer_result.map_err(ExchangeError::Producer)?;
        consumer_result.map_err(ExchangeError::Consumer)?;

        Ok(ExchangeReport {
            produced,
            consumed,
            producer_state,
            consumer_state,
            elapsed,
        })
    }
}
