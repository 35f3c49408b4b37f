//! Bounded hand-off between one producing thread and one consuming thread.
//!
//! This crate provides:
//! - **[`BoundedChannel`]**: a FIFO guarded by a mutex with explicit
//!   "not full" / "not empty" condition variables
//! - **[`SyncQueue`]**: the same contract delegated to a blocking queue
//! - **[`ProducerTask`] / [`ConsumerTask`]**: the two actors, driving either
//!   store through the [`Handoff`] interface
//! - **[`Exchange`]**: wires both actors onto threads from an
//!   [`ExchangeConfig`]
//!
//! Blocking calls take a [`CancelToken`]; firing it releases a blocked
//! `put`/`take` with [`HandoffError::Cancelled`].
//!
//! # Examples
//!
//! ```rust
//! use foundation_handoff::{Backing, Exchange, ExchangeConfig};
//!
//! let config = ExchangeConfig::unpaced().backing(Backing::Manual { capacity: 1 });
//! let report = Exchange::new(config).run().expect("exchange should finish");
//!
//! assert_eq!(report.consumed, vec![1, 2, 3, 4]);
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod bounded;
mod cancel;
mod config;
mod errors;
mod exchange;
mod queue;
mod store;
mod tasks;

pub use bounded::*;
pub use cancel::*;
pub use config::*;
pub use errors::*;
pub use exchange::*;
pub use queue::*;
pub use store::*;
pub use tasks::*;
