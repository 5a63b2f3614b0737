//! Single-assignment promises with chained continuations.
//!
//! A [`Promise`] starts pending and is settled exactly once, either fulfilled
//! with a value or rejected with a reason. Observers registered through
//! [`Promise::then`], [`Promise::catch`] and [`Promise::finally`] never run on
//! the caller's stack: they are handed to a [`Schedule`] implementation and run
//! later, in the order they were registered.
//!
//! # Examples
//!
//! ```
//! use promise_chain::{JobQueue, Promise};
//!
//! let queue = JobQueue::new();
//! let doubled = Promise::<i32, String>::resolved(&queue, 21)
//!     .then(|value| Ok(value * 2))
//!     .then(|value| {
//!         if value > 40 {
//!             Err(format!("{value} is too large"))
//!         } else {
//!             Ok(value)
//!         }
//!     })
//!     .catch(|reason| Ok::<_, String>(reason.len() as i32));
//!
//! // Nothing has run yet.
//! assert!(doubled.is_pending());
//! queue.run_until_stalled().unwrap();
//! assert_eq!(doubled.value(), Some(15));
//! ```
use thiserror::Error;

mod chain;
pub mod combinators;
mod promise;
mod queue;
mod settlement;

pub use combinators::{all, all_settled, any, race};
pub use promise::{Promise, PromiseState, Resolver};
pub use queue::{Job, JobQueue, QueueConfig, Schedule};
pub use settlement::{IntoSettlement, Settlement};

/// Errors raised by the job queue.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("job queue still had work after running {budget} jobs")]
    BudgetExhausted { budget: usize },
}

/// Why awaiting a [`Promise`] did not produce a value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AwaitError<E> {
    #[error("promise rejected: {0:?}")]
    Rejected(E),
    #[error("promise abandoned: every resolver was dropped before it settled")]
    Abandoned,
}
