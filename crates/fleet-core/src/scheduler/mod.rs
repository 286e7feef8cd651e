//! Bounded-concurrency execution of independent async operations.
//!
//! A fixed pool of `min(C, N)` workers drains a FIFO queue of pending
//! operations, multiplexed on the caller's task. When an operation settles,
//! its worker immediately takes the next queued one. Each outcome is stored in
//! the slot for its input index, so the output always has exactly one entry
//! per input, in input order.
//!
//! An operation that returns `Err` or panics settles as a [`TaskFailure`] and
//! never affects its siblings.

use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, PoisonError};

use futures::FutureExt;
use futures::future::join_all;
use thiserror::Error;
use tracing::debug;

/// Invalid scheduler configuration.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("concurrency bound must be at least 1, got {0}")]
    InvalidConcurrency(usize),
}

/// Why an operation did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure<E> {
    /// The operation returned an error.
    Failed(E),
    /// The operation panicked; carries the panic message.
    Panicked(String),
}

impl<E: std::fmt::Display> std::fmt::Display for TaskFailure<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(err) => write!(f, "{err}"),
            Self::Panicked(message) => write!(f, "panicked: {message}"),
        }
    }
}

/// Outcome of one scheduled operation.
pub type Settled<T, E> = Result<T, TaskFailure<E>>;

/// Runs operations with at most `concurrency` in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskScheduler {
    concurrency: NonZeroUsize,
}

impl TaskScheduler {
    /// Create a scheduler. A bound of zero is rejected.
    pub fn new(concurrency: usize) -> Result<Self, SchedulerError> {
        NonZeroUsize::new(concurrency)
            .map(|concurrency| Self { concurrency })
            .ok_or(SchedulerError::InvalidConcurrency(concurrency))
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.get()
    }

    /// Run every operation and wait for all of them to settle.
    ///
    /// Operations are started in input order. The returned vector has one
    /// entry per operation at the operation's input index.
    pub async fn run<I, F, Fut, T, E>(&self, operations: I) -> Vec<Settled<T, E>>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let pending: VecDeque<(usize, F)> = operations.into_iter().enumerate().collect();
        let total = pending.len();
        if total == 0 {
            return Vec::new();
        }

        let workers = self.concurrency.get().min(total);
        debug!(total, workers, "scheduling operations");

        let queue = Mutex::new(pending);
        let lanes = (0..workers).map(|_| drain(&queue));

        let mut slots: Vec<Option<Settled<T, E>>> = (0..total).map(|_| None).collect();
        for lane in join_all(lanes).await {
            for (index, settled) in lane {
                slots[index] = Some(settled);
            }
        }

        // Every dequeued operation records exactly one outcome.
        slots.into_iter().flatten().collect()
    }
}

/// One worker: take the next queued operation until the queue is empty.
async fn drain<F, Fut, T, E>(queue: &Mutex<VecDeque<(usize, F)>>) -> Vec<(usize, Settled<T, E>)>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut settled = Vec::new();
    loop {
        let next = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let Some((index, operation)) = next else {
            break;
        };

        let outcome = match AssertUnwindSafe(async move { operation().await })
            .catch_unwind()
            .await
        {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(TaskFailure::Failed(err)),
            Err(payload) => {
                let message = panic_message(payload);
                debug!(index, %message, "operation panicked");
                Err(TaskFailure::Panicked(message))
            }
        };
        settled.push((index, outcome));
    }
    settled
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "operation panicked".to_string()
    }
}
