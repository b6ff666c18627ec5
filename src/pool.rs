//! Bounded worker pool and deadline-bounded fan-in.
//!
//! All page fetches and per-file downloads run through a [`WorkerPool`]: a
//! semaphore-gated set of Tokio tasks. A task holds its permit for as long as
//! it runs, so at most `size` tasks are in flight at once.
//!
//! Results flow back through a bounded `mpsc` channel. Every worker owns a
//! clone of the sender and the dispatcher owns the original, so the channel
//! closes exactly when the dispatcher has submitted everything and every
//! submitted worker has finished. [`collect_until`] races that closure against
//! a deadline.

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Minimum allowed pool size.
const MIN_POOL_SIZE: usize = 1;

/// Maximum allowed pool size.
const MAX_POOL_SIZE: usize = 100;

/// Default pool size, small enough to stay within search-site rate tolerance.
pub const DEFAULT_POOL_SIZE: usize = 6;

/// Errors from the worker pool.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// Invalid pool size requested.
    #[error("invalid pool size {value}: must be between {MIN_POOL_SIZE} and {MAX_POOL_SIZE}")]
    InvalidSize {
        /// The rejected size.
        value: usize,
    },

    /// The pool was closed; no further tasks can be submitted.
    #[error("worker pool is closed")]
    Closed,
}

/// Semaphore-bounded task pool.
///
/// Cloning shares the same permits.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Creates a pool running at most `size` tasks concurrently.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidSize`] if `size` is outside 1..=100.
    pub fn new(size: usize) -> Result<Self, PoolError> {
        if !(MIN_POOL_SIZE..=MAX_POOL_SIZE).contains(&size) {
            return Err(PoolError::InvalidSize { value: size });
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        })
    }

    /// Maximum number of concurrently running tasks.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns true once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Closes the pool. Running tasks finish; new submissions fail.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Waits for a free slot, then spawns `task` on it.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] if the pool was closed before a slot
    /// became available.
    pub async fn submit<F>(&self, task: F) -> Result<JoinHandle<F::Output>, PoolError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        Ok(tokio::spawn(async move {
            let _permit = permit;
            task.await
        }))
    }
}

/// How a [`collect_until`] loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Every worker finished and the channel closed.
    Exhausted,
    /// The deadline fired first.
    DeadlineReached,
    /// The item callback asked to stop.
    Stopped,
}

/// Drains `rx` until it closes, the deadline passes, or `on_item` breaks.
///
/// `dispatch` is the future that submits workers; it is polled alongside the
/// channel so collection starts while submission is still waiting for pool
/// slots. If collection ends first, `dispatch` is dropped and nothing further
/// is submitted. Workers already running are not aborted.
///
/// # Errors
///
/// Returns the dispatcher's error if a submission fails.
#[instrument(level = "debug", skip_all)]
pub async fn collect_until<T, D, F>(
    dispatch: D,
    rx: &mut mpsc::Receiver<T>,
    deadline: Instant,
    mut on_item: F,
) -> Result<Completion, PoolError>
where
    D: Future<Output = Result<(), PoolError>>,
    F: FnMut(T) -> ControlFlow<()>,
{
    tokio::pin!(dispatch);
    let sleep = tokio::time::sleep_until(deadline);
    tokio::pin!(sleep);
    let mut dispatched = false;

    loop {
        tokio::select! {
            result = &mut dispatch, if !dispatched => {
                result?;
                dispatched = true;
                debug!("all tasks submitted");
            }
            item = rx.recv() => match item {
                Some(item) => {
                    if on_item(item).is_break() {
                        return Ok(Completion::Stopped);
                    }
                }
                None => return Ok(Completion::Exhausted),
            },
            () = &mut sleep => {
                debug!("deadline reached, returning partial results");
                return Ok(Completion::DeadlineReached);
            }
        }
    }
}
