//! Ownership of controller tasks and the state they publish.
//!
//! A controller keeps one [`StateCell`] for its whole life and starts a new
//! background task per job. Starting a job bumps the cell's epoch; a
//! [`Writer`] only applies updates while its epoch is current, so a task that
//! is still finishing a poll after being cancelled can never write into the
//! next job's state.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, Sleep};
use tokio_util::sync::CancellationToken;

pub struct StateCell<T> {
    tx: watch::Sender<T>,
    epoch: Arc<AtomicU64>,
}

impl<T: Clone + Send + Sync + 'static> StateCell<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            tx,
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Replace the state and invalidate every writer handed out so far.
    pub fn reset(&self, initial: T) -> Writer<T> {
        let mine = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.tx.send_replace(initial);
        Writer {
            tx: self.tx.clone(),
            epoch: Arc::clone(&self.epoch),
            mine,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> T {
        self.tx.borrow().clone()
    }
}

/// Write access to a [`StateCell`] for one epoch.
pub struct Writer<T> {
    tx: watch::Sender<T>,
    epoch: Arc<AtomicU64>,
    mine: u64,
}

impl<T> Clone for Writer<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            epoch: Arc::clone(&self.epoch),
            mine: self.mine,
        }
    }
}

impl<T> Writer<T> {
    pub fn is_current(&self) -> bool {
        self.epoch.load(Ordering::SeqCst) == self.mine
    }

    /// Apply `f` to the state and notify subscribers. Returns `None` without
    /// touching anything once this writer's epoch has passed.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut out = None;
        self.tx.send_if_modified(|state| {
            if self.epoch.load(Ordering::SeqCst) != self.mine {
                return false;
            }
            out = Some(f(state));
            true
        });
        out
    }

    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.tx.borrow())
    }
}

/// A spawned controller task together with its cancellation token.
pub struct TaskHandle {
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl TaskHandle {
    pub fn spawn<F, Fut>(task: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let join = tokio::spawn(task(cancel.clone()));
        Self {
            cancel,
            join: Some(join),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Cancel the task and stop polling it. Safe to call more than once.
    pub fn dispose(&mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Await an optional future, pending forever when the slot is empty.
pub(crate) async fn next_in<F: Future + Unpin>(slot: &mut Option<F>) -> F::Output {
    match slot {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

/// Await the next tick of an optional interval.
pub(crate) async fn tick_in(slot: &mut Option<Interval>) -> Instant {
    match slot {
        Some(interval) => interval.tick().await,
        None => std::future::pending().await,
    }
}

pub(crate) type Timer = std::pin::Pin<Box<Sleep>>;

pub(crate) fn timer(after: std::time::Duration) -> Timer {
    Box::pin(tokio::time::sleep(after))
}
