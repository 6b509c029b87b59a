//! Bounded worker pool and pollable task handles.
//!
//! The login state machine runs on a tick and must never block, so every
//! slow operation (contacting the authentication service, loading a
//! player's data) is handed to a [`WorkerPool`]. The pool returns a
//! [`TaskHandle`] that the machine *polls* once per tick instead of
//! awaiting.
//!
//! A semaphore caps how many tasks run at once. Tasks beyond the cap are
//! spawned immediately but wait for a permit before doing any work, so a
//! burst of logins queues instead of hammering the backing services.
//!
//! Panics inside a task are caught and reported through the handle as
//! [`TaskFailure::Panicked`]. A crashing task never takes down the
//! connection driver that polls it.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::{Semaphore, oneshot};
use tokio::sync::oneshot::error::TryRecvError;

use crate::TaskFailure;

/// Default number of concurrently running tasks.
pub const DEFAULT_MAX_WORKERS: usize = 16;

// ---------------------------------------------------------------------------
// WorkerPool
// ---------------------------------------------------------------------------

/// A shared, bounded pool for background login work.
///
/// Cheap to clone: clones share the same permit budget.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    limit: Arc<Semaphore>,
    max_workers: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORKERS)
    }
}

impl WorkerPool {
    /// Creates a pool that runs at most `max_workers` tasks at once.
    ///
    /// A value of 0 is treated as 1.
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            limit: Arc::new(Semaphore::new(max_workers)),
            max_workers,
        }
    }

    /// Configured maximum number of concurrently running tasks.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Currently free worker slots.
    pub fn available_workers(&self) -> usize {
        self.limit.available_permits()
    }

    /// Runs `fut` on the pool and returns a handle to its result.
    ///
    /// `name` identifies the task in logs. Must be called from within a
    /// Tokio runtime.
    pub fn spawn<T, F>(&self, name: &'static str, fut: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let limit = Arc::clone(&self.limit);

        tokio::spawn(async move {
            // Hold the permit for the whole task; dropping it frees the slot
            // even if the task panics.
            let Ok(_permit) = limit.acquire_owned().await else {
                let _ = tx.send(Err(TaskFailure::Lost));
                return;
            };

            let result = AssertUnwindSafe(fut)
                .catch_unwind()
                .await
                .map_err(|payload| TaskFailure::Panicked(panic_message(payload.as_ref())));

            if let Err(failure) = &result {
                tracing::error!(task = name, error = %failure, "worker task crashed");
            }

            // The handle may have been dropped (connection gone); nothing
            // left to report to.
            let _ = tx.send(result);
        });

        TaskHandle {
            name,
            state: HandleState::Pending(rx),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// TaskHandle
// ---------------------------------------------------------------------------

enum HandleState<T> {
    Pending(oneshot::Receiver<Result<T, TaskFailure>>),
    Settled(Result<T, TaskFailure>),
}

/// A handle to a task running on a [`WorkerPool`].
///
/// Poll it with [`poll`](Self::poll) from synchronous code, or
/// [`wait`](Self::wait) for it from async code. Once settled, the result
/// is cached, so polling again is cheap and returns the same value.
pub struct TaskHandle<T> {
    name: &'static str,
    state: HandleState<T>,
}

impl<T> TaskHandle<T> {
    /// A handle that is already settled with `value`.
    ///
    /// Useful for participants that decide synchronously.
    pub fn ready(name: &'static str, value: T) -> Self {
        Self {
            name,
            state: HandleState::Settled(Ok(value)),
        }
    }

    /// Name given when the task was spawned.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Checks for a result without blocking.
    ///
    /// Returns `None` while the task is still running.
    pub fn poll(&mut self) -> Option<&Result<T, TaskFailure>> {
        if let HandleState::Pending(rx) = &mut self.state {
            let settled = match rx.try_recv() {
                Ok(result) => result,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Closed) => Err(TaskFailure::Lost),
            };
            self.state = HandleState::Settled(settled);
        }
        match &self.state {
            HandleState::Settled(result) => Some(result),
            HandleState::Pending(_) => None,
        }
    }

    /// `true` once the task has finished, successfully or not.
    pub fn is_settled(&mut self) -> bool {
        self.poll().is_some()
    }

    /// Consumes the handle, returning the result if the task has finished.
    pub fn into_settled(mut self) -> Option<Result<T, TaskFailure>> {
        self.poll()?;
        match self.state {
            HandleState::Settled(result) => Some(result),
            HandleState::Pending(_) => None,
        }
    }

    /// Waits for the task to finish.
    pub async fn wait(self) -> Result<T, TaskFailure> {
        match self.state {
            HandleState::Settled(result) => result,
            HandleState::Pending(rx) => rx.await.unwrap_or(Err(TaskFailure::Lost)),
        }
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            HandleState::Pending(_) => "pending",
            HandleState::Settled(Ok(_)) => "ok",
            HandleState::Settled(Err(_)) => "failed",
        };
        f.debug_struct("TaskHandle")
            .field("name", &self.name)
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    #[tokio::test]
    async fn test_spawn_reports_value() {
        let pool = WorkerPool::new(2);
        let handle = pool.spawn("answer", async { 42 });
        assert_eq!(handle.wait().await, Ok(42));
    }

    #[tokio::test]
    async fn test_poll_is_none_until_finished() {
        let pool = WorkerPool::new(1);
        let (tx, rx) = oneshot::channel::<()>();
        let mut handle = pool.spawn("gated", async move {
            let _ = rx.await;
            "done"
        });

        tokio::task::yield_now().await;
        assert!(handle.poll().is_none());

        tx.send(()).unwrap();
        // Give the worker a chance to run.
        for _ in 0..100 {
            if handle.is_settled() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(handle.poll(), Some(&Ok("done")));
        // Cached: same answer again.
        assert_eq!(handle.poll(), Some(&Ok("done")));
    }

    #[tokio::test]
    async fn test_panic_is_captured() {
        let pool = WorkerPool::new(1);
        let handle = pool.spawn("crash", async {
            if true {
                panic!("auth exploded");
            }
        });
        let result: Result<(), _> = handle.wait().await;
        assert_eq!(result, Err(TaskFailure::Panicked("auth exploded".into())));
    }

    #[tokio::test]
    async fn test_panic_releases_permit() {
        let pool = WorkerPool::new(1);
        let crash = pool.spawn("crash", async {
            if true {
                panic!("x");
            }
        });
        let _ = crash.wait().await;

        let next = pool.spawn("next", async { 1 });
        assert_eq!(next.wait().await, Ok(1));
        assert_eq!(pool.available_workers(), 1);
    }

    #[tokio::test]
    async fn test_pool_bounds_concurrency() {
        let pool = WorkerPool::new(1);
        let (tx, rx) = oneshot::channel::<()>();

        let first = pool.spawn("first", async move {
            let _ = rx.await;
        });
        let mut second = pool.spawn("second", async { 2 });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(pool.available_workers(), 0);
        assert!(second.poll().is_none(), "second waits for a permit");

        tx.send(()).unwrap();
        first.wait().await.unwrap();
        assert_eq!(second.wait().await, Ok(2));
    }

    #[test]
    fn test_ready_handle_is_settled() {
        let mut handle = TaskHandle::ready("sync", 7);
        assert!(handle.is_settled());
        assert_eq!(handle.into_settled(), Some(Ok(7)));
    }

    #[test]
    fn test_zero_workers_becomes_one() {
        assert_eq!(WorkerPool::new(0).max_workers(), 1);
    }

    #[test]
    fn test_debug_shows_state() {
        let handle = TaskHandle::ready("sync", ());
        assert_eq!(
            format!("{handle:?}"),
            r#"TaskHandle { name: "sync", state: "ok" }"#
        );
    }
}
