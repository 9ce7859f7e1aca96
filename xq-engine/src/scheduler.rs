//! Execution scheduler
//!
//! Every blocking native call runs on a worker of a tokio blocking pool and
//! hands back a [`Pending`]. A `Pending` can be awaited, chained with
//! [`Pending::then`], or waited on with [`Pending::get`] from synchronous code.
//! A panic on a worker is resumed on whichever thread observes the result.

use std::future::Future;
use std::panic;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use once_cell::sync::OnceCell;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::{JoinError, JoinHandle};
use tracing::debug;
use xq_engine_traits::{Error, Result};

const WORKER_NAME: &str = "xq-worker";

static SHARED: OnceCell<Scheduler> = OnceCell::new();

/// A pool of named worker threads.
///
/// Cloning is cheap. The pool shuts down when the last clone is dropped,
/// which must not happen on one of its own workers.
#[derive(Clone)]
pub struct Scheduler {
    runtime: Arc<Runtime>,
}

impl Scheduler {
    /// A new pool with tokio's default number of blocking threads.
    pub fn new() -> Result<Self> {
        Self::build(Builder::new_multi_thread())
    }

    /// A new pool running at most `workers` native calls at once.
    pub fn with_workers(workers: usize) -> Result<Self> {
        let mut builder = Builder::new_multi_thread();
        builder.worker_threads(1).max_blocking_threads(workers.max(1));
        Self::build(builder)
    }

    fn build(mut builder: Builder) -> Result<Self> {
        let runtime = builder.thread_name(WORKER_NAME).enable_all().build()?;
        debug!("started worker pool");
        Ok(Self {
            runtime: Arc::new(runtime),
        })
    }

    /// The process-wide pool, started on first use.
    pub fn shared() -> Result<Self> {
        SHARED.get_or_try_init(Self::new).cloned()
    }

    /// Run `f` on a worker.
    pub fn spawn<T, F>(&self, f: F) -> Pending<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = self.runtime.handle().clone();
        let task = handle.spawn_blocking(f);
        Pending { handle, task }
    }

    /// A `Pending` that is already resolved.
    pub fn ready<T: Send + 'static>(&self, value: Result<T>) -> Pending<T> {
        self.spawn(move || value)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}

fn joined<T>(result: std::result::Result<Result<T>, JoinError>) -> Result<T> {
    match result {
        Ok(result) => result,
        Err(e) if e.is_panic() => panic::resume_unwind(e.into_panic()),
        Err(_) => Err(Error::Cancelled),
    }
}

/// The eventual result of work running on a worker.
#[must_use = "a Pending does nothing observable unless awaited or waited on"]
pub struct Pending<T> {
    handle: Handle,
    task: JoinHandle<Result<T>>,
}

impl<T: Send + 'static> Pending<T> {
    /// Run `f` on a worker once this resolves successfully.
    pub fn then<U, F>(self, f: F) -> Pending<U>
    where
        F: FnOnce(T) -> Result<U> + Send + 'static,
        U: Send + 'static,
    {
        let Pending { handle, task } = self;
        let workers = handle.clone();
        let task = handle.spawn(async move {
            let value = joined(task.await)?;
            joined(workers.spawn_blocking(move || f(value)).await)
        });
        Pending { handle, task }
    }

    /// Block the calling thread until the result is available.
    ///
    /// Must not be called from inside an async context.
    pub fn get(self) -> Result<T> {
        let Pending { handle, task } = self;
        joined(handle.block_on(task))
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.task).poll(cx).map(joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_work_runs_on_named_worker() {
        let scheduler = Scheduler::new().unwrap();
        let name = scheduler
            .spawn(|| Ok(std::thread::current().name().map(str::to_string)))
            .get()
            .unwrap();
        assert_eq!(name.as_deref(), Some(WORKER_NAME));
    }

    #[test]
    fn test_spawn_does_not_block_caller() {
        let scheduler = Scheduler::new().unwrap();
        let (release, wait) = mpsc::channel::<()>();
        let pending = scheduler.spawn(move || {
            wait.recv_timeout(Duration::from_secs(5)).ok();
            Ok(7)
        });
        assert!(!pending.is_finished());
        release.send(()).unwrap();
        assert_eq!(pending.get().unwrap(), 7);
    }

    #[test]
    fn test_then_chains_on_worker() {
        let scheduler = Scheduler::new().unwrap();
        let result = scheduler
            .spawn(|| Ok(20))
            .then(|n| Ok(n + 1))
            .then(|n| Ok(format!("{} on {:?}", n, std::thread::current().name())))
            .get()
            .unwrap();
        assert_eq!(result, format!("21 on {:?}", Some(WORKER_NAME)));
    }

    #[test]
    fn test_then_skips_after_error() {
        let scheduler = Scheduler::new().unwrap();
        let err = scheduler
            .spawn(|| -> Result<u8> { Err(Error::Cancelled) })
            .then(|_| -> Result<u8> { panic!("continuation must not run") })
            .get()
            .err()
            .unwrap();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    #[should_panic(expected = "worker exploded")]
    fn test_worker_panic_is_resumed() {
        let scheduler = Scheduler::new().unwrap();
        let _ = scheduler
            .spawn(|| -> Result<()> { panic!("worker exploded") })
            .get();
    }

    #[test]
    fn test_shared_is_reused() {
        let a = Scheduler::shared().unwrap();
        let b = Scheduler::shared().unwrap();
        assert!(Arc::ptr_eq(&a.runtime, &b.runtime));
    }

    #[tokio::test]
    async fn test_pending_is_awaitable() {
        let scheduler = Scheduler::shared().unwrap();
        let value = scheduler.spawn(|| Ok("done")).then(|s| Ok(s.len())).await.unwrap();
        assert_eq!(value, 4);
    }
}
