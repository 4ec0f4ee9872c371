//! Bounded worker pool for load chains.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

use crate::domain::errors::{CacheError, CacheResult};

/// Idle time after which threads beyond the core set are reclaimed.
pub const KEEP_ALIVE: Duration = Duration::from_secs(10);

/// Thread counts for the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSize {
    /// Always-alive worker threads.
    pub core: usize,
    /// Upper bound on all threads, core included.
    pub max: usize,
}

impl PoolSize {
    /// CPU count + 1 core threads, 2 × CPU count + 1 at most.
    #[must_use]
    pub const fn for_cpus(cpus: usize) -> Self {
        Self {
            core: cpus + 1,
            max: cpus * 2 + 1,
        }
    }

    /// Sizes the pool for this machine.
    #[must_use]
    pub fn detect() -> Self {
        let cpus = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self::for_cpus(cpus)
    }
}

/// Multi-threaded runtime dedicated to load chains.
///
/// Core threads poll tasks; the elastic threads above them serve blocking
/// disk and decode work and exit after [`KEEP_ALIVE`] idle. The submission
/// queue is unbounded: under sustained overload memory grows instead of
/// requests being rejected.
pub struct WorkerPool {
    runtime: Option<Runtime>,
    handle: Handle,
    size: PoolSize,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Builds a pool with the given thread counts.
    ///
    /// # Errors
    /// Returns error if the runtime cannot be started.
    pub fn new(size: PoolSize) -> CacheResult<Self> {
        let core = size.core.max(1);
        let elastic = size.max.saturating_sub(core).max(1);
        let counter = AtomicUsize::new(1);

        let runtime = Builder::new_multi_thread()
            .worker_threads(core)
            .max_blocking_threads(elastic)
            .thread_keep_alive(KEEP_ALIVE)
            .thread_name_fn(move || {
                format!("image-loader#{}", counter.fetch_add(1, Ordering::Relaxed))
            })
            .enable_all()
            .build()
            .map_err(|e| CacheError::IoError(format!("Failed to start worker pool: {e}")))?;

        debug!(core, elastic, "Started image loader worker pool");
        let handle = runtime.handle().clone();
        Ok(Self {
            runtime: Some(runtime),
            handle,
            size,
        })
    }

    /// Returns the configured size.
    #[must_use]
    pub const fn size(&self) -> PoolSize {
        self.size
    }

    /// Queues a task.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(task);
    }

    /// Runs `task` on the pool and blocks the calling thread until it ends.
    ///
    /// # Errors
    /// Returns error if the task panicked.
    ///
    /// # Panics
    /// Panics if called from inside an async runtime.
    pub fn run<F, T>(&self, task: F) -> CacheResult<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let join = self.handle.spawn(task);
        self.handle
            .block_on(join)
            .map_err(|e| CacheError::IoError(format!("Worker task failed: {e}")))
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
