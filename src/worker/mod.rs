use crate::exception::HttpException;
use rayon::ThreadPool;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Bounded thread pool for synchronous route handlers.
///
/// Async handlers run inline on the calling task; synchronous handlers are
/// offloaded here so they cannot stall the event loop for concurrent
/// requests. Dependency resolvers are assumed lightweight and are never
/// offloaded.
#[derive(Clone)]
pub struct WorkerPool {
    pool: Arc<ThreadPool>,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

impl WorkerPool {
    /// Build a pool with `num_threads` threads. Falls back to a single
    /// thread if the requested size is zero.
    pub fn new(num_threads: usize) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .thread_name(|i| format!("parametra-worker-{i}"))
            .panic_handler(|_| tracing::error!("worker task panicked"))
            .build()
            .expect("failed to build worker thread pool");
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Run a blocking closure on the pool and await its result.
    ///
    /// A panicking closure drops the channel sender; that surfaces as a 500
    /// instead of poisoning the event loop.
    pub async fn run<F, R>(&self, f: F) -> Result<R, HttpException>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.pool.spawn(move || {
            let _ = tx.send(f());
        });

        rx.await.map_err(|_| {
            tracing::error!("worker task panicked");
            HttpException::internal("Internal Server Error")
        })
    }
}
