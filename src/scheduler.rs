//! Fixed-size worker pool for asynchronous cache rebuilds.

use crate::error::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as SyncMutex, PoisonError};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;

/// Default number of rebuild workers.
pub const DEFAULT_WORKERS: usize = 10;

type RebuildTask = BoxFuture<'static, Result<()>>;

#[derive(Default)]
struct PoolState {
    pending: AtomicUsize,
    submitted: AtomicU64,
    failed: AtomicU64,
    idle: Notify,
}

impl PoolState {
    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Runs cache rebuild tasks on a fixed set of tokio tasks, separate from the
/// callers that submit them.
///
/// Construct once (inside a tokio runtime) and share through `Arc`.
///
/// # Example
///
/// ```
/// # use cache_shield::scheduler::RebuildScheduler;
/// # async fn example() -> cache_shield::Result<()> {
/// let scheduler = RebuildScheduler::new(4);
/// scheduler.submit(async {
///     // re-read the backing store, write the cache, release the lock
///     Ok(())
/// })?;
/// scheduler.wait_idle().await;
/// # Ok(())
/// # }
/// ```
pub struct RebuildScheduler {
    /// `None` once shut down; dropping it closes the queue.
    sender: SyncMutex<Option<mpsc::UnboundedSender<RebuildTask>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
    state: Arc<PoolState>,
}

impl RebuildScheduler {
    /// Spawn `workers` worker tasks (at least one) on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(workers: usize) -> Self {
        let worker_count = workers.max(1);
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let state = Arc::new(PoolState::default());

        let handles = (0..worker_count)
            .map(|index| {
                tokio::spawn(worker_loop(
                    index,
                    Arc::clone(&receiver),
                    Arc::clone(&state),
                ))
            })
            .collect();

        info!("✓ Rebuild scheduler started with {} workers", worker_count);

        RebuildScheduler {
            sender: SyncMutex::new(Some(sender)),
            workers: Mutex::new(handles),
            worker_count,
            state,
        }
    }

    /// Queue `task` and return without waiting for it.
    ///
    /// The task's error is logged and dropped; effects are observable only
    /// through the cache.
    ///
    /// # Errors
    ///
    /// `Error::SchedulerClosed` after [`shutdown`](Self::shutdown).
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        // Held across the send so shutdown cannot close the queue in between.
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = sender.as_ref().ok_or(Error::SchedulerClosed)?;

        self.state.pending.fetch_add(1, Ordering::AcqRel);
        if sender.send(task.boxed()).is_err() {
            self.state.finish_one();
            return Err(Error::SchedulerClosed);
        }

        self.state.submitted.fetch_add(1, Ordering::Relaxed);
        debug!("» Rebuild task submitted");
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Tasks queued or running.
    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::Acquire)
    }

    /// Tasks accepted since start.
    pub fn submitted(&self) -> u64 {
        self.state.submitted.load(Ordering::Relaxed)
    }

    /// Tasks that returned an error or panicked.
    pub fn failed(&self) -> u64 {
        self.state.failed.load(Ordering::Relaxed)
    }

    /// Wait until every accepted task has finished.
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.state.idle.notified();
            if self.pending() == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Stop accepting work, let queued tasks finish, then stop the workers.
    pub async fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            return;
        }
        // Workers drain the queue and exit once it is closed and empty.
        drop(sender);

        let handles = std::mem::take(&mut *self.workers.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Rebuild worker terminated abnormally: {}", e);
            }
        }

        info!(
            "✓ Rebuild scheduler stopped ({} submitted, {} failed)",
            self.submitted(),
            self.failed()
        );
    }
}

async fn worker_loop(
    index: usize,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<RebuildTask>>>,
    state: Arc<PoolState>,
) {
    loop {
        let task = match receiver.lock().await.recv().await {
            Some(task) => task,
            None => break,
        };

        match AssertUnwindSafe(task).catch_unwind().await {
            Ok(Ok(())) => {
                debug!("✓ Rebuild task finished on worker {}", index);
            }
            Ok(Err(e)) => {
                state.failed.fetch_add(1, Ordering::Relaxed);
                warn!("Rebuild task failed on worker {}: {}", index, e);
            }
            Err(panic) => {
                state.failed.fetch_add(1, Ordering::Relaxed);
                let panic_msg = if let Some(s) = panic.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                error!("Rebuild task panicked on worker {}: {}", index, panic_msg);
            }
        }

        state.finish_one();
    }

    debug!("Rebuild worker {} stopped", index);
}
