//! Single-flight admission for generation work
//!
//! At most one job runs inside [`GenerationSerializer::with_generation_lock`]
//! at any instant. Jobs wait in FIFO order on a dedicated mutex that is
//! separate from the pipeline's initialization guard.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::config::GenerationConfig;
use crate::error::{AppError, Result};

/// Admission limits for the generation lock
#[derive(Debug, Clone, Default)]
pub struct SerializerConfig {
    /// Reject with `Busy` once this many jobs are already waiting
    pub max_waiting: Option<usize>,
    /// Fail with `Timeout` if the lock is not obtained within this duration
    pub acquire_timeout: Option<Duration>,
}

impl From<&GenerationConfig> for SerializerConfig {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            max_waiting: config.max_waiting,
            acquire_timeout: config.acquire_timeout_ms.map(Duration::from_millis),
        }
    }
}

struct SerializerInner {
    lock: Arc<Mutex<()>>,
    config: SerializerConfig,
    active: AtomicUsize,
    waiting: AtomicUsize,
    completed: AtomicU64,
}

/// Generation critical section shared by every request
#[derive(Clone)]
pub struct GenerationSerializer {
    inner: Arc<SerializerInner>,
}

/// Decrements a counter when dropped
struct CountGuard<'a>(&'a AtomicUsize);

impl<'a> CountGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for CountGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl GenerationSerializer {
    /// Create a serializer with unbounded waiting and no timeout
    pub fn new() -> Self {
        Self::with_config(SerializerConfig::default())
    }

    pub fn with_config(config: SerializerConfig) -> Self {
        Self {
            inner: Arc::new(SerializerInner {
                lock: Arc::new(Mutex::new(())),
                config,
                active: AtomicUsize::new(0),
                waiting: AtomicUsize::new(0),
                completed: AtomicU64::new(0),
            }),
        }
    }

    /// Run `work` while holding the generation lock.
    ///
    /// The lock guard moves into a spawned task together with `work`, so it
    /// is released on every exit path of `work` (including a panic) and is
    /// not released early if the caller stops waiting. Once admitted, a job
    /// runs to completion.
    pub async fn with_generation_lock<F, Fut, T>(&self, job_id: &str, work: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let guard = self.admit(job_id).await?;
        debug!(job_id = %job_id, "Entered generation critical section");

        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            let _active = CountGuard::enter(&inner.active);
            let result = work().await;
            inner.completed.fetch_add(1, Ordering::Relaxed);
            result
        });

        let result = task.await.map_err(|e| {
            if e.is_panic() {
                AppError::GenerationFailed("Generation task panicked".to_string())
            } else {
                AppError::Internal(format!("Generation task was cancelled: {}", e))
            }
        })?;

        debug!(job_id = %job_id, ok = result.is_ok(), "Left generation critical section");
        result
    }

    async fn admit(&self, job_id: &str) -> Result<OwnedMutexGuard<()>> {
        // Uncontended: no queueing, no limits apply
        if let Ok(guard) = self.inner.lock.clone().try_lock_owned() {
            return Ok(guard);
        }

        let ahead = self.inner.waiting.fetch_add(1, Ordering::SeqCst);
        let waiting = CountGuard(&self.inner.waiting);

        if let Some(max) = self.inner.config.max_waiting {
            if ahead >= max {
                warn!(job_id = %job_id, waiting = ahead, max_waiting = max, "Rejecting generation request");
                return Err(AppError::Busy(format!(
                    "{} generation requests already waiting",
                    ahead
                )));
            }
        }

        let lock = self.inner.lock.clone().lock_owned();
        let guard = match self.inner.config.acquire_timeout {
            Some(timeout) => tokio::time::timeout(timeout, lock).await.map_err(|_| {
                warn!(job_id = %job_id, timeout_ms = timeout.as_millis() as u64, "Timed out waiting for generation lock");
                AppError::Timeout(format!(
                    "Generation lock not acquired within {} ms",
                    timeout.as_millis()
                ))
            })?,
            None => lock.await,
        };

        drop(waiting);
        Ok(guard)
    }

    /// Jobs currently inside the critical section (0 or 1)
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Jobs blocked waiting for the lock
    pub fn waiting(&self) -> usize {
        self.inner.waiting.load(Ordering::SeqCst)
    }

    /// Jobs that have left the critical section
    pub fn completed(&self) -> u64 {
        self.inner.completed.load(Ordering::Relaxed)
    }
}

impl Default for GenerationSerializer {
    fn default() -> Self {
        Self::new()
    }
}
