// Bounded pool for CPU-heavy work (decoding, resampling, encoding).
//
// Permits are only ever held by leaf units of work. A task waiting on its
// children never holds one, so nested fan-out cannot starve the pool.
//
// `DecodeSlots` bounds memory rather than CPU: a file takes a slot before it
// is decoded and gives it back once every size has been rendered.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::error::ProcessingError;

#[derive(Debug, Clone)]
pub struct RenderPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl RenderPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// One slot per available CPU.
    pub fn with_available_parallelism() -> Self {
        Self::new(std::thread::available_parallelism().map_or(4, |n| n.get()))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Run `work` on the blocking thread pool once a slot is free.
    pub async fn run<F, T>(&self, work: F) -> Result<T, ProcessingError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ProcessingError::TaskFailure(format!("render pool closed: {}", e)))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            work()
        })
        .await
        .map_err(|e| ProcessingError::TaskFailure(e.to_string()))
    }
}

/// Limit on the number of files holding decoded pixels at the same time.
#[derive(Debug, Clone)]
pub struct DecodeSlots {
    permits: Arc<Semaphore>,
    capacity: usize,
    held: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

/// A file's right to keep a decoded image in memory. Released on drop.
#[derive(Debug)]
pub struct DecodeSlot {
    _permit: OwnedSemaphorePermit,
    held: Arc<AtomicUsize>,
}

impl Drop for DecodeSlot {
    fn drop(&mut self) {
        self.held.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DecodeSlots {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            held: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    /// Highest number of slots ever held at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Wait for a free slot. Waiters are admitted in arrival order.
    pub async fn acquire(&self) -> Result<DecodeSlot, ProcessingError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ProcessingError::TaskFailure(format!("decode slots closed: {}", e)))?;

        let now = self.held.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Ok(DecodeSlot {
            _permit: permit,
            held: self.held.clone(),
        })
    }
}
