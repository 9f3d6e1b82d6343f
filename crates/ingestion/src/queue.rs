//! BoundedDropQueue - fixed-capacity FIFO that evicts the oldest item
//!
//! Backpressure primitive between producer threads (capture loops, bus
//! callbacks) and consumers. Built on a bounded `async_channel`; the producer
//! side keeps a receiver clone so a full queue can pop its own head before
//! inserting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_channel::{Receiver, Sender, TryRecvError, TrySendError};
use tracing::{trace, warn};

/// Queue counters
#[derive(Debug, Default)]
pub struct QueueMetrics {
    pushed: AtomicU64,
    evicted: AtomicU64,
    popped: AtomicU64,
}

impl QueueMetrics {
    pub fn snapshot(&self) -> QueueMetricsSnapshot {
        QueueMetricsSnapshot {
            pushed: self.pushed.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            popped: self.popped.load(Ordering::Relaxed),
        }
    }
}

/// Queue counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueMetricsSnapshot {
    pub pushed: u64,
    pub evicted: u64,
    pub popped: u64,
}

/// Bounded multi-producer multi-consumer FIFO with drop-oldest overflow.
///
/// Clones share the same queue.
pub struct BoundedDropQueue<T> {
    name: Arc<str>,
    capacity: usize,
    tx: Sender<T>,
    rx: Receiver<T>,
    metrics: Arc<QueueMetrics>,
}

impl<T> Clone for BoundedDropQueue<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            capacity: self.capacity,
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<T> BoundedDropQueue<T> {
    /// Create a queue holding at most `capacity` items (0 is raised to 1)
    pub fn new(name: impl Into<Arc<str>>, capacity: usize) -> Self {
        let name = name.into();
        let capacity = if capacity == 0 {
            warn!(queue = %name, "Queue capacity 0 raised to 1");
            1
        } else {
            capacity
        };
        let (tx, rx) = async_channel::bounded(capacity);
        Self {
            name,
            capacity,
            tx,
            rx,
            metrics: Arc::new(QueueMetrics::default()),
        }
    }

    /// Insert without blocking; when full the FIFO head is evicted first.
    ///
    /// Items put after [`close`](Self::close) are dropped.
    pub fn put(&self, item: T) {
        let mut item = item;
        loop {
            match self.tx.try_send(item) {
                Ok(()) => {
                    self.metrics.pushed.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(TrySendError::Full(back)) => {
                    item = back;
                    // Another consumer may have won the race; just retry then.
                    if self.rx.try_recv().is_ok() {
                        self.metrics.evicted.fetch_add(1, Ordering::Relaxed);
                        observability::record_queue_eviction(&self.name);
                        trace!(queue = %self.name, "Queue full, evicted oldest item");
                    }
                }
                Err(TrySendError::Closed(_)) => {
                    trace!(queue = %self.name, "Queue closed, item dropped");
                    return;
                }
            }
        }
    }

    /// Block until an item is available.
    ///
    /// Returns `None` once the queue is closed and empty.
    pub fn get(&self) -> Option<T> {
        let item = self.rx.recv_blocking().ok()?;
        self.metrics.popped.fetch_add(1, Ordering::Relaxed);
        Some(item)
    }

    /// Oldest item, or `None` immediately when empty
    pub fn try_get(&self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(item) => {
                self.metrics.popped.fetch_add(1, Ordering::Relaxed);
                Some(item)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
        }
    }

    /// Pop everything and return only the newest item
    pub fn drain_latest(&self) -> Option<T> {
        let mut latest = None;
        while let Some(item) = self.try_get() {
            latest = Some(item);
        }
        latest
    }

    /// Discard all queued items, returning how many were dropped.
    ///
    /// Items put concurrently with the clear may survive it.
    pub fn clear(&self) -> usize {
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }

    /// Reject further puts and wake blocked consumers once drained
    pub fn close(&self) {
        self.tx.close();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> QueueMetricsSnapshot {
        self.metrics.snapshot()
    }
}
