//! Metrics collaborator notified of publish outcomes.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::DeliveryError;

/// Receives outcome counters from the engine.
///
/// Implementations are shared by every worker of an output group and must
/// therefore be callable concurrently.
pub trait Observer: Send + Sync {
    fn new_batch(&self, count: usize);
    fn acked(&self, count: usize);
    fn failed(&self, count: usize);
    fn write_error(&self, err: &DeliveryError);
    fn write_bytes(&self, count: usize);
}

/// Observer that discards every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn new_batch(&self, _count: usize) {}
    fn acked(&self, _count: usize) {}
    fn failed(&self, _count: usize) {}
    fn write_error(&self, _err: &DeliveryError) {}
    fn write_bytes(&self, _count: usize) {}
}

/// Point-in-time copy of a [`CountingObserver`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ObserverSnapshot {
    pub batches: u64,
    pub events: u64,
    pub acked: u64,
    pub failed: u64,
    pub write_errors: u64,
    pub write_bytes: u64,
}

/// Observer accumulating totals in atomic counters.
#[derive(Debug, Default)]
pub struct CountingObserver {
    batches: AtomicU64,
    events: AtomicU64,
    acked: AtomicU64,
    failed: AtomicU64,
    write_errors: AtomicU64,
    write_bytes: AtomicU64,
}

impl CountingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ObserverSnapshot {
        ObserverSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            write_bytes: self.write_bytes.load(Ordering::Relaxed),
        }
    }
}

fn add(counter: &AtomicU64, count: usize) {
    counter.fetch_add(count as u64, Ordering::Relaxed);
}

impl Observer for CountingObserver {
    fn new_batch(&self, count: usize) {
        add(&self.batches, 1);
        add(&self.events, count);
    }

    fn acked(&self, count: usize) {
        add(&self.acked, count);
    }

    fn failed(&self, count: usize) {
        add(&self.failed, count);
    }

    fn write_error(&self, _err: &DeliveryError) {
        add(&self.write_errors, 1);
    }

    fn write_bytes(&self, count: usize) {
        add(&self.write_bytes, count);
    }
}
