use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide pipeline counters.
///
/// Shared by every connector and worker; updated with relaxed atomics and
/// reported at shutdown. This is the only mutable state the workers share
/// besides the sinks' known-index caches.
#[derive(Debug, Default)]
pub struct PipelineStats {
    records_enqueued: AtomicU64,
    records_dropped: AtomicU64,
    batches_dispatched: AtomicU64,
    batches_dropped: AtomicU64,
    reconnects: AtomicU64,
}

impl PipelineStats {
    pub fn note_enqueued(&self) {
        self.records_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_dropped_record(&self) {
        self.records_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_batch_dispatched(&self) {
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_batch_dropped(&self) {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn records_enqueued(&self) -> u64 {
        self.records_enqueued.load(Ordering::Relaxed)
    }

    pub fn records_dropped(&self) -> u64 {
        self.records_dropped.load(Ordering::Relaxed)
    }

    pub fn batches_dispatched(&self) -> u64 {
        self.batches_dispatched.load(Ordering::Relaxed)
    }

    pub fn batches_dropped(&self) -> u64 {
        self.batches_dropped.load(Ordering::Relaxed)
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }
}
