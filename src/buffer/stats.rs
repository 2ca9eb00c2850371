use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time counters of a [`crate::BufferedTailer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Lines appended to the queue.
    pub pushed: u64,
    /// Lines handed to the consumer's output channel.
    pub delivered: u64,
    /// Lines discarded on close or after the consumer went away.
    pub dropped: u64,
    pub errors_forwarded: u64,
    /// Lines currently queued.
    pub depth: usize,
    /// Highest depth seen over the buffer's lifetime.
    pub peak_depth: usize,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCollector {
    pushed: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    errors_forwarded: AtomicU64,
}

impl StatsCollector {
    pub(crate) fn record_pushed(&self) {
        self.pushed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self, count: usize) {
        self.dropped.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_error_forwarded(&self) {
        self.errors_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, depth: usize, peak_depth: usize) -> BufferStats {
        BufferStats {
            pushed: self.pushed.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            errors_forwarded: self.errors_forwarded.load(Ordering::Relaxed),
            depth,
            peak_depth,
        }
    }
}
