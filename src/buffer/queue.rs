use super::BufferError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Unbounded FIFO of lines with an async blocking `pop` and a lock-free
/// length query.
///
/// Built for one pushing task and one popping task. The length and both peak
/// trackers are atomics, so samplers never contend for the lock.
#[derive(Debug, Default)]
pub struct LineQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    len: AtomicUsize,
    window_peak: AtomicUsize,
    lifetime_peak: AtomicUsize,
}

#[derive(Debug, Default)]
struct QueueState {
    lines: VecDeque<String>,
    closed: bool,
}

impl LineQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a line. Fails once the queue has been closed.
    pub fn push(&self, line: String) -> Result<(), BufferError> {
        let depth = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(BufferError::Closed);
            }
            state.lines.push_back(line);
            let depth = state.lines.len();
            self.len.store(depth, Ordering::Release);
            depth
        };

        self.window_peak.fetch_max(depth, Ordering::AcqRel);
        self.lifetime_peak.fetch_max(depth, Ordering::Relaxed);
        self.notify.notify_one();
        Ok(())
    }

    /// Removes the head line, waiting while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and every line has been
    /// popped.
    pub async fn pop(&self) -> Option<String> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(line) = state.lines.pop_front() {
                    self.len.store(state.lines.len(), Ordering::Release);
                    return Some(line);
                }
                if state.closed {
                    return None;
                }
            }

            // A push between the unlock above and this await leaves a
            // permit behind, so the wakeup is not lost.
            self.notify.notified().await;
        }
    }

    /// Marks the queue as having no more input. Buffered lines stay poppable.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_one();
    }

    /// Closes the queue and drops every buffered line. Returns how many were
    /// dropped.
    pub fn discard(&self) -> usize {
        let dropped = {
            let mut state = self.state.lock();
            state.closed = true;
            let dropped = state.lines.len();
            state.lines.clear();
            self.len.store(0, Ordering::Release);
            dropped
        };

        self.notify.notify_one();
        dropped
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Highest depth since the previous call, never below the current depth.
    /// Starts a new window at the current depth.
    pub fn take_window_peak(&self) -> usize {
        let current = self.len();
        self.window_peak
            .swap(current, Ordering::AcqRel)
            .max(current)
    }

    pub fn lifetime_peak(&self) -> usize {
        self.lifetime_peak.load(Ordering::Relaxed)
    }
}
