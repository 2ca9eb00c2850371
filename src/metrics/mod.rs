#[cfg(feature = "metrics")]
pub mod prometheus_load;

#[cfg(feature = "metrics")]
pub use prometheus_load::{LoadMetricError, PrometheusLoadMetric};

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Receives the buffer load of one [`crate::BufferedTailer`].
///
/// `register` is called once before the first `observe`, `unregister` once
/// after the last. `observe` may run concurrently with the owner's `close`,
/// so implementations must be thread-safe.
pub trait BufferLoadMetric: Send + Sync {
    fn register(&self);

    fn observe(&self, load: f64);

    fn unregister(&self);
}

/// Discards every observation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLoadMetric;

impl BufferLoadMetric for NoopLoadMetric {
    fn register(&self) {}

    fn observe(&self, _load: f64) {}

    fn unregister(&self) {}
}

/// Reports the load through `tracing`.
///
/// Samples are logged at debug level. Once a sample reaches the overload
/// threshold a warning is logged, and another info line once the load falls
/// back below it.
#[derive(Debug)]
pub struct TracingLoadMetric {
    name: String,
    overload_threshold: Option<f64>,
    overloaded: AtomicBool,
}

impl TracingLoadMetric {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overload_threshold: None,
            overloaded: AtomicBool::new(false),
        }
    }

    pub fn with_overload_threshold(mut self, threshold: usize) -> Self {
        self.overload_threshold = Some(threshold as f64);
        self
    }

    pub fn is_overloaded(&self) -> bool {
        self.overloaded.load(Ordering::Relaxed)
    }
}

impl BufferLoadMetric for TracingLoadMetric {
    fn register(&self) {
        info!(buffer = %self.name, "Line buffer load metric registered");
    }

    fn observe(&self, load: f64) {
        debug!(buffer = %self.name, load, "Line buffer load sample");

        let Some(threshold) = self.overload_threshold else {
            return;
        };

        let over = load >= threshold;
        if over != self.overloaded.swap(over, Ordering::Relaxed) {
            if over {
                warn!(
                    buffer = %self.name,
                    load,
                    threshold,
                    "Line buffer is overloaded, consumer is falling behind"
                );
            } else {
                info!(buffer = %self.name, load, threshold, "Line buffer load recovered");
            }
        }
    }

    fn unregister(&self) {
        info!(buffer = %self.name, "Line buffer load metric unregistered");
    }
}
