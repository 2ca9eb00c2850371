use super::BufferLoadMetric;
use prometheus::{Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Error, Debug)]
pub enum LoadMetricError {
    #[error("Prometheus error: {0}")]
    PrometheusError(#[from] prometheus::Error),
    #[error("Metrics encoding error: {0}")]
    EncodingError(String),
}

/// Exposes the buffer load as Prometheus metrics.
///
/// `line_buffer_peak_load` is a histogram of the reported samples,
/// `line_buffer_load` a gauge holding the latest one. Both carry a constant
/// `buffer` label and live in the given registry only between `register`
/// and `unregister`.
pub struct PrometheusLoadMetric {
    registry: Registry,
    peak_load: Histogram,
    current_load: Gauge,
    registered: AtomicBool,
}

impl PrometheusLoadMetric {
    pub fn new(registry: Registry, buffer_name: &str) -> Result<Self, LoadMetricError> {
        let peak_load = Histogram::with_opts(
            HistogramOpts::new(
                "line_buffer_peak_load",
                "Highest number of buffered lines per sample interval",
            )
            .const_label("buffer", buffer_name)
            .buckets(prometheus::exponential_buckets(1.0, 4.0, 10)?),
        )?;

        let current_load = Gauge::with_opts(
            Opts::new("line_buffer_load", "Most recent buffered line sample")
                .const_label("buffer", buffer_name),
        )?;

        Ok(Self {
            registry,
            peak_load,
            current_load,
            registered: AtomicBool::new(false),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Renders the whole registry in the Prometheus text format.
    pub fn export_text(&self) -> Result<String, LoadMetricError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;

        String::from_utf8(buffer).map_err(|e| LoadMetricError::EncodingError(e.to_string()))
    }

    fn try_register(&self) -> Result<(), LoadMetricError> {
        self.registry.register(Box::new(self.peak_load.clone()))?;
        if let Err(e) = self.registry.register(Box::new(self.current_load.clone())) {
            let _ = self.registry.unregister(Box::new(self.peak_load.clone()));
            return Err(e.into());
        }
        Ok(())
    }
}

impl BufferLoadMetric for PrometheusLoadMetric {
    fn register(&self) {
        match self.try_register() {
            Ok(()) => {
                self.registered.store(true, Ordering::Release);
                debug!("Registered line buffer load metrics");
            }
            Err(e) => error!(error = %e, "Failed to register line buffer load metrics"),
        }
    }

    fn observe(&self, load: f64) {
        self.peak_load.observe(load);
        self.current_load.set(load);
    }

    fn unregister(&self) {
        if !self.registered.swap(false, Ordering::AcqRel) {
            return;
        }

        for result in [
            self.registry.unregister(Box::new(self.peak_load.clone())),
            self.registry.unregister(Box::new(self.current_load.clone())),
        ] {
            if let Err(e) = result {
                error!(error = %e, "Failed to unregister line buffer load metrics");
            }
        }
    }
}
