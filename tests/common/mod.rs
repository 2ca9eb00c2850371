#![allow(dead_code)]

use parking_lot::Mutex;
use rask_tail_buffer::{BufferConfig, BufferLoadMetric};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricEvent {
    Register,
    Observe(f64),
    Unregister,
}

/// Records every call, and every sample that exceeds the number of lines
/// produced so far when a production counter is attached.
#[derive(Debug, Default)]
pub struct RecordingMetric {
    events: Mutex<Vec<MetricEvent>>,
    produced: Option<Arc<AtomicUsize>>,
    over_produced: Mutex<Vec<(f64, usize)>>,
}

impl RecordingMetric {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_production_counter(produced: Arc<AtomicUsize>) -> Arc<Self> {
        Arc::new(Self {
            produced: Some(produced),
            ..Self::default()
        })
    }

    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, event: MetricEvent) -> usize {
        self.events.lock().iter().filter(|e| **e == event).count()
    }

    pub fn samples(&self) -> Vec<f64> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                MetricEvent::Observe(load) => Some(*load),
                _ => None,
            })
            .collect()
    }

    pub fn peak(&self) -> f64 {
        self.samples().into_iter().fold(0.0, f64::max)
    }

    pub fn is_unregistered(&self) -> bool {
        self.count(MetricEvent::Unregister) > 0
    }

    pub fn over_produced(&self) -> Vec<(f64, usize)> {
        self.over_produced.lock().clone()
    }
}

impl BufferLoadMetric for RecordingMetric {
    fn register(&self) {
        self.events.lock().push(MetricEvent::Register);
    }

    fn observe(&self, load: f64) {
        if let Some(produced) = &self.produced {
            let produced = produced.load(Ordering::SeqCst);
            if load > produced as f64 {
                self.over_produced.lock().push((load, produced));
            }
        }
        self.events.lock().push(MetricEvent::Observe(load));
    }

    fn unregister(&self) {
        self.events.lock().push(MetricEvent::Unregister);
    }
}

pub fn line(i: usize) -> String {
    format!("This is line number {i}.")
}

pub fn fast_config() -> BufferConfig {
    BufferConfig {
        sample_interval: Duration::from_millis(10),
        ..BufferConfig::default()
    }
}

/// Registered exactly once first, unregistered exactly once last, with only
/// samples in between.
pub fn assert_lifecycle(metric: &RecordingMetric) {
    let events = metric.events();
    assert_eq!(events.first(), Some(&MetricEvent::Register), "{events:?}");
    assert_eq!(events.last(), Some(&MetricEvent::Unregister), "{events:?}");
    assert_eq!(metric.count(MetricEvent::Register), 1);
    assert_eq!(metric.count(MetricEvent::Unregister), 1);
    assert!(
        events[1..events.len() - 1]
            .iter()
            .all(|e| matches!(e, MetricEvent::Observe(load) if *load >= 0.0)),
        "{events:?}"
    );
}
