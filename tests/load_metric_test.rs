mod common;

use common::{MetricEvent, RecordingMetric, assert_lifecycle, fast_config, line};
use mockall::mock;
use rask_tail_buffer::{
    BufferConfig, BufferLoadMetric, BufferedTailer, ChannelTailer, ClosePolicy, Tailer,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

mock! {
    pub LoadMetric {}

    impl BufferLoadMetric for LoadMetric {
        fn register(&self);
        fn observe(&self, load: f64);
        fn unregister(&self);
    }
}

#[tokio::test]
async fn test_mock_metric_registered_and_unregistered_once() {
    let mut metric = MockLoadMetric::new();
    metric.expect_register().times(1).return_const(());
    metric
        .expect_observe()
        .withf(|load| *load >= 0.0 && *load <= 100.0)
        .returning(|_| ());
    metric.expect_unregister().times(1).return_const(());

    let (source, producer) = ChannelTailer::new(4);
    let mut buffered = BufferedTailer::with_config(source, Arc::new(metric), fast_config()).unwrap();

    for i in 0..100 {
        producer.send_line(line(i)).await.unwrap();
    }
    for i in 0..100 {
        assert_eq!(buffered.lines().recv().await, Some(line(i)));
    }

    buffered.close();
    assert!(buffered.lines().recv().await.is_none());

    // The sampler owns the last handle; expectations are verified when it
    // drops it, and a failure surfaces here as a panic.
    buffered.join().await.unwrap();
}

#[tokio::test]
async fn test_unregister_waits_for_output_to_end() {
    let (source, producer) = ChannelTailer::new(64);
    let metric = RecordingMetric::new();
    let mut buffered = BufferedTailer::with_config(source, metric.clone(), fast_config()).unwrap();

    for i in 0..50 {
        producer.send_line(line(i)).await.unwrap();
    }
    buffered.close();

    // Several sample intervals pass while lines are still waiting.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(metric.count(MetricEvent::Register), 1);
    assert!(!metric.is_unregistered());

    for i in 0..50 {
        assert_eq!(buffered.lines().recv().await, Some(line(i)));
    }
    assert!(buffered.lines().recv().await.is_none());

    buffered.join().await.unwrap();
    assert_lifecycle(&metric);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_samples_never_exceed_lines_produced() {
    let produced = Arc::new(AtomicUsize::new(0));
    let metric = RecordingMetric::with_production_counter(produced.clone());
    let (source, producer) = ChannelTailer::new(1);
    let config = BufferConfig {
        sample_interval: Duration::from_millis(1),
        ..fast_config()
    };
    let mut buffered = BufferedTailer::with_config(source, metric.clone(), config).unwrap();

    let producing = tokio::spawn(async move {
        for i in 0..5_000 {
            // Counted before the send so a sample can never run ahead of it.
            produced.fetch_add(1, Ordering::SeqCst);
            producer.send_line(line(i)).await.unwrap();
            if i % 500 == 0 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        }
    });

    for i in 0..5_000 {
        assert_eq!(buffered.lines().recv().await, Some(line(i)));
        if i % 1_000 == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
    producing.await.unwrap();

    buffered.close();
    assert!(buffered.lines().recv().await.is_none());
    buffered.join().await.unwrap();

    assert!(metric.over_produced().is_empty(), "{:?}", metric.over_produced());
    assert!(metric.samples().iter().all(|load| *load >= 0.0));
    assert_lifecycle(&metric);
}

#[tokio::test]
async fn test_quiescent_backlog_is_reported() {
    let (source, producer) = ChannelTailer::new(16);
    let metric = RecordingMetric::new();
    let mut buffered = BufferedTailer::with_config(source, metric.clone(), fast_config()).unwrap();

    for i in 0..500 {
        producer.send_line(line(i)).await.unwrap();
    }
    tokio::time::timeout(Duration::from_secs(5), async {
        while buffered.stats().pushed < 500 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();

    // Nothing moves for a few intervals; every sample taken now sees the
    // whole backlog minus what the output channel already holds.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let samples = metric.samples();
    let last = *samples.last().expect("sampled at least once");
    assert!((498.0..=500.0).contains(&last), "last sample {last}");
    assert!(buffered.depth() >= 498);

    buffered.close();
    let mut count = 0;
    while buffered.lines().recv().await.is_some() {
        count += 1;
    }
    assert_eq!(count, 500);
    buffered.join().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fast_consumer_keeps_load_low() {
    const LINES: usize = 10_000;

    let (source, producer) = ChannelTailer::new(1);
    let metric = RecordingMetric::new();
    let mut buffered = BufferedTailer::with_config(source, metric.clone(), fast_config()).unwrap();

    let producing = tokio::spawn(async move {
        for i in 0..LINES {
            producer.send_line(line(i)).await.unwrap();
            if i % 100 == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }
    });

    for i in 0..LINES {
        assert_eq!(buffered.lines().recv().await, Some(line(i)));
    }
    producing.await.unwrap();

    buffered.close();
    assert!(buffered.lines().recv().await.is_none());
    let (_source, stats) = buffered.join().await.unwrap();

    let peak = metric.peak();
    assert!(peak < (LINES / 10) as f64, "peak load {peak}");
    assert!(stats.peak_depth < LINES / 10);
    assert_lifecycle(&metric);
}

#[tokio::test]
async fn test_burst_within_one_interval_reports_its_peak() {
    let (source, producer) = ChannelTailer::new(256);
    let metric = RecordingMetric::new();
    let config = BufferConfig {
        sample_interval: Duration::from_millis(500),
        ..BufferConfig::default()
    };
    let mut buffered = BufferedTailer::with_config(source, metric.clone(), config).unwrap();

    for i in 0..200 {
        producer.send_line(line(i)).await.unwrap();
    }
    tokio::time::timeout(Duration::from_secs(1), async {
        while buffered.stats().pushed < 200 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    for i in 0..200 {
        assert_eq!(buffered.lines().recv().await, Some(line(i)));
    }
    assert_eq!(buffered.depth(), 0);

    // The first tick comes after the burst is gone.
    tokio::time::sleep(Duration::from_millis(600)).await;
    let samples = metric.samples();
    let first = *samples.first().expect("sampled once the interval elapsed");
    assert!((198.0..=200.0).contains(&first), "samples {samples:?}");

    buffered.close();
    assert!(buffered.lines().recv().await.is_none());
    buffered.join().await.unwrap();
    assert_lifecycle(&metric);
}

#[tokio::test]
async fn test_close_without_lines_reports_zero_load() {
    let (source, _producer) = ChannelTailer::new(1);
    let metric = RecordingMetric::new();
    let config = BufferConfig {
        close_policy: ClosePolicy::Discard,
        ..fast_config()
    };
    let mut buffered = BufferedTailer::with_config(source, metric.clone(), config).unwrap();

    buffered.close();
    assert!(buffered.lines().recv().await.is_none());
    let (_source, stats) = buffered.join().await.unwrap();

    assert_eq!(stats.dropped, 0);
    assert_lifecycle(&metric);
    assert!(metric.samples().iter().all(|load| *load == 0.0));
}

#[cfg(feature = "metrics")]
#[tokio::test]
async fn test_prometheus_metric_follows_buffer_lifetime() {
    use prometheus::Registry;
    use rask_tail_buffer::metrics::PrometheusLoadMetric;

    let registry = Registry::new();
    let metric = Arc::new(PrometheusLoadMetric::new(registry.clone(), "app").unwrap());
    let (source, producer) = ChannelTailer::new(16);
    let mut buffered = BufferedTailer::with_config(source, metric.clone(), fast_config()).unwrap();
    assert!(metric.is_registered());

    for i in 0..10 {
        producer.send_line(line(i)).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(30)).await;
    let text = metric.export_text().unwrap();
    assert!(text.contains("line_buffer_peak_load_count{buffer=\"app\"}"));

    buffered.close();
    while buffered.lines().recv().await.is_some() {}
    buffered.join().await.unwrap();

    assert!(!metric.is_registered());
    assert!(registry.gather().is_empty());
}
