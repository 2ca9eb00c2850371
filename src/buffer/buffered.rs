use super::config::{BufferConfig, ClosePolicy};
use super::queue::LineQueue;
use super::stats::{BufferStats, StatsCollector};
use super::BufferError;
use crate::metrics::{BufferLoadMetric, NoopLoadMetric};
use crate::tailer::{ErrorReceiver, EventSelector, LineReceiver, Tailer, TailerError, TailerEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

/// Decouples a line source from its consumer through an unbounded queue.
///
/// Three tasks run per instance:
/// - forward: source lines → queue, source errors → error channel
/// - drain: queue → output channel, closed once the queue is closed and empty
/// - sample: reports the peak queue depth of every interval to the metric
///
/// The source is never blocked by a slow consumer; the backlog shows up as a
/// growing load metric instead. `BufferedTailer` is itself a [`Tailer`], so
/// it can wrap or be wrapped by other tailers.
///
/// Dropping a `BufferedTailer` closes it.
pub struct BufferedTailer<T> {
    lines: LineReceiver,
    errors: ErrorReceiver,
    shutdown: CancellationToken,
    _close_on_drop: DropGuard,
    queue: Arc<LineQueue>,
    stats: Arc<StatsCollector>,
    forwarder: JoinHandle<T>,
    drainer: JoinHandle<()>,
    sampler: JoinHandle<()>,
}

impl<T: Tailer + 'static> BufferedTailer<T> {
    /// Wraps `source`, registers `metric` and starts buffering with the
    /// default configuration. Must be called from within a tokio runtime.
    pub fn new(source: T, metric: Arc<dyn BufferLoadMetric>) -> Result<Self, BufferError> {
        Self::with_config(source, metric, BufferConfig::default())
    }

    pub fn without_metrics(source: T) -> Result<Self, BufferError> {
        Self::new(source, Arc::new(NoopLoadMetric))
    }

    pub fn with_config(
        source: T,
        metric: Arc<dyn BufferLoadMetric>,
        config: BufferConfig,
    ) -> Result<Self, BufferError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| BufferError::NoRuntime)?;

        let queue = Arc::new(LineQueue::new());
        let stats = Arc::new(StatsCollector::default());
        let shutdown = CancellationToken::new();
        let discarded = CancellationToken::new();
        let drained = CancellationToken::new();
        let (line_tx, line_rx) = mpsc::channel(config.output_capacity);
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let close_on_drop = shutdown.clone().drop_guard();

        metric.register();

        let forwarder = runtime.spawn(forward(Forwarder {
            source,
            queue: queue.clone(),
            stats: stats.clone(),
            errors: error_tx,
            shutdown: shutdown.clone(),
            discarded: discarded.clone(),
            close_policy: config.close_policy,
        }));

        let drainer = runtime.spawn(drain(
            queue.clone(),
            stats.clone(),
            line_tx,
            discarded,
            drained.clone(),
        ));

        let sampler = runtime.spawn(sample(
            queue.clone(),
            metric,
            config.sample_interval,
            drained,
        ));

        debug!(
            sample_interval = ?config.sample_interval,
            close_policy = ?config.close_policy,
            "Started buffered tailer"
        );

        Ok(Self {
            lines: line_rx,
            errors: error_rx,
            shutdown,
            _close_on_drop: close_on_drop,
            queue,
            stats,
            forwarder,
            drainer,
            sampler,
        })
    }

    /// Closes the tailer if still open and waits for its tasks to finish.
    ///
    /// Lines the consumer has not received yet are dropped, since nobody can
    /// read them any more. Returns the wrapped source and the final stats.
    /// A panic inside one of the tasks is propagated to the caller.
    pub async fn join(self) -> Result<(T, BufferStats), BufferError> {
        let Self {
            lines,
            errors,
            shutdown,
            _close_on_drop,
            queue,
            stats,
            forwarder,
            drainer,
            sampler,
        } = self;

        shutdown.cancel();
        drop(lines);
        drop(errors);

        let source = forwarder.await.map_err(|e| task_failure("forward", e))?;
        drainer.await.map_err(|e| task_failure("drain", e))?;
        sampler.await.map_err(|e| task_failure("sample", e))?;

        Ok((source, stats.snapshot(queue.len(), queue.lifetime_peak())))
    }
}

impl<T> BufferedTailer<T> {
    pub fn stats(&self) -> BufferStats {
        self.stats
            .snapshot(self.queue.len(), self.queue.lifetime_peak())
    }

    /// Number of lines currently buffered.
    pub fn depth(&self) -> usize {
        self.queue.len()
    }

    pub fn is_closing(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// True once every buffered line has been delivered and the output has
    /// ended.
    pub fn is_drained(&self) -> bool {
        self.drainer.is_finished()
    }
}

impl<T: Send> Tailer for BufferedTailer<T> {
    fn lines(&mut self) -> &mut LineReceiver {
        &mut self.lines
    }

    fn errors(&mut self) -> &mut ErrorReceiver {
        &mut self.errors
    }

    /// Closes the wrapped source. What happens to buffered lines depends on
    /// the configured [`ClosePolicy`]. Calling it again has no effect.
    fn close(&mut self) {
        self.shutdown.cancel();
    }
}

impl<T> std::fmt::Debug for BufferedTailer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedTailer")
            .field("stats", &self.stats())
            .field("closing", &self.is_closing())
            .finish_non_exhaustive()
    }
}

fn task_failure(task: &'static str, err: JoinError) -> BufferError {
    if err.is_panic() {
        std::panic::resume_unwind(err.into_panic());
    }
    BufferError::TaskFailed {
        task,
        reason: err.to_string(),
    }
}

struct Forwarder<T> {
    source: T,
    queue: Arc<LineQueue>,
    stats: Arc<StatsCollector>,
    errors: mpsc::UnboundedSender<TailerError>,
    shutdown: CancellationToken,
    discarded: CancellationToken,
    close_policy: ClosePolicy,
}

async fn forward<T: Tailer>(task: Forwarder<T>) -> T {
    let Forwarder {
        mut source,
        queue,
        stats,
        errors,
        shutdown,
        discarded,
        close_policy,
    } = task;

    let mut closing = false;
    let mut selector = EventSelector::new();

    loop {
        let event = tokio::select! {
            biased;
            () = shutdown.cancelled(), if !closing => None,
            event = selector.next(&mut source) => Some(event),
        };

        match event {
            Some(TailerEvent::Line(line)) => match queue.push(line) {
                Ok(()) => stats.record_pushed(),
                // Only after a discarding close.
                Err(_) => stats.record_dropped(1),
            },
            Some(TailerEvent::LinesEnded) => break,
            Some(TailerEvent::Error(error)) => relay_error(&errors, &stats, error),
            Some(TailerEvent::ErrorsEnded) => {}
            None => {
                closing = true;
                debug!(?close_policy, "Closing line source");
                source.close();

                if close_policy == ClosePolicy::Discard {
                    let dropped = queue.discard();
                    stats.record_dropped(dropped);
                    discarded.cancel();
                    if dropped > 0 {
                        warn!(dropped, "Discarded buffered lines on close");
                    }
                }
            }
        }
    }

    while let Ok(error) = source.errors().try_recv() {
        relay_error(&errors, &stats, error);
    }

    queue.close();
    debug!(buffered = queue.len(), "Line source ended");
    source
}

fn relay_error(
    errors: &mpsc::UnboundedSender<TailerError>,
    stats: &StatsCollector,
    error: TailerError,
) {
    match errors.send(error) {
        Ok(()) => stats.record_error_forwarded(),
        Err(mpsc::error::SendError(error)) => {
            warn!(error = %error, "Error receiver dropped, source error not delivered");
        }
    }
}

async fn drain(
    queue: Arc<LineQueue>,
    stats: Arc<StatsCollector>,
    output: mpsc::Sender<String>,
    discarded: CancellationToken,
    drained: CancellationToken,
) {
    let mut consumer_gone = false;

    while let Some(line) = queue.pop().await {
        if consumer_gone {
            stats.record_dropped(1);
            continue;
        }

        let sent = tokio::select! {
            biased;
            () = discarded.cancelled() => {
                stats.record_dropped(1);
                break;
            }
            sent = output.send(line) => sent,
        };

        if sent.is_ok() {
            stats.record_delivered();
        } else {
            warn!("Line receiver dropped, discarding buffered lines");
            consumer_gone = true;
            stats.record_dropped(1);
        }
    }

    drop(output);
    debug!("Line buffer drained, output closed");
    drained.cancel();
}

async fn sample(
    queue: Arc<LineQueue>,
    metric: Arc<dyn BufferLoadMetric>,
    interval: Duration,
    drained: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = drained.cancelled() => break,
            _ = ticker.tick() => metric.observe(queue.take_window_peak() as f64),
        }
    }

    // Flush the peak of the last, partial interval.
    metric.observe(queue.take_window_peak() as f64);
    metric.unregister();
    debug!("Line buffer sampler stopped");
}
