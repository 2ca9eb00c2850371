pub mod config;
pub mod logging;
pub mod shutdown;

pub use config::{Config, ConfigError, LogFormat, LogLevel};
pub use logging::{LoggingError, setup_logging};

use crate::buffer::{BufferStats, BufferedTailer};
use crate::metrics::TracingLoadMetric;
use crate::tailer::{EventSelector, ReaderTailer, Tailer, TailerEvent};
use anyhow::Context;
use std::future::Future;
use std::process;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tracing::{error, info, warn};

pub struct App {
    config: Config,
}

impl App {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::from_config(Config::from_args_and_file(args)?))
    }

    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Buffers stdin to stdout until stdin ends or a shutdown signal arrives.
    ///
    /// Stdin is read on a blocking thread; after a signal on an interactive
    /// terminal the process may only exit once the pending read returns.
    pub async fn run(self) -> anyhow::Result<BufferStats> {
        let stdin = BufReader::new(tokio::io::stdin());
        run_pipeline(
            &self.config,
            stdin,
            tokio::io::stdout(),
            shutdown::wait_for_signal(),
        )
        .await
    }
}

/// Reads lines from `reader` through a [`BufferedTailer`] and writes them to
/// `writer`, one per line. Input errors are logged and do not stop the
/// pipeline. Once `shutdown` resolves the buffer is closed and whatever it
/// still delivers is written before returning.
pub async fn run_pipeline<R, W, S>(
    config: &Config,
    reader: R,
    writer: W,
    shutdown: S,
) -> anyhow::Result<BufferStats>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let source =
        ReaderTailer::new(reader, config.input_capacity).context("Failed to start input reader")?;
    let mut metric = TracingLoadMetric::new("input");
    if let Some(threshold) = config.overload_threshold {
        metric = metric.with_overload_threshold(threshold);
    }

    let mut buffered = BufferedTailer::with_config(source, Arc::new(metric), config.buffer.clone())
        .context("Failed to start line buffer")?;
    let mut writer = BufWriter::new(writer);

    tokio::pin!(shutdown);
    let mut shutdown_requested = false;
    let mut selector = EventSelector::new();

    loop {
        let event = tokio::select! {
            () = &mut shutdown, if !shutdown_requested => None,
            event = selector.next(&mut buffered) => Some(event),
        };

        match event {
            Some(TailerEvent::Line(line)) => {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                if buffered.depth() == 0 {
                    writer.flush().await?;
                }
            }
            Some(TailerEvent::Error(e)) => warn!(error = %e, "Input error"),
            Some(TailerEvent::ErrorsEnded) => {}
            Some(TailerEvent::LinesEnded) => break,
            None => {
                info!("Shutdown requested, closing line buffer");
                shutdown_requested = true;
                buffered.close();
            }
        }
    }

    writer.flush().await.context("Failed to flush output")?;

    let (_source, stats) = buffered.join().await?;
    info!(
        pushed = stats.pushed,
        delivered = stats.delivered,
        dropped = stats.dropped,
        errors = stats.errors_forwarded,
        peak_depth = stats.peak_depth,
        "Line buffer stopped"
    );
    Ok(stats)
}

// Main entry point for the application
pub async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = match App::from_args(std::env::args_os()) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            process::exit(2);
        }
    };

    setup_logging(app.config().log_level, app.config().log_format)?;
    info!("Starting rask-tail-buffer v{}", crate::VERSION);

    if let Err(e) = app.run().await {
        error!("Application error: {:#}", e);
        process::exit(1);
    }

    Ok(())
}
