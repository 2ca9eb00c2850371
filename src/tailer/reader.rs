use super::{ErrorReceiver, LineReceiver, Tailer, TailerError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A [`Tailer`] over any async buffered reader, e.g. stdin.
///
/// A background task reads lines until EOF, a read error, or `close()`.
/// Read errors are reported on the error stream and end the line stream.
/// Fails with [`TailerError::NoRuntime`] outside a tokio runtime.
#[derive(Debug)]
pub struct ReaderTailer {
    lines: LineReceiver,
    errors: ErrorReceiver,
    cancel: CancellationToken,
}

impl ReaderTailer {
    pub fn new<R>(reader: R, capacity: usize) -> Result<Self, TailerError>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| TailerError::NoRuntime)?;
        let (line_tx, line_rx) = mpsc::channel(capacity.max(1));
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        runtime.spawn(read_lines(reader, line_tx, error_tx, cancel.clone()));

        Ok(Self {
            lines: line_rx,
            errors: error_rx,
            cancel,
        })
    }
}

async fn read_lines<R>(
    reader: R,
    line_tx: mpsc::Sender<String>,
    error_tx: mpsc::UnboundedSender<TailerError>,
    cancel: CancellationToken,
) where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut count: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = lines.next_line() => next,
        };

        match next {
            Ok(Some(line)) => {
                if line_tx.send(line).await.is_err() {
                    break;
                }
                count += 1;
            }
            Ok(None) => {
                debug!(lines = count, "Reader reached end of input");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Reader failed, ending line stream");
                if error_tx.send(TailerError::Io(e)).is_err() {
                    debug!("Error receiver dropped, read error not delivered");
                }
                break;
            }
        }
    }
}

impl Tailer for ReaderTailer {
    fn lines(&mut self) -> &mut LineReceiver {
        &mut self.lines
    }

    fn errors(&mut self) -> &mut ErrorReceiver {
        &mut self.errors
    }

    fn close(&mut self) {
        self.cancel.cancel();
        self.lines.close();
        self.errors.close();
    }
}

impl Drop for ReaderTailer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
