use super::{ErrorReceiver, LineReceiver, Tailer, TailerError};
use tokio::sync::mpsc::{self, error::SendError};

/// A [`Tailer`] fed through channels by a [`LineProducer`].
///
/// Useful for wiring sources that already push lines from their own task,
/// and as a stand-in source in tests.
#[derive(Debug)]
pub struct ChannelTailer {
    lines: LineReceiver,
    errors: ErrorReceiver,
}

/// Write side of a [`ChannelTailer`].
#[derive(Debug, Clone)]
pub struct LineProducer {
    lines: mpsc::Sender<String>,
    errors: mpsc::UnboundedSender<TailerError>,
}

impl ChannelTailer {
    /// `capacity` bounds the lines in flight between producer and reader;
    /// it must be greater than zero.
    pub fn new(capacity: usize) -> (Self, LineProducer) {
        let (line_tx, line_rx) = mpsc::channel(capacity.max(1));
        let (error_tx, error_rx) = mpsc::unbounded_channel();

        (
            Self {
                lines: line_rx,
                errors: error_rx,
            },
            LineProducer {
                lines: line_tx,
                errors: error_tx,
            },
        )
    }
}

impl Tailer for ChannelTailer {
    fn lines(&mut self) -> &mut LineReceiver {
        &mut self.lines
    }

    fn errors(&mut self) -> &mut ErrorReceiver {
        &mut self.errors
    }

    fn close(&mut self) {
        self.lines.close();
        self.errors.close();
    }
}

impl LineProducer {
    /// Waits for a free slot, then sends. Fails once the tailer is closed.
    pub async fn send_line(&self, line: impl Into<String>) -> Result<(), SendError<String>> {
        self.lines.send(line.into()).await
    }

    pub fn send_error(&self, error: TailerError) -> Result<(), SendError<TailerError>> {
        self.errors.send(error)
    }

    pub fn is_closed(&self) -> bool {
        self.lines.is_closed()
    }

    /// Completes once the tailer has been closed or dropped.
    pub async fn closed(&self) {
        self.lines.closed().await;
    }
}
