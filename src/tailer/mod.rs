pub mod channel;
pub mod reader;

use std::future::poll_fn;
use std::path::PathBuf;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::mpsc;

pub use channel::{ChannelTailer, LineProducer};
pub use reader::ReaderTailer;

/// Ordered stream of lines produced by a [`Tailer`].
pub type LineReceiver = mpsc::Receiver<String>;

/// Stream of errors reported by a [`Tailer`], separate from its lines.
pub type ErrorReceiver = mpsc::UnboundedReceiver<TailerError>;

/// Errors reported by a line source. They are delivered to the consumer as
/// values; none of them ends the line stream on its own.
#[derive(Error, Debug)]
pub enum TailerError {
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("I/O error while reading lines: {0}")]
    Io(#[from] std::io::Error),

    #[error("File watcher error: {0}")]
    Watcher(String),

    #[error("No tokio runtime available to read lines")]
    NoRuntime,

    #[error("{0}")]
    Other(String),
}

/// A source of text lines.
///
/// `lines()` yields lines in producer order and returns `None` once the
/// source has ended. `errors()` yields errors on a separate stream.
/// `close()` ends both streams; values already produced may still be
/// received before `None`.
///
/// [`crate::BufferedTailer`] implements this trait as well, so buffering
/// stages can wrap any source, including another buffered one.
pub trait Tailer: Send {
    fn lines(&mut self) -> &mut LineReceiver;

    fn errors(&mut self) -> &mut ErrorReceiver;

    fn close(&mut self);
}

impl<T: Tailer + ?Sized> Tailer for Box<T> {
    fn lines(&mut self) -> &mut LineReceiver {
        (**self).lines()
    }

    fn errors(&mut self) -> &mut ErrorReceiver {
        (**self).errors()
    }

    fn close(&mut self) {
        (**self).close();
    }
}

/// Next thing a [`Tailer`] has to offer on either of its streams.
#[derive(Debug)]
pub enum TailerEvent {
    Line(String),
    Error(TailerError),
    LinesEnded,
    ErrorsEnded,
}

/// Fair reader of both streams of one tailer.
///
/// After a line the error stream is polled first, after an error the line
/// stream, so neither stream can starve the other. `ErrorsEnded` is
/// returned once; the error stream is not polled afterwards. Pending errors
/// are still returned before `LinesEnded`.
#[derive(Debug)]
pub struct EventSelector {
    errors_open: bool,
    errors_first: bool,
}

impl Default for EventSelector {
    fn default() -> Self {
        Self {
            errors_open: true,
            errors_first: true,
        }
    }
}

impl EventSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors_open(&self) -> bool {
        self.errors_open
    }

    pub fn poll_next<T: Tailer + ?Sized>(
        &mut self,
        tailer: &mut T,
        cx: &mut Context<'_>,
    ) -> Poll<TailerEvent> {
        if !self.errors_open {
            return poll_lines(tailer, cx);
        }

        let event = if self.errors_first {
            match poll_errors(tailer, cx) {
                Poll::Ready(event) => Poll::Ready(event),
                Poll::Pending => poll_lines(tailer, cx),
            }
        } else {
            match poll_lines(tailer, cx) {
                Poll::Ready(TailerEvent::LinesEnded) => match poll_errors(tailer, cx) {
                    Poll::Ready(event) => Poll::Ready(event),
                    Poll::Pending => Poll::Ready(TailerEvent::LinesEnded),
                },
                Poll::Ready(event) => Poll::Ready(event),
                Poll::Pending => poll_errors(tailer, cx),
            }
        };

        match &event {
            Poll::Ready(TailerEvent::Line(_)) => self.errors_first = true,
            Poll::Ready(TailerEvent::Error(_)) => self.errors_first = false,
            Poll::Ready(TailerEvent::ErrorsEnded) => self.errors_open = false,
            Poll::Ready(TailerEvent::LinesEnded) | Poll::Pending => {}
        }
        event
    }

    /// Waits for the next line or error. Cancel safe.
    pub async fn next<T: Tailer + ?Sized>(&mut self, tailer: &mut T) -> TailerEvent {
        poll_fn(|cx| self.poll_next(&mut *tailer, cx)).await
    }
}

fn poll_lines<T: Tailer + ?Sized>(tailer: &mut T, cx: &mut Context<'_>) -> Poll<TailerEvent> {
    tailer
        .lines()
        .poll_recv(cx)
        .map(|line| line.map_or(TailerEvent::LinesEnded, TailerEvent::Line))
}

fn poll_errors<T: Tailer + ?Sized>(tailer: &mut T, cx: &mut Context<'_>) -> Poll<TailerEvent> {
    tailer
        .errors()
        .poll_recv(cx)
        .map(|error| error.map_or(TailerEvent::ErrorsEnded, TailerEvent::Error))
}
