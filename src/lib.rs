#![deny(warnings, rust_2024_compatibility)]
// Specific pedantic lints enforced (not blanket allow):
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
// Noisy pedantic lints suppressed with justification:
#![allow(
    clippy::cast_possible_truncation, // Safe within realistic value bounds (durations, sizes)
    clippy::cast_precision_loss,      // Acceptable for metrics/display
    clippy::missing_errors_doc,       // Internal API
    clippy::missing_panics_doc,       // Internal API
    clippy::module_name_repetitions,  // e.g. BufferError in buffer module
    clippy::must_use_candidate,       // Annotated selectively on critical APIs
    clippy::doc_markdown              // Internal API
)]

pub mod app;
pub mod buffer;
pub mod metrics;
pub mod tailer;

// Re-export main types for easy access
pub use app::{App, Config};
pub use buffer::{BufferConfig, BufferError, BufferStats, BufferedTailer, ClosePolicy};
pub use metrics::{BufferLoadMetric, NoopLoadMetric, TracingLoadMetric};
pub use tailer::{
    ChannelTailer, EventSelector, LineProducer, ReaderTailer, Tailer, TailerError, TailerEvent,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
