pub mod buffered;
pub mod config;
pub mod error;
pub mod queue;
pub mod stats;

pub use buffered::BufferedTailer;
pub use config::{BufferConfig, ClosePolicy};
pub use error::BufferError;
pub use queue::LineQueue;
pub use stats::BufferStats;
