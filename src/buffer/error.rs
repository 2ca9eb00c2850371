use thiserror::Error;

#[derive(Error, Debug)]
pub enum BufferError {
    #[error("No tokio runtime available to drive the buffer")]
    NoRuntime,

    #[error("Invalid buffer configuration: {0}")]
    InvalidConfig(String),

    #[error("Line queue is closed")]
    Closed,

    #[error("Buffer task '{task}' failed: {reason}")]
    TaskFailed { task: &'static str, reason: String },
}
