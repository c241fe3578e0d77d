//! Durable, file-backed job queue.
//!
//! Producers write command records into a shared directory; exactly one
//! worker claims them via atomic rename and writes result records back.
//! The result record is always made durable *before* the command record
//! is removed, so a crash between the two never loses a job silently.

pub mod queue;
pub mod records;

pub use queue::{JobQueue, QueueError};
pub use records::{CommandRecord, ResultRecord, ResultStatus};
