//! Worker, task and subtask entities

mod records;
mod status;

pub use records::{Subtask, Task, Worker};
pub use status::{UnknownStatus, WorkerStatus};
