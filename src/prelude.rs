//! Prelude module for common imports

pub use crate::assembler::{Assembler, PrepareOptions};
pub use crate::block::{Block, Composition, Template, Vars};
pub use crate::errors::{BatchError, BatchResult, Operation};
pub use crate::gateway::{SchedulerGateway, SyncReport};
pub use crate::infrastructure::config::Config;
pub use crate::library::{Component, Library};
pub use crate::model::{Subtask, Task, Worker, WorkerStatus};
pub use crate::repo::Repository;
pub use crate::scheduler::{ListCategory, MoabScheduler, Scheduler, ScriptedScheduler};
pub use crate::store::Store;
pub use crate::workflow::Workflow;
