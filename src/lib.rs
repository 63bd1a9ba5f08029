//! # batchline - sample workflows as cluster batch jobs
//!
//! batchline takes a list of samples and a per-sample workflow, groups the
//! samples into workers of a fixed size and writes one Moab/PBS job script
//! per worker. Workers are then submitted, cancelled and kept in sync with
//! the scheduler's queue.
//!
//! ## Overview
//!
//! - [`block`]: workflow trees whose leaves render shell commands
//! - [`assembler`]: partitions samples and writes job scripts
//! - [`store`]: SQLite-backed workers, tasks and subtasks
//! - [`gateway`]: `start`, `cancel` and `sync` against a [`scheduler::Scheduler`]
//! - [`repo`], [`library`], [`workflow`]: on-disk repository and component lookup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use batchline::prelude::*;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let repo = Repository::attach_or_create(".").await?;
//! let assembler = Assembler::new(repo.store().clone());
//! let workers = assembler
//!     .prepare(
//!         &["s1", "s2", "s3"],
//!         |sample| Block::leaf("count", Template::inline("wc -l {{ sample }}.fq")).with_var("sample", sample),
//!         &PrepareOptions::default().worker_num(2),
//!     )
//!     .await?;
//!
//! let scheduler = MoabScheduler::new(repo.config().scheduler.clone());
//! let gateway = SchedulerGateway::new(repo.store().clone(), Arc::new(scheduler));
//! for worker in &workers {
//!     gateway.start(worker.id).await?;
//! }
//! gateway.sync().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod assembler;
pub mod block;
pub mod errors;
pub mod gateway;
pub mod infrastructure;
pub mod library;
pub mod model;
pub mod repo;
pub mod scheduler;
pub mod store;
pub mod workflow;

// Prelude module for common imports
pub mod prelude;

// Re-export commonly used types
pub use assembler::{Assembler, AssemblyError, PrepareOptions};
pub use block::{Block, BlockError, Composition, Template, TemplateError, Vars};
pub use errors::{BatchError, BatchResult, Operation};
pub use gateway::{SchedulerGateway, SyncReport};
pub use infrastructure::{Config, init_logging};
pub use model::{Subtask, Task, Worker, WorkerStatus};
pub use repo::Repository;
pub use scheduler::{MoabScheduler, Scheduler, SchedulerError, ScriptedScheduler};
pub use store::{Store, StoreError};

/// Version of the batchline crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
