//! Job-script assembly
//!
//! [`Assembler::prepare`] partitions samples into batches of `worker_num`,
//! builds one block tree per sample, numbers every leaf and writes a single
//! job script per batch. Each batch is created inside one store transaction:
//! it is either fully prepared or leaves nothing behind.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::block::{Block, BlockError, Template, TemplateError, Vars};
use crate::errors::{BatchError, BatchResult};
use crate::infrastructure::config::BatchDefaults;
use crate::model::Worker;
use crate::store::{BatchWriter, Store};

/// Built-in PBS job-script template
pub const JOB_TEMPLATE: &str = include_str!("../../share/job.sh");

/// Errors raised while assembling a batch
#[derive(Error, Debug)]
pub enum AssemblyError {
    /// `worker_num` was zero
    #[error("worker_num must be at least 1")]
    InvalidBatchSize,

    /// The handle cannot be used in a job name
    #[error("invalid handle '{0}': use letters, digits, '.', '_' or '-'")]
    InvalidHandle(String),

    /// A sample's block tree failed to render
    #[error(transparent)]
    Block(#[from] BlockError),

    /// The job-script template failed to render
    #[error("job script template: {0}")]
    Template(#[from] TemplateError),

    /// A file could not be written
    #[error("{}: {source}", path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Options recognised by [`Assembler::prepare`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareOptions {
    /// Samples per worker
    pub worker_num: usize,
    /// Label stored on every worker
    pub handle: Option<String>,
    /// Directory the job changes into; the current directory when unset
    pub wd: Option<PathBuf>,
    /// Processors per node
    pub ppn: u32,
    /// Scheduler queue
    pub queue: String,
    /// Requested walltime
    pub walltime: String,
    /// Extra variables passed to the job-script template
    pub extra: Vars,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self::from(&BatchDefaults::default())
    }
}

impl From<&BatchDefaults> for PrepareOptions {
    fn from(defaults: &BatchDefaults) -> Self {
        Self {
            worker_num: defaults.worker_num,
            handle: None,
            wd: None,
            ppn: defaults.ppn,
            queue: defaults.queue.clone(),
            walltime: defaults.walltime.clone(),
            extra: Vars::new(),
        }
    }
}

impl PrepareOptions {
    /// Sets the number of samples per worker
    #[must_use]
    pub fn worker_num(mut self, worker_num: usize) -> Self {
        self.worker_num = worker_num;
        self
    }

    /// Sets the worker label
    #[must_use]
    pub fn handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }

    /// Sets the job's working directory
    #[must_use]
    pub fn wd(mut self, wd: impl Into<PathBuf>) -> Self {
        self.wd = Some(wd.into());
        self
    }

    /// Sets processors per node
    #[must_use]
    pub fn ppn(mut self, ppn: u32) -> Self {
        self.ppn = ppn;
        self
    }

    /// Sets the scheduler queue
    #[must_use]
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    /// Sets the requested walltime
    #[must_use]
    pub fn walltime(mut self, walltime: impl Into<String>) -> Self {
        self.walltime = walltime.into();
        self
    }

    /// Adds a job-script template variable
    #[must_use]
    pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Turns samples into prepared workers
#[derive(Debug, Clone)]
pub struct Assembler {
    store: Store,
    template: Template,
}

impl Assembler {
    /// Creates an assembler using the built-in job-script template
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self {
            store,
            template: Template::inline(JOB_TEMPLATE),
        }
    }

    /// Replaces the job-script template
    #[must_use]
    pub fn with_template(mut self, template: Template) -> Self {
        self.template = template;
        self
    }

    /// Prepares one worker per batch of `options.worker_num` samples
    ///
    /// `callback` builds a fresh block tree for each sample. Every leaf of
    /// that tree gets a subtask and its log path, in preorder. The job
    /// script runs each sample's command in sample order.
    ///
    /// Batches are committed one at a time: when batch `k` fails it is
    /// rolled back and the error returned, while batches before `k` stay
    /// prepared.
    ///
    /// # Errors
    ///
    /// [`BatchError::Assembly`] for invalid options, render and write
    /// failures; [`BatchError::Persistence`] for store failures.
    pub async fn prepare<S, F>(
        &self,
        samples: &[S],
        mut callback: F,
        options: &PrepareOptions,
    ) -> BatchResult<Vec<Worker>>
    where
        S: AsRef<str>,
        F: FnMut(&str) -> Block,
    {
        let invalid = |source: AssemblyError| BatchError::Assembly { batch: 0, source };
        if options.worker_num == 0 {
            return Err(invalid(AssemblyError::InvalidBatchSize));
        }
        if let Some(handle) = &options.handle
            && !is_valid_handle(handle)
        {
            return Err(invalid(AssemblyError::InvalidHandle(handle.clone())));
        }
        let template = self
            .template
            .load()
            .await
            .map_err(|e| invalid(e.into()))?;
        let wd = match &options.wd {
            Some(wd) => wd.clone(),
            None => std::env::current_dir().map_err(|source| {
                invalid(AssemblyError::Io {
                    path: PathBuf::from("."),
                    source,
                })
            })?,
        };

        let mut workers = Vec::with_capacity(samples.len().div_ceil(options.worker_num));
        for (batch, chunk) in samples.chunks(options.worker_num).enumerate() {
            let mut writer = self.store.begin_batch().await?;
            match self
                .fill_batch(&mut writer, batch, chunk, &mut callback, &template, options, &wd)
                .await
            {
                Ok(worker) => {
                    writer.commit().await?;
                    tracing::info!(
                        worker = worker.id,
                        batch,
                        samples = chunk.len(),
                        "Worker prepared"
                    );
                    workers.push(worker);
                }
                Err(err) => {
                    if let Err(rollback) = writer.rollback().await {
                        tracing::warn!(batch, error = %rollback, "Batch rollback failed");
                    }
                    tracing::error!(batch, error = %err, "Batch preparation failed");
                    return Err(err);
                }
            }
        }

        Ok(workers)
    }

    #[allow(clippy::too_many_arguments)]
    async fn fill_batch<S, F>(
        &self,
        writer: &mut BatchWriter<'_>,
        batch: usize,
        chunk: &[S],
        callback: &mut F,
        template: &Template,
        options: &PrepareOptions,
        wd: &Path,
    ) -> BatchResult<Worker>
    where
        S: AsRef<str>,
        F: FnMut(&str) -> Block,
    {
        let assembly = |source: AssemblyError| BatchError::Assembly { batch, source };

        let mut worker = writer.create_worker(options.handle.as_deref()).await?;
        let mut roots = Vec::with_capacity(chunk.len());

        for (ordinal, sample) in (1u32..).zip(chunk) {
            let sample = sample.as_ref();
            let task = writer.create_task(&worker, ordinal, sample).await?;

            let mut root = callback(sample);
            for (sub, leaf) in (1u32..).zip(root.leaves_mut()) {
                let subtask = writer.create_subtask(&task, sub, leaf.id()).await?;
                leaf.set_log(subtask.log.to_string_lossy());
            }
            root.load_templates().await.map_err(|e| assembly(e.into()))?;
            roots.push(root);
        }

        let command = Block::serial(format!("worker-{}", worker.id), roots)
            .render()
            .map_err(|e| assembly(e.into()))?;

        let name = match &options.handle {
            Some(handle) => format!("{handle}-{}", worker.id),
            None => format!("batchline-{}", worker.id),
        };
        let mut vars = options.extra.clone();
        vars.extend([
            ("name".to_string(), name),
            ("handle".to_string(), options.handle.clone().unwrap_or_default()),
            ("stdout".to_string(), worker.stdout_path().to_string_lossy().into_owned()),
            ("stderr".to_string(), worker.stderr_path().to_string_lossy().into_owned()),
            ("command".to_string(), command),
            ("ppn".to_string(), options.ppn.to_string()),
            ("queue".to_string(), options.queue.clone()),
            ("walltime".to_string(), options.walltime.clone()),
            ("wd".to_string(), shell_words::quote(&wd.to_string_lossy()).into_owned()),
        ]);
        let script = template.render(&vars).map_err(|e| assembly(e.into()))?;

        write_script(&worker.script_path(), &script)
            .await
            .map_err(assembly)?;

        writer
            .mark_prepared(&mut worker, options.ppn, &options.queue, &options.walltime)
            .await?;
        Ok(worker)
    }
}

/// Handles end up unquoted in `#PBS -N`
fn is_valid_handle(handle: &str) -> bool {
    !handle.is_empty()
        && handle
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

async fn write_script(path: &Path, script: &str) -> Result<(), AssemblyError> {
    let tmp = path.with_extension("sh.tmp");
    tokio::fs::write(&tmp, script)
        .await
        .map_err(|source| AssemblyError::Io {
            path: tmp.clone(),
            source,
        })?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|source| AssemblyError::Io {
            path: path.to_path_buf(),
            source,
        })
}
