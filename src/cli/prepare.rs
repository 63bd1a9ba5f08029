//! `batchline prepare` - Turn samples into prepared workers

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Args;

use batchline::assembler::PrepareOptions;

/// Arguments of `batchline prepare`
#[derive(Args, Debug)]
pub struct PrepareArgs {
    /// Workflow name, looked up under `workflows/` in the library
    pub workflow: String,

    /// Samples to process
    pub samples: Vec<String>,

    /// File listing one sample per line (`#` starts a comment)
    #[arg(short = 'f', long)]
    pub samples_file: Option<PathBuf>,

    /// Samples per worker
    #[arg(short = 'n', long)]
    pub worker_num: Option<usize>,

    /// Label for the new workers
    #[arg(long)]
    pub handle: Option<String>,

    /// Directory the jobs run in (defaults to the current directory)
    #[arg(long)]
    pub wd: Option<PathBuf>,

    /// Processors per node
    #[arg(long)]
    pub ppn: Option<u32>,

    /// Scheduler queue
    #[arg(short, long)]
    pub queue: Option<String>,

    /// Requested walltime, e.g. 12:00:00
    #[arg(long)]
    pub walltime: Option<String>,

    /// Extra job-script variable
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,
}

impl PrepareArgs {
    /// Samples from the command line followed by those in the samples file
    pub fn samples(&self) -> Result<Vec<String>> {
        let mut samples = self.samples.clone();
        if let Some(path) = &self.samples_file {
            samples.extend(read_samples(path)?);
        }
        if samples.is_empty() {
            bail!("No samples given");
        }
        Ok(samples)
    }

    /// Applies the command-line overrides to `defaults`
    #[must_use]
    pub fn options(&self, defaults: PrepareOptions) -> PrepareOptions {
        let mut options = defaults;
        if let Some(worker_num) = self.worker_num {
            options = options.worker_num(worker_num);
        }
        if let Some(handle) = &self.handle {
            options = options.handle(handle);
        }
        if let Some(wd) = &self.wd {
            options = options.wd(wd);
        }
        if let Some(ppn) = self.ppn {
            options = options.ppn(ppn);
        }
        if let Some(queue) = &self.queue {
            options = options.queue(queue);
        }
        if let Some(walltime) = &self.walltime {
            options = options.walltime(walltime);
        }
        for (key, value) in &self.vars {
            options = options.var(key, value);
        }
        options
    }
}

fn read_samples(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read samples file: {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn parse_var(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}
