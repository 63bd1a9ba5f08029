//! Command-line interface for batchline
//!
//! - `init`: create a repository in the current directory
//! - `prepare`: turn samples into prepared workers using a workflow
//! - `status`: list workers
//! - `start` / `cancel`: submit or cancel workers
//! - `sync`: reconcile workers with the scheduler, once or continuously
//! - `destroy`: delete workers and their directories
//! - `teardown`: delete the whole repository
//! - `completions`: generate shell completions

pub mod completions;
pub mod prepare;
pub mod status;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};

use batchline::assembler::{Assembler, PrepareOptions};
use batchline::block::Template;
use batchline::gateway::SchedulerGateway;
use batchline::infrastructure::config::Config;
use batchline::infrastructure::logging::{init_logging, level_for_verbosity};
use batchline::library::Library;
use batchline::model::WorkerStatus;
use batchline::repo::Repository;
use batchline::scheduler::MoabScheduler;
use batchline::workflow::Workflow;

/// CLI arguments for batchline
#[derive(Parser, Debug)]
#[command(name = "batchline")]
#[command(author, version, about = "Batch sample workflows onto a Moab cluster", long_about = None)]
pub struct Args {
    /// Directory holding the repository
    #[arg(short = 'C', long = "repo", global = true, default_value = ".")]
    root: PathBuf,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a repository
    Init,

    /// Prepare workers for samples using a workflow
    Prepare(prepare::PrepareArgs),

    /// List workers
    Status {
        /// Only show workers with these statuses
        #[arg(short, long, value_delimiter = ',')]
        status: Vec<WorkerStatus>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Submit prepared workers
    Start {
        /// Worker ids
        #[arg(required_unless_present = "all")]
        ids: Vec<i64>,
        /// Start every prepared worker
        #[arg(long, conflicts_with = "ids")]
        all: bool,
    },

    /// Cancel live workers
    Cancel {
        /// Worker ids
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Reconcile workers with the scheduler
    Sync {
        /// Keep syncing until interrupted
        #[arg(short, long)]
        watch: bool,
        /// Seconds between passes (defaults to the configured interval)
        #[arg(short, long, requires = "watch")]
        interval: Option<u64>,
    },

    /// Delete workers, their tasks and directories
    Destroy {
        /// Worker ids
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Delete the repository with every worker
    Teardown {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: ShellArg,
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ShellArg {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

/// Parse and execute CLI arguments
pub async fn run() -> Result<()> {
    let args = Args::parse();

    let config_path = Repository::dir_for(&args.root).join("config.yaml");
    let config = Config::load(&config_path).unwrap_or_default();
    let base = if std::env::var("BATCHLINE_DEBUG").is_ok() {
        "debug"
    } else {
        config.log_level.as_str()
    };
    init_logging(level_for_verbosity(base, args.verbose));

    match args.command {
        Command::Init => {
            let repo = Repository::create(&args.root)
                .await
                .context("Failed to create repository")?;
            println!("Initialized repository in {}", repo.dir().display());
        }
        Command::Prepare(prepare_args) => {
            let repo = attach(&args.root).await?;
            let config = repo.config();

            let samples = prepare_args.samples()?;
            let library = Library::from_env(repo.root());
            let workflow = Workflow::load(&library, &prepare_args.workflow)
                .with_context(|| format!("Failed to load workflow '{}'", prepare_args.workflow))?;

            let mut assembler = Assembler::new(repo.store().clone());
            if let Some(template) = &config.job_template {
                assembler = assembler.with_template(Template::file(repo.dir().join(template)));
            }
            let options = prepare_args.options(PrepareOptions::from(&config.defaults));

            let workers = assembler
                .prepare(&samples, |sample| workflow.block_for(sample), &options)
                .await
                .context("Failed to prepare workers")?;
            for worker in &workers {
                println!("{}", worker.id);
            }
            eprintln!(
                "Prepared {} worker(s) for {} sample(s)",
                workers.len(),
                samples.len()
            );
        }
        Command::Status {
            status: filter,
            json,
        } => {
            let repo = attach(&args.root).await?;
            let workers = if filter.is_empty() {
                repo.store().workers().await?
            } else {
                repo.store().workers_with_status(&filter).await?
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&workers)?);
            } else {
                print!("{}", status::format_table(&workers));
            }
        }
        Command::Start { ids, all } => {
            let repo = attach(&args.root).await?;
            let gateway = gateway(&repo);
            let ids = if all {
                repo.store()
                    .workers_with_status(&[WorkerStatus::Prepared])
                    .await?
                    .into_iter()
                    .map(|worker| worker.id)
                    .collect()
            } else {
                ids
            };
            for id in ids {
                let worker = gateway
                    .start(id)
                    .await
                    .with_context(|| format!("Failed to start worker {id}"))?;
                println!(
                    "{}\t{}",
                    worker.id,
                    worker.moab_id.as_deref().unwrap_or_default()
                );
            }
        }
        Command::Cancel { ids } => {
            let repo = attach(&args.root).await?;
            let gateway = gateway(&repo);
            for id in ids {
                gateway
                    .cancel(id)
                    .await
                    .with_context(|| format!("Failed to cancel worker {id}"))?;
                println!("{id}\tcancelled");
            }
        }
        Command::Sync { watch, interval } => {
            let repo = attach(&args.root).await?;
            let gateway = gateway(&repo);
            if watch {
                let interval = interval.map_or_else(
                    || repo.config().sync_interval(),
                    |secs| Duration::from_secs(secs.max(1)),
                );
                gateway
                    .watch(interval, async {
                        let _ = tokio::signal::ctrl_c().await;
                    })
                    .await
                    .context("Sync stopped")?;
            } else {
                let report = gateway.sync().await.context("Sync failed")?;
                println!(
                    "refreshed {}, placed {}, completed {}",
                    report.refreshed.len(),
                    report.placed.len(),
                    report.completed.len()
                );
            }
        }
        Command::Destroy { ids } => {
            let repo = attach(&args.root).await?;
            for id in ids {
                repo.store()
                    .destroy_worker(id)
                    .await
                    .with_context(|| format!("Failed to destroy worker {id}"))?;
                println!("{id}\tdestroyed");
            }
        }
        Command::Teardown { yes } => {
            let repo = attach(&args.root).await?;
            if !yes {
                bail!(
                    "Refusing to delete {} without --yes",
                    repo.dir().display()
                );
            }
            let dir = repo.dir();
            repo.destroy().await.context("Failed to delete repository")?;
            println!("Deleted {}", dir.display());
        }
        Command::Completions { shell, output } => {
            use clap_complete::Shell;

            let shell_enum = match shell {
                ShellArg::Bash => Shell::Bash,
                ShellArg::Zsh => Shell::Zsh,
                ShellArg::Fish => Shell::Fish,
                ShellArg::PowerShell => Shell::PowerShell,
            };

            let completions = completions::generate_completions(shell_enum)?;

            if let Some(output_path) = output {
                completions::save_completions(&completions, &output_path)?;
            } else {
                println!("{completions}");
            }
        }
    }

    Ok(())
}

async fn attach(root: &std::path::Path) -> Result<Repository> {
    Repository::attach(root)
        .await
        .context("Failed to open repository")
}

fn gateway(repo: &Repository) -> SchedulerGateway {
    let scheduler = MoabScheduler::new(repo.config().scheduler.clone());
    SchedulerGateway::new(repo.store().clone(), Arc::new(scheduler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_start_all() {
        let args = Args::try_parse_from(["batchline", "start", "--all"]).unwrap();
        assert!(matches!(args.command, Command::Start { all: true, .. }));

        assert!(Args::try_parse_from(["batchline", "start"]).is_err());
        assert!(Args::try_parse_from(["batchline", "start", "1", "--all"]).is_err());
    }

    #[test]
    fn test_parse_status_filter() {
        let args =
            Args::try_parse_from(["batchline", "-C", "/data", "status", "-s", "idle,active"])
                .unwrap();
        assert_eq!(args.root, PathBuf::from("/data"));
        match args.command {
            Command::Status { status, json } => {
                assert_eq!(status, [WorkerStatus::Idle, WorkerStatus::Active]);
                assert!(!json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_interval_requires_watch() {
        assert!(Args::try_parse_from(["batchline", "sync", "-i", "5"]).is_err());
        assert!(Args::try_parse_from(["batchline", "sync", "-w", "-i", "5"]).is_ok());
    }
}
