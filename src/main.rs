//! batchline - run per-sample workflows as Moab batch jobs
//!
//! ## Commands
//!
//! - `batchline init` - Create a repository in the current directory
//! - `batchline prepare` - Group samples into workers and write their job scripts
//! - `batchline status` - List workers
//! - `batchline start` / `batchline cancel` - Submit or cancel workers
//! - `batchline sync` - Reconcile workers with the scheduler
//! - `batchline destroy` / `batchline teardown` - Delete workers or the repository
//! - `batchline completions` - Generate shell completions
//!
//! ## Quick Start
//!
//! ```bash
//! batchline init
//! batchline prepare exome -f samples.txt -n 4
//! batchline start --all
//! batchline sync --watch
//! ```

use std::process::ExitCode;

mod cli;

#[tokio::main]
async fn main() -> ExitCode {
    match cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            if std::env::var("BATCHLINE_VERBOSE").is_ok() {
                eprintln!("{e:?}");
            }
            ExitCode::FAILURE
        }
    }
}
