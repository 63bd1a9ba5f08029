//! Moab command-line scheduler

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::{JobDetail, JobListing, ListCategory, Scheduler, SchedulerError, parse};
use crate::infrastructure::config::SchedulerConfig;

/// Drives Moab through `msub`, `canceljob`, `showq` and `checkjob`
///
/// Each configured command may carry its own arguments, e.g.
/// `ssh login01 showq`; it is split with shell quoting rules and the
/// operation's arguments are appended.
#[derive(Debug, Clone)]
pub struct MoabScheduler {
    config: SchedulerConfig,
    user: Option<String>,
}

impl MoabScheduler {
    /// Creates a scheduler from its configuration
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        let user = config.user();
        Self { config, user }
    }

    /// User whose jobs are listed
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    async fn run(&self, command: &str, args: &[&str]) -> Result<String, SchedulerError> {
        let mut parts = shell_words::split(command).map_err(|_| SchedulerError::InvalidCommand {
            command: command.to_string(),
        })?;
        if parts.is_empty() {
            return Err(SchedulerError::InvalidCommand {
                command: command.to_string(),
            });
        }
        let program = parts.remove(0);
        parts.extend(args.iter().map(|arg| (*arg).to_string()));

        tracing::debug!(program = %program, args = ?parts, "Running scheduler command");

        let mut cmd = Command::new(&program);
        cmd.args(&parts)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| SchedulerError::Spawn {
            program: program.clone(),
            source,
        })?;

        let timeout = self.config.timeout();
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| SchedulerError::Wait {
                program: program.clone(),
                source,
            })?,
            Err(_) => {
                tracing::warn!(program = %program, ?timeout, "Scheduler command timed out");
                return Err(SchedulerError::Timeout { program, timeout });
            }
        };

        if !output.status.success() {
            return Err(SchedulerError::CommandFailed {
                program,
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Scheduler for MoabScheduler {
    async fn submit(&self, script: &Path) -> Result<String, SchedulerError> {
        let script = script.to_string_lossy();
        let output = self.run(&self.config.submit, &[script.as_ref()]).await?;
        parse::parse_submit(&output)
    }

    async fn cancel(&self, job_id: &str) -> Result<(), SchedulerError> {
        self.run(&self.config.cancel, &[job_id]).await?;
        Ok(())
    }

    async fn list(&self, category: ListCategory) -> Result<Vec<JobListing>, SchedulerError> {
        let output = match self.user() {
            Some(user) => {
                self.run(&self.config.list, &["-u", user, category.flag()])
                    .await?
            }
            None => self.run(&self.config.list, &[category.flag()]).await?,
        };
        parse::parse_listing(&output, category, self.user())
    }

    async fn detail(&self, job_id: &str) -> Result<JobDetail, SchedulerError> {
        let output = self.run(&self.config.detail, &[job_id]).await?;
        Ok(parse::parse_detail(&output))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scheduler_with(submit: &str, list: &str) -> MoabScheduler {
        MoabScheduler::new(SchedulerConfig {
            submit: submit.to_string(),
            cancel: "true".to_string(),
            list: list.to_string(),
            detail: "true".to_string(),
            user: Some("alice".to_string()),
            timeout_secs: 5,
        })
    }

    #[tokio::test]
    async fn test_submit_reads_job_id() {
        // `echo` prints the script path back, standing in for a job id
        let scheduler = scheduler_with("echo", "true");
        let id = scheduler.submit(Path::new("4807")).await.unwrap();
        assert_eq!(id, "4807");
    }

    #[tokio::test]
    async fn test_list_passes_user_and_flag() {
        // output is the fixed line plus the appended `-u alice -r` arguments
        let scheduler = scheduler_with("echo", "echo 4807 alice 1:00:00");
        let jobs = scheduler.list(ListCategory::Active).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_id, "4807");
        assert_eq!(jobs[0].remaining, "1:00:00");
    }

    #[tokio::test]
    async fn test_cancel_succeeds() {
        let scheduler = scheduler_with("echo", "true");
        scheduler.cancel("4807").await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_command() {
        let scheduler = scheduler_with("false", "true");
        let err = scheduler.submit(Path::new("job.sh")).await.unwrap_err();
        assert!(matches!(err, SchedulerError::CommandFailed { code: 1, .. }));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let scheduler = scheduler_with("batchline-no-such-program", "true");
        let err = scheduler.submit(Path::new("job.sh")).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_empty_command() {
        let scheduler = scheduler_with("  ", "true");
        let err = scheduler.submit(Path::new("job.sh")).await.unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCommand { .. }));
    }

    #[tokio::test]
    async fn test_timeout() {
        let scheduler = MoabScheduler::new(SchedulerConfig {
            submit: "sleep".to_string(),
            timeout_secs: 0,
            ..SchedulerConfig::default()
        });
        let err = scheduler.submit(Path::new("5")).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Timeout { .. }));
    }
}
