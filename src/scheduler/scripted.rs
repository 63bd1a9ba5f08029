//! In-memory scheduler replaying scripted queue state

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{JobDetail, JobListing, ListCategory, Scheduler, SchedulerError, parse};

const USER: &str = "batch";
const FIRST_JOB: u64 = 1000;
const SUBMITTED_REMAINING: &str = "24:00:00";

#[derive(Debug, Clone)]
struct ScriptedJob {
    id: String,
    category: ListCategory,
    remaining: String,
    host: Option<String>,
}

#[derive(Debug)]
struct State {
    next_job: u64,
    jobs: Vec<ScriptedJob>,
    listing_text: HashMap<ListCategory, String>,
    submitted: Vec<PathBuf>,
    cancelled: Vec<String>,
    unavailable: bool,
    cancel_fails: bool,
}

/// Scheduler double whose queue is set up by the caller
///
/// Listings and job details are rendered as `showq` and `checkjob` text
/// and run through the same parsers as [`MoabScheduler`](super::MoabScheduler).
/// Submitted jobs enter the idle listing; cancelled jobs leave every listing.
#[derive(Debug)]
pub struct ScriptedScheduler {
    state: Mutex<State>,
}

impl Default for ScriptedScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedScheduler {
    /// Creates a scheduler with an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_job: FIRST_JOB,
                jobs: Vec::new(),
                listing_text: HashMap::new(),
                submitted: Vec::new(),
                cancelled: Vec::new(),
                unavailable: false,
                cancel_fails: false,
            }),
        }
    }

    /// Puts `job_id` in `category` with `remaining` time, keeping its host
    pub fn set_job(&self, job_id: &str, category: ListCategory, remaining: &str) {
        let mut state = self.state.lock();
        match state.jobs.iter_mut().find(|job| job.id == job_id) {
            Some(job) => {
                job.category = category;
                job.remaining = remaining.to_string();
            }
            None => state.jobs.push(ScriptedJob {
                id: job_id.to_string(),
                category,
                remaining: remaining.to_string(),
                host: None,
            }),
        }
    }

    /// Allocates `host` to `job_id`
    pub fn place(&self, job_id: &str, host: &str) {
        let mut state = self.state.lock();
        if let Some(job) = state.jobs.iter_mut().find(|job| job.id == job_id) {
            job.host = Some(host.to_string());
        }
    }

    /// Removes `job_id` from every listing, as when it finishes
    pub fn finish_job(&self, job_id: &str) {
        self.state.lock().jobs.retain(|job| job.id != job_id);
    }

    /// Replaces the rendered listing for `category` with raw `showq` text
    pub fn set_listing_text(&self, category: ListCategory, text: &str) {
        self.state
            .lock()
            .listing_text
            .insert(category, text.to_string());
    }

    /// Makes every call fail as if the scheduler could not be reached
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    /// Makes cancellation fail while other calls keep working
    pub fn set_cancel_fails(&self, fails: bool) {
        self.state.lock().cancel_fails = fails;
    }

    /// Scripts submitted so far
    #[must_use]
    pub fn submitted(&self) -> Vec<PathBuf> {
        self.state.lock().submitted.clone()
    }

    /// Job ids cancellation was requested for, including failed requests
    #[must_use]
    pub fn cancelled(&self) -> Vec<String> {
        self.state.lock().cancelled.clone()
    }

    /// Ids of the jobs currently queued
    #[must_use]
    pub fn job_ids(&self) -> Vec<String> {
        self.state.lock().jobs.iter().map(|job| job.id.clone()).collect()
    }

    fn check_available(state: &State, program: &str) -> Result<(), SchedulerError> {
        if state.unavailable {
            return Err(SchedulerError::CommandFailed {
                program: program.to_string(),
                code: 1,
                stderr: "ERROR: cannot connect to server".to_string(),
            });
        }
        Ok(())
    }

    fn render_listing(jobs: &[ScriptedJob], category: ListCategory) -> String {
        let state = match category {
            ListCategory::Idle => "Idle",
            ListCategory::Blocked => "Hold",
            ListCategory::Active => "Running",
        };
        let mut out = format!(
            "{category} jobs------------------------\n\
             JOBID              USERNAME      STATE PROCS   REMAINING            STARTTIME\n\n"
        );
        let mut count = 0;
        for job in jobs.iter().filter(|job| job.category == category) {
            let _ = writeln!(
                out,
                "{:<18} {:>8} {:>10} {:>5} {:>11}  Mon Oct 19 10:00:00",
                job.id, USER, state, 1, job.remaining
            );
            count += 1;
        }
        let _ = writeln!(out, "\n{count} {category} jobs");
        out
    }

    fn render_detail(job: &ScriptedJob) -> String {
        let mut out = format!("job {}\n\nState: {}\n", job.id, job.category);
        if let Some(host) = &job.host {
            let _ = writeln!(out, "Allocated Nodes:\n[{host}:1]\n");
        }
        out.push_str("IWD: /home/batch\n");
        out
    }
}

#[async_trait]
impl Scheduler for ScriptedScheduler {
    async fn submit(&self, script: &Path) -> Result<String, SchedulerError> {
        let mut state = self.state.lock();
        Self::check_available(&state, "msub")?;

        let job_id = state.next_job.to_string();
        state.next_job += 1;
        state.submitted.push(script.to_path_buf());
        state.jobs.push(ScriptedJob {
            id: job_id.clone(),
            category: ListCategory::Idle,
            remaining: SUBMITTED_REMAINING.to_string(),
            host: None,
        });
        parse::parse_submit(&format!("\n{job_id}\n"))
    }

    async fn cancel(&self, job_id: &str) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        Self::check_available(&state, "canceljob")?;

        state.cancelled.push(job_id.to_string());
        if state.cancel_fails {
            return Err(SchedulerError::CommandFailed {
                program: "canceljob".to_string(),
                code: 1,
                stderr: format!("ERROR: cannot cancel job '{job_id}'"),
            });
        }
        state.jobs.retain(|job| job.id != job_id);
        Ok(())
    }

    async fn list(&self, category: ListCategory) -> Result<Vec<JobListing>, SchedulerError> {
        let state = self.state.lock();
        Self::check_available(&state, "showq")?;

        match state.listing_text.get(&category) {
            Some(text) => parse::parse_listing(text, category, Some(USER)),
            None => parse::parse_listing(
                &Self::render_listing(&state.jobs, category),
                category,
                Some(USER),
            ),
        }
    }

    async fn detail(&self, job_id: &str) -> Result<JobDetail, SchedulerError> {
        let state = self.state.lock();
        Self::check_available(&state, "checkjob")?;

        let job = state
            .jobs
            .iter()
            .find(|job| job.id == job_id)
            .ok_or_else(|| SchedulerError::CommandFailed {
                program: "checkjob".to_string(),
                code: 1,
                stderr: format!("ERROR: invalid job specified ({job_id})"),
            })?;
        Ok(parse::parse_detail(&Self::render_detail(job)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_submitted_job_is_idle() {
        let scheduler = ScriptedScheduler::new();
        let id = scheduler.submit(Path::new("/w/1/job.sh")).await.unwrap();
        assert_eq!(id, "1000");

        let idle = scheduler.list(ListCategory::Idle).await.unwrap();
        assert_eq!(
            idle,
            vec![JobListing {
                job_id: "1000".into(),
                remaining: SUBMITTED_REMAINING.into(),
                category: ListCategory::Idle,
            }]
        );
        assert!(scheduler.list(ListCategory::Active).await.unwrap().is_empty());
        assert_eq!(scheduler.submitted(), vec![PathBuf::from("/w/1/job.sh")]);
    }

    #[tokio::test]
    async fn test_job_moves_and_gets_placed() {
        let scheduler = ScriptedScheduler::new();
        let id = scheduler.submit(Path::new("job.sh")).await.unwrap();
        scheduler.set_job(&id, ListCategory::Active, "23:10:00");
        scheduler.place(&id, "node042");

        let active = scheduler.list(ListCategory::Active).await.unwrap();
        assert_eq!(active[0].remaining, "23:10:00");
        assert_eq!(
            scheduler.detail(&id).await.unwrap().host.as_deref(),
            Some("node042")
        );
    }

    #[tokio::test]
    async fn test_unplaced_detail() {
        let scheduler = ScriptedScheduler::new();
        scheduler.set_job("7", ListCategory::Blocked, "1:00:00");
        assert_eq!(scheduler.detail("7").await.unwrap(), JobDetail::default());
        assert!(scheduler.detail("8").await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_removes_job() {
        let scheduler = ScriptedScheduler::new();
        let id = scheduler.submit(Path::new("job.sh")).await.unwrap();
        scheduler.cancel(&id).await.unwrap();
        assert!(scheduler.job_ids().is_empty());
        assert_eq!(scheduler.cancelled(), vec![id]);
    }

    #[tokio::test]
    async fn test_failing_cancel_is_recorded() {
        let scheduler = ScriptedScheduler::new();
        let id = scheduler.submit(Path::new("job.sh")).await.unwrap();
        scheduler.set_cancel_fails(true);
        assert!(scheduler.cancel(&id).await.is_err());
        assert_eq!(scheduler.cancelled(), vec![id.clone()]);
        assert_eq!(scheduler.job_ids(), vec![id]);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let scheduler = ScriptedScheduler::new();
        scheduler.set_unavailable(true);
        assert!(scheduler.submit(Path::new("job.sh")).await.is_err());
        assert!(scheduler.list(ListCategory::Idle).await.is_err());
        assert!(scheduler.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_listing_text_override() {
        let scheduler = ScriptedScheduler::new();
        scheduler.set_listing_text(ListCategory::Active, "55  batch  Running  1  garbage\n");
        assert!(matches!(
            scheduler.list(ListCategory::Active).await,
            Err(SchedulerError::Unparsable { .. })
        ));
    }
}
