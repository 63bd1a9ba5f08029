//! Parsers for Moab command output

use once_cell::sync::Lazy;
use regex::Regex;

use super::{JobDetail, JobListing, ListCategory, SchedulerError};

static JOB_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*((?:[A-Za-z][A-Za-z0-9_-]*\.)?[0-9]+)\s").unwrap());

static SUMMARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[0-9]+\s+(?:[a-z]+\s+)?jobs?\b").unwrap());

static DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s(-?[0-9]{1,2}(?::[0-9]{2})+)(?:\s|$)").unwrap());

static ALLOCATED_HOST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Allocated Nodes:[ \t]*\r?\n\s*\[?([^:\s\[\]]+):").unwrap());

/// Parses `showq` output into job listings
///
/// Lines that do not start with a job id (headers, blank lines) and count
/// summaries such as `3 active jobs` are skipped. With `user` set, only
/// lines naming that user are kept. The first duration token of a job line
/// is its remaining time.
///
/// # Errors
///
/// Returns [`SchedulerError::Unparsable`] for a job line without a duration.
pub fn parse_listing(
    output: &str,
    category: ListCategory,
    user: Option<&str>,
) -> Result<Vec<JobListing>, SchedulerError> {
    let mut jobs = Vec::new();

    for line in output.lines() {
        if let Some(user) = user
            && !line.split_whitespace().any(|token| token == user)
        {
            continue;
        }
        if SUMMARY.is_match(line) {
            continue;
        }
        let Some(job_id) = JOB_ID.captures(line).and_then(|caps| caps.get(1)) else {
            continue;
        };
        let remaining = DURATION
            .captures(line)
            .and_then(|caps| caps.get(1))
            .ok_or_else(|| SchedulerError::Unparsable {
                what: "showq",
                output: line.trim().to_string(),
            })?;

        jobs.push(JobListing {
            job_id: job_id.as_str().to_string(),
            remaining: remaining.as_str().to_string(),
            category,
        });
    }

    Ok(jobs)
}

/// Parses `checkjob` output, extracting the first allocated host
#[must_use]
pub fn parse_detail(output: &str) -> JobDetail {
    JobDetail {
        host: ALLOCATED_HOST
            .captures(output)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string()),
    }
}

/// Parses `msub` output into the new job's identifier
///
/// # Errors
///
/// Returns [`SchedulerError::Unparsable`] when the output is empty.
pub fn parse_submit(output: &str) -> Result<String, SchedulerError> {
    let job_id = output.trim();
    if job_id.is_empty() {
        return Err(SchedulerError::Unparsable {
            what: "msub",
            output: output.to_string(),
        });
    }
    Ok(job_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SHOWQ_ACTIVE: &str = "\
active jobs------------------------
JOBID              USERNAME      STATE PROCS   REMAINING            STARTTIME

4807                  alice    Running     8    23:59:12  Mon Oct 19 10:00:00
4808                  alice    Running     8  1:00:00:00  Mon Oct 19 10:05:00
4811                    bob    Running    16     2:00:00  Mon Oct 19 10:06:00

3 active jobs            32 of 64 processors in use by local jobs (50.00%)
";

    #[test]
    fn test_parse_listing_filters_user() {
        let jobs = parse_listing(SHOWQ_ACTIVE, ListCategory::Active, Some("alice")).unwrap();
        assert_eq!(
            jobs,
            vec![
                JobListing {
                    job_id: "4807".into(),
                    remaining: "23:59:12".into(),
                    category: ListCategory::Active,
                },
                JobListing {
                    job_id: "4808".into(),
                    remaining: "1:00:00:00".into(),
                    category: ListCategory::Active,
                },
            ]
        );
    }

    #[test]
    fn test_parse_listing_without_user() {
        let jobs = parse_listing(SHOWQ_ACTIVE, ListCategory::Active, None).unwrap();
        let ids: Vec<_> = jobs.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ids, ["4807", "4808", "4811"]);
    }

    #[test]
    fn test_parse_listing_prefixed_ids() {
        let out = "Moab.12   alice  Idle  1   4:00:00  Mon Oct 19 09:00:00\n";
        let jobs = parse_listing(out, ListCategory::Idle, Some("alice")).unwrap();
        assert_eq!(jobs[0].job_id, "Moab.12");
        assert_eq!(jobs[0].remaining, "4:00:00");
    }

    #[test]
    fn test_parse_listing_empty() {
        let out = "\neligible jobs----------------------\n\n0 eligible jobs\n";
        assert!(parse_listing(out, ListCategory::Idle, None).unwrap().is_empty());
    }

    #[test]
    fn test_parse_listing_job_without_duration() {
        let out = "4807   alice   Running   8   soon\n";
        let err = parse_listing(out, ListCategory::Active, Some("alice")).unwrap_err();
        assert!(matches!(err, SchedulerError::Unparsable { what: "showq", .. }));
    }

    #[test]
    fn test_parse_detail_host() {
        let out = "\
job 4807

State: Running
Allocated Nodes:
[node042:8]

IWD: /home/alice
";
        assert_eq!(parse_detail(out).host.as_deref(), Some("node042"));
    }

    #[test]
    fn test_parse_detail_unplaced() {
        assert_eq!(parse_detail("job 4807\nState: Idle\n").host, None);
    }

    #[test]
    fn test_parse_submit() {
        assert_eq!(parse_submit("\n4807\n").unwrap(), "4807");
        assert!(parse_submit("  \n").is_err());
    }
}
