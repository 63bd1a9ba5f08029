//! `batchline status` - Worker table

use std::fmt::Write as _;

use batchline::model::Worker;

const HEADERS: [&str; 6] = ["ID", "HANDLE", "STATUS", "JOB", "HOST", "REMAINING"];

/// Formats workers as an aligned text table
pub fn format_table(workers: &[Worker]) -> String {
    let rows: Vec<[String; 6]> = workers
        .iter()
        .map(|worker| {
            [
                worker.id.to_string(),
                cell(worker.handle.as_deref()),
                worker.status.to_string(),
                cell(worker.moab_id.as_deref()),
                cell(worker.host.as_deref()),
                cell(worker.remaining.as_deref()),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, value) in widths.iter_mut().zip(row) {
            *width = (*width).max(value.len());
        }
    }

    let mut out = String::new();
    write_row(&mut out, &HEADERS, &widths);
    for row in &rows {
        write_row(&mut out, row, &widths);
    }
    out
}

fn cell(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}

fn write_row<S: AsRef<str>>(out: &mut String, row: &[S], widths: &[usize]) {
    let line = row
        .iter()
        .zip(widths)
        .map(|(value, width)| format!("{:<width$}", value.as_ref(), width = *width))
        .collect::<Vec<_>>()
        .join("  ");
    let _ = writeln!(out, "{}", line.trim_end());
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchline::model::WorkerStatus;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn worker(id: i64, status: WorkerStatus, job: Option<&str>) -> Worker {
        Worker {
            id,
            handle: None,
            status,
            moab_id: job.map(str::to_string),
            host: None,
            remaining: None,
            ppn: Some(1),
            queue: Some("batch".into()),
            walltime: Some("24:00:00".into()),
            created_at: Utc::now(),
            dir: PathBuf::from(format!("/w/{id}")),
        }
    }

    #[test]
    fn test_format_table() {
        let workers = [
            worker(1, WorkerStatus::Prepared, None),
            worker(12, WorkerStatus::Active, Some("4807")),
        ];
        let expected = "\
ID  HANDLE  STATUS    JOB   HOST  REMAINING
1   -       prepared  -     -     -
12  -       active    4807  -     -
";
        assert_eq!(format_table(&workers), expected);
    }

    #[test]
    fn test_empty_table() {
        assert_eq!(format_table(&[]), "ID  HANDLE  STATUS  JOB  HOST  REMAINING\n");
    }
}
