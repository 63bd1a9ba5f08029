//! Database schema

/// Tables for workers, tasks and subtasks.
///
/// Deleting a worker cascades to its tasks and their subtasks.
pub(super) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS workers (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    handle      TEXT,
    status      TEXT NOT NULL,
    moab_id     TEXT,
    host        TEXT,
    remaining   TEXT,
    ppn         INTEGER,
    queue       TEXT,
    walltime    TEXT,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_workers_status ON workers(status);
CREATE INDEX IF NOT EXISTS idx_workers_moab_id ON workers(moab_id);

CREATE TABLE IF NOT EXISTS tasks (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    worker_id   INTEGER NOT NULL REFERENCES workers(id) ON DELETE CASCADE,
    ordinal     INTEGER NOT NULL,
    sample      TEXT NOT NULL,
    UNIQUE (worker_id, ordinal)
);

CREATE TABLE IF NOT EXISTS subtasks (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id     INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    ordinal     INTEGER NOT NULL,
    block       TEXT NOT NULL,
    UNIQUE (task_id, ordinal)
);
"#;

pub(super) const WORKER_COLUMNS: &str =
    "id, handle, status, moab_id, host, remaining, ppn, queue, walltime, created_at";
