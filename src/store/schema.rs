//! Cache schema. Every row can be rebuilt from Jira with `sprintlens sync`.

pub const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS sprints (
    id            INTEGER PRIMARY KEY,
    name          TEXT NOT NULL,
    state         TEXT NOT NULL CHECK (state IN ('future', 'active', 'closed')),
    start_date    TEXT,
    end_date      TEXT,
    complete_date TEXT,
    goal          TEXT NOT NULL DEFAULT '',
    board_id      INTEGER
);

CREATE TABLE IF NOT EXISTS issues (
    key                        TEXT PRIMARY KEY,
    summary                    TEXT NOT NULL,
    issue_type                 TEXT NOT NULL,
    status                     TEXT NOT NULL,
    priority                   TEXT,
    assignee                   TEXT,
    reporter                   TEXT,
    story_points               REAL,
    created                    TEXT NOT NULL,
    updated                    TEXT NOT NULL,
    due_date                   TEXT,
    resolved                   TEXT,
    original_estimate_seconds  INTEGER,
    remaining_estimate_seconds INTEGER,
    sprint_id                  INTEGER
);

CREATE TABLE IF NOT EXISTS work_logs (
    id                 TEXT PRIMARY KEY,
    issue_key          TEXT NOT NULL REFERENCES issues(key) ON DELETE CASCADE,
    author             TEXT NOT NULL,
    comment            TEXT NOT NULL DEFAULT '',
    time_spent_seconds INTEGER NOT NULL CHECK (time_spent_seconds >= 0),
    started            TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    username     TEXT PRIMARY KEY COLLATE NOCASE,
    display_name TEXT NOT NULL,
    email        TEXT,
    active       INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_issues_sprint ON issues(sprint_id);
CREATE INDEX IF NOT EXISTS idx_issues_assignee ON issues(assignee COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS idx_work_logs_issue ON work_logs(issue_key);
CREATE INDEX IF NOT EXISTS idx_work_logs_author_started
    ON work_logs(author COLLATE NOCASE, started);
"#;

/// Tracks when each scope (board, sprint, user) was last pulled from Jira.
pub const MIGRATION_V2_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS sync_log (
    scope     TEXT PRIMARY KEY,
    synced_at TEXT NOT NULL
);
"#;

/// Work logs are bucketed by the day in the author's time zone. Rows cached
/// before this column existed are dropped and come back with the next sync.
pub const MIGRATION_V3_SQL: &str = r#"
DELETE FROM work_logs;
ALTER TABLE work_logs ADD COLUMN started_day TEXT NOT NULL DEFAULT '';
CREATE INDEX IF NOT EXISTS idx_work_logs_author_day
    ON work_logs(author COLLATE NOCASE, started_day);
"#;

#[cfg(test)]
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_issues_sprint",
    "idx_issues_assignee",
    "idx_work_logs_issue",
    "idx_work_logs_author_started",
    "idx_work_logs_author_day",
];
