//! Local SQLite cache of sprints, issues, work logs and users.
//!
//! Connections run with `foreign_keys = ON`, WAL journaling and a busy
//! timeout. A sync unit (one sprint and its issues, or one issue's work logs)
//! is written inside a single transaction, so readers never observe a
//! half-synced sprint.

pub mod migrations;
pub mod schema;

use crate::errors::{Result, SprintLensError};
use crate::models::{Issue, Sprint, SprintState, User, WorkLog};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SPRINT_COLUMNS: &str =
    "id, name, state, start_date, end_date, complete_date, goal, board_id";

const ISSUE_COLUMNS: &str = "key, summary, issue_type, status, priority, assignee, reporter, \
     story_points, created, updated, due_date, resolved, original_estimate_seconds, \
     remaining_estimate_seconds, sprint_id";

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens (or creates) the cache at `path` and migrates it to the latest
    /// schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| {
            SprintLensError::Store(format!("open cache {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "opened cache");
        Self::prepare(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(mut conn: Connection) -> Result<Self> {
        configure_connection(&conn)?;
        migrations::migrate(&mut conn)?;
        Ok(Self { conn })
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Replaces the cached contents of one sprint: the sprint row itself,
    /// membership of its issues, and the issue rows. Issues that left the
    /// sprint keep their rows but lose the sprint reference.
    pub fn sync_sprint(&mut self, sprint: &Sprint, issues: &[Issue]) -> Result<()> {
        let tx = self.conn.transaction()?;
        upsert_sprint(&tx, sprint)?;
        let detached = tx.execute(
            "UPDATE issues SET sprint_id = NULL WHERE sprint_id = ?1",
            params![sprint.id],
        )?;
        for issue in issues {
            let mut issue = issue.clone();
            issue.sprint_id = Some(sprint.id);
            upsert_issue(&tx, &issue)?;
        }
        mark_synced(&tx, &format!("sprint:{}", sprint.id))?;
        tx.commit()?;

        debug!(
            sprint_id = sprint.id,
            issues = issues.len(),
            previously_linked = detached,
            "synced sprint"
        );
        Ok(())
    }

    pub fn upsert_sprints(&mut self, sprints: &[Sprint]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for sprint in sprints {
            upsert_sprint(&tx, sprint)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Upserts issues without touching sprint membership when the incoming
    /// row carries no sprint.
    pub fn upsert_issues(&mut self, issues: &[Issue]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for issue in issues {
            upsert_issue(&tx, issue)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn upsert_user(&self, user: &User) -> Result<()> {
        self.conn.execute(
            "INSERT INTO users (username, display_name, email, active)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(username) DO UPDATE SET
                display_name = excluded.display_name,
                email = excluded.email,
                active = excluded.active",
            params![user.username, user.display_name, user.email, user.active],
        )?;
        Ok(())
    }

    pub fn replace_worklogs(&mut self, issue_key: &str, worklogs: &[WorkLog]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM work_logs WHERE issue_key = ?1", params![issue_key])?;
        for log in worklogs {
            if log.issue_key != issue_key {
                return Err(SprintLensError::InvalidInput(format!(
                    "work log {} belongs to {}, not {}",
                    log.id, log.issue_key, issue_key
                )));
            }
            tx.execute(
                "INSERT OR REPLACE INTO work_logs
                    (id, issue_key, author, comment, time_spent_seconds, started, started_day)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    log.id,
                    log.issue_key,
                    log.author,
                    log.comment,
                    log.time_spent_seconds,
                    log.started.to_rfc3339(),
                    log.day()
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn record_sync(&self, scope: &str) -> Result<()> {
        mark_synced(&self.conn, scope)
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    pub fn sprint(&self, id: u64) -> Result<Sprint> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM sprints WHERE id = ?1", SPRINT_COLUMNS),
                params![id],
                sprint_from_row,
            )
            .optional()?
            .ok_or_else(|| SprintLensError::not_found("Sprint", id))
    }

    /// Newest first: active and future sprints ahead of closed ones.
    pub fn sprints(&self) -> Result<Vec<Sprint>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM sprints
             ORDER BY start_date IS NULL DESC, start_date DESC, id DESC",
            SPRINT_COLUMNS
        ))?;
        let rows = stmt.query_map([], sprint_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn sprint_issues(&self, sprint_id: u64) -> Result<Vec<Issue>> {
        self.query_issues("WHERE sprint_id = ?1 ORDER BY key", params![sprint_id])
    }

    pub fn issues(&self) -> Result<Vec<Issue>> {
        self.query_issues("ORDER BY key", [])
    }

    pub fn issues_assigned_to(&self, username: &str) -> Result<Vec<Issue>> {
        self.query_issues(
            "WHERE assignee = ?1 COLLATE NOCASE ORDER BY key",
            params![username],
        )
    }

    /// Work logs by `author` whose day, in the author's time zone, is on or
    /// after `since`.
    pub fn worklogs_by_author(&self, author: &str, since: NaiveDate) -> Result<Vec<WorkLog>> {
        self.query_worklogs(
            "WHERE author = ?1 COLLATE NOCASE AND started_day >= ?2",
            params![author, since],
        )
    }

    /// Every cached work log by `author`.
    pub fn all_worklogs_by_author(&self, author: &str) -> Result<Vec<WorkLog>> {
        self.query_worklogs("WHERE author = ?1 COLLATE NOCASE", params![author])
    }

    pub fn user(&self, username: &str) -> Result<User> {
        self.conn
            .query_row(
                "SELECT username, display_name, email, active FROM users WHERE username = ?1 COLLATE NOCASE",
                params![username],
                user_from_row,
            )
            .optional()?
            .ok_or_else(|| SprintLensError::not_found("User", username))
    }

    pub fn users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT username, display_name, email, active FROM users ORDER BY username")?;
        let rows = stmt.query_map([], user_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn last_synced(&self, scope: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .conn
            .query_row(
                "SELECT synced_at FROM sync_log WHERE scope = ?1",
                params![scope],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn query_worklogs<P: rusqlite::Params>(&self, clause: &str, params: P) -> Result<Vec<WorkLog>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, issue_key, author, comment, time_spent_seconds, started
             FROM work_logs {} ORDER BY started_day, started, id",
            clause
        ))?;
        let rows = stmt.query_map(params, worklog_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn query_issues<P: rusqlite::Params>(&self, clause: &str, params: P) -> Result<Vec<Issue>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM issues {}", ISSUE_COLUMNS, clause))?;
        let rows = stmt.query_map(params, issue_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

fn mark_synced(conn: &Connection, scope: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO sync_log (scope, synced_at) VALUES (?1, ?2)
         ON CONFLICT(scope) DO UPDATE SET synced_at = excluded.synced_at",
        params![scope, Utc::now()],
    )?;
    Ok(())
}

fn upsert_sprint(tx: &Transaction<'_>, sprint: &Sprint) -> Result<()> {
    tx.execute(
        "INSERT INTO sprints (id, name, state, start_date, end_date, complete_date, goal, board_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            state = excluded.state,
            start_date = excluded.start_date,
            end_date = excluded.end_date,
            complete_date = excluded.complete_date,
            goal = excluded.goal,
            board_id = COALESCE(excluded.board_id, sprints.board_id)",
        params![
            sprint.id,
            sprint.name,
            sprint.state.as_str(),
            sprint.start_date,
            sprint.end_date,
            sprint.complete_date,
            sprint.goal,
            sprint.board_id
        ],
    )?;
    Ok(())
}

fn upsert_issue(tx: &Transaction<'_>, issue: &Issue) -> Result<()> {
    tx.execute(
        &format!(
            "INSERT INTO issues ({})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(key) DO UPDATE SET
                summary = excluded.summary,
                issue_type = excluded.issue_type,
                status = excluded.status,
                priority = excluded.priority,
                assignee = excluded.assignee,
                reporter = excluded.reporter,
                story_points = excluded.story_points,
                created = excluded.created,
                updated = excluded.updated,
                due_date = excluded.due_date,
                resolved = excluded.resolved,
                original_estimate_seconds = excluded.original_estimate_seconds,
                remaining_estimate_seconds = excluded.remaining_estimate_seconds,
                sprint_id = COALESCE(excluded.sprint_id, issues.sprint_id)",
            ISSUE_COLUMNS
        ),
        params![
            issue.key,
            issue.summary,
            issue.issue_type,
            issue.status,
            issue.priority,
            issue.assignee,
            issue.reporter,
            issue.story_points,
            issue.created,
            issue.updated,
            issue.due_date,
            issue.resolved,
            issue.original_estimate_seconds,
            issue.remaining_estimate_seconds,
            issue.sprint_id
        ],
    )?;
    Ok(())
}

fn sprint_from_row(row: &Row<'_>) -> rusqlite::Result<Sprint> {
    let state: String = row.get(2)?;
    let state = state.parse::<SprintState>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into())
    })?;
    Ok(Sprint {
        id: row.get(0)?,
        name: row.get(1)?,
        state,
        start_date: row.get(3)?,
        end_date: row.get(4)?,
        complete_date: row.get(5)?,
        goal: row.get(6)?,
        board_id: row.get(7)?,
    })
}

fn issue_from_row(row: &Row<'_>) -> rusqlite::Result<Issue> {
    Ok(Issue {
        key: row.get(0)?,
        summary: row.get(1)?,
        issue_type: row.get(2)?,
        status: row.get(3)?,
        priority: row.get(4)?,
        assignee: row.get(5)?,
        reporter: row.get(6)?,
        story_points: row.get(7)?,
        created: row.get(8)?,
        updated: row.get(9)?,
        due_date: row.get(10)?,
        resolved: row.get(11)?,
        original_estimate_seconds: row.get(12)?,
        remaining_estimate_seconds: row.get(13)?,
        sprint_id: row.get(14)?,
    })
}

fn worklog_from_row(row: &Row<'_>) -> rusqlite::Result<WorkLog> {
    let started: String = row.get(5)?;
    let started = DateTime::parse_from_rfc3339(&started).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
    })?;
    Ok(WorkLog {
        id: row.get(0)?,
        issue_key: row.get(1)?,
        author: row.get(2)?,
        comment: row.get(3)?,
        time_spent_seconds: row.get(4)?,
        started,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        username: row.get(0)?,
        display_name: row.get(1)?,
        email: row.get(2)?,
        active: row.get(3)?,
    })
}
