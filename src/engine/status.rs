//! Classification of tracker statuses into the three workflow categories.
//!
//! Trackers let every team invent its own workflow, so the mapping is an
//! explicit table rather than a hard-coded `match`. Lookups ignore case and
//! surrounding whitespace.

use crate::errors::{Result, SprintLensError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    ToDo,
    InProgress,
    Done,
}

impl StatusCategory {
    pub const ALL: [StatusCategory; 3] = [
        StatusCategory::ToDo,
        StatusCategory::InProgress,
        StatusCategory::Done,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            StatusCategory::ToDo => "To Do",
            StatusCategory::InProgress => "In Progress",
            StatusCategory::Done => "Done",
        }
    }
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for StatusCategory {
    type Err = SprintLensError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "todo" => Ok(StatusCategory::ToDo),
            "inprogress" => Ok(StatusCategory::InProgress),
            "done" => Ok(StatusCategory::Done),
            _ => Err(SprintLensError::ConfigurationError(format!(
                "unknown status category '{}' (expected to_do, in_progress or done)",
                s
            ))),
        }
    }
}

const DEFAULT_TABLE: &[(&str, StatusCategory)] = &[
    ("to do", StatusCategory::ToDo),
    ("open", StatusCategory::ToDo),
    ("backlog", StatusCategory::ToDo),
    ("selected for development", StatusCategory::ToDo),
    ("reopened", StatusCategory::ToDo),
    ("new", StatusCategory::ToDo),
    ("in progress", StatusCategory::InProgress),
    ("in review", StatusCategory::InProgress),
    ("code review", StatusCategory::InProgress),
    ("in development", StatusCategory::InProgress),
    ("in testing", StatusCategory::InProgress),
    ("testing", StatusCategory::InProgress),
    ("qa", StatusCategory::InProgress),
    ("blocked", StatusCategory::InProgress),
    ("done", StatusCategory::Done),
    ("closed", StatusCategory::Done),
    ("resolved", StatusCategory::Done),
    ("complete", StatusCategory::Done),
    ("completed", StatusCategory::Done),
];

#[derive(Debug, Clone, PartialEq)]
pub struct StatusMap {
    entries: HashMap<String, StatusCategory>,
    fallback: Option<StatusCategory>,
}

impl Default for StatusMap {
    /// The standard three-state workflow plus common variants, falling back
    /// to To Do.
    fn default() -> Self {
        let entries = DEFAULT_TABLE
            .iter()
            .map(|(status, category)| (status.to_string(), *category))
            .collect();
        Self {
            entries,
            fallback: Some(StatusCategory::ToDo),
        }
    }
}

impl StatusMap {
    pub fn with_fallback(mut self, fallback: Option<StatusCategory>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn insert(&mut self, status: &str, category: StatusCategory) {
        self.entries.insert(normalize(status), category);
    }

    pub fn fallback(&self) -> Option<StatusCategory> {
        self.fallback
    }

    /// Fails with `ConfigurationError` only when the status is unmapped and
    /// no fallback is configured.
    pub fn classify(&self, status: &str) -> Result<StatusCategory> {
        self.entries
            .get(&normalize(status))
            .copied()
            .or(self.fallback)
            .ok_or_else(|| {
                SprintLensError::ConfigurationError(format!(
                    "status '{}' has no category mapping and no default category is set",
                    status
                ))
            })
    }

    /// Entries sorted by status, for display.
    pub fn entries(&self) -> Vec<(&str, StatusCategory)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(status, category)| (status.as_str(), *category))
            .collect();
        entries.sort();
        entries
    }
}

fn normalize(status: &str) -> String {
    status.trim().to_lowercase()
}
