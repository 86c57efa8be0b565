use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Denormalized issue row. Assignee and reporter hold the tracker's user
/// handle (username, else email, else display name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub key: String,
    pub summary: String,
    pub issue_type: String,
    pub status: String,
    pub priority: Option<String>,
    pub assignee: Option<String>,
    pub reporter: Option<String>,
    pub story_points: Option<f64>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub due_date: Option<NaiveDate>,
    pub resolved: Option<DateTime<Utc>>,
    pub original_estimate_seconds: Option<i64>,
    pub remaining_estimate_seconds: Option<i64>,
    pub sprint_id: Option<u64>,
}

impl Issue {
    pub fn points_or_zero(&self) -> f64 {
        self.story_points.unwrap_or(0.0)
    }

    pub fn is_assigned_to(&self, username: &str) -> bool {
        self.assignee
            .as_deref()
            .is_some_and(|assignee| assignee.eq_ignore_ascii_case(username))
    }

    pub fn remaining_estimate_hours(&self) -> Option<f64> {
        self.remaining_estimate_seconds
            .map(|seconds| seconds.max(0) as f64 / 3600.0)
    }
}
