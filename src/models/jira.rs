//! Wire types for the Jira REST (`/rest/api/2`) and Agile (`/rest/agile/1.0`)
//! payloads, and their conversion into the cached domain rows.

use crate::errors::{Result, SprintLensError};
use crate::models::{Issue, Sprint, SprintState, User, WorkLog};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub const DEFAULT_STORY_POINT_FIELDS: [&str; 4] = [
    "customfield_10016",
    "customfield_10008",
    "customfield_10004",
    "customfield_10002",
];

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraUser {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl JiraUser {
    /// Stable handle used to match assignees, work-log authors and team
    /// members: username on Server, email or display name on Cloud.
    pub fn handle(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.email_address.clone())
            .or_else(|| self.display_name.clone())
            .or_else(|| self.account_id.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// True when any of the user's identifiers equals `query`, ignoring case.
    pub fn matches(&self, query: &str) -> bool {
        [
            &self.name,
            &self.email_address,
            &self.display_name,
            &self.account_id,
        ]
        .into_iter()
        .flatten()
        .any(|id| id.eq_ignore_ascii_case(query))
    }

    pub fn into_user(self) -> User {
        let username = self.handle();
        User {
            display_name: self.display_name.unwrap_or_else(|| username.clone()),
            username,
            email: self.email_address,
            active: self.active,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SprintPage {
    #[serde(default)]
    pub start_at: u64,
    #[serde(default)]
    pub max_results: u64,
    #[serde(default = "default_true")]
    pub is_last: bool,
    #[serde(default)]
    pub values: Vec<JiraSprint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraSprint {
    pub id: u64,
    pub name: String,
    pub state: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub complete_date: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub origin_board_id: Option<u64>,
}

impl JiraSprint {
    pub fn into_sprint(self) -> Result<Sprint> {
        let state = self
            .state
            .parse::<SprintState>()
            .map_err(SprintLensError::InvalidInput)?;
        Ok(Sprint {
            id: self.id,
            name: self.name,
            state,
            start_date: optional_datetime(self.start_date.as_deref())?,
            end_date: optional_datetime(self.end_date.as_deref())?,
            complete_date: optional_datetime(self.complete_date.as_deref())?,
            goal: self.goal.unwrap_or_default(),
            board_id: self.origin_board_id,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuePage {
    #[serde(default)]
    pub start_at: u64,
    #[serde(default)]
    pub max_results: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub issues: Vec<JiraIssue>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct JiraIssue {
    pub key: String,
    pub fields: IssueFields,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Named {
    pub name: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeTracking {
    #[serde(default)]
    pub original_estimate_seconds: Option<i64>,
    #[serde(default)]
    pub remaining_estimate_seconds: Option<i64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SprintRef {
    pub id: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct IssueFields {
    pub summary: String,
    pub issuetype: Named,
    pub status: Named,
    #[serde(default)]
    pub priority: Option<Named>,
    #[serde(default)]
    pub assignee: Option<JiraUser>,
    #[serde(default)]
    pub reporter: Option<JiraUser>,
    pub created: String,
    pub updated: String,
    #[serde(default)]
    pub duedate: Option<String>,
    #[serde(default)]
    pub resolutiondate: Option<String>,
    #[serde(default)]
    pub timetracking: Option<TimeTracking>,
    #[serde(default)]
    pub sprint: Option<SprintRef>,
    /// Custom fields, story points among them.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl JiraIssue {
    /// Story points come from the first listed custom field holding a number.
    pub fn story_points(&self, fields: &[String]) -> Option<f64> {
        fields
            .iter()
            .filter_map(|name| self.fields.extra.get(name))
            .find_map(Value::as_f64)
    }

    /// `sprint_id` overrides the payload's sprint reference when the issue was
    /// fetched through a sprint endpoint.
    pub fn into_issue(self, story_point_fields: &[String], sprint_id: Option<u64>) -> Result<Issue> {
        let story_points = self.story_points(story_point_fields);
        let fields = self.fields;
        let tracking = fields.timetracking.unwrap_or_default();

        let due_date = match fields.duedate.as_deref() {
            Some(raw) => Some(NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
                SprintLensError::InvalidInput(format!(
                    "issue {} has malformed due date '{}': {}",
                    self.key, raw, e
                ))
            })?),
            None => None,
        };

        Ok(Issue {
            summary: fields.summary,
            issue_type: fields.issuetype.name,
            status: fields.status.name,
            priority: fields.priority.map(|p| p.name),
            assignee: fields.assignee.as_ref().map(JiraUser::handle),
            reporter: fields.reporter.as_ref().map(JiraUser::handle),
            story_points,
            created: parse_jira_datetime(&fields.created)?,
            updated: parse_jira_datetime(&fields.updated)?,
            due_date,
            resolved: optional_datetime(fields.resolutiondate.as_deref())?,
            original_estimate_seconds: tracking.original_estimate_seconds,
            remaining_estimate_seconds: tracking.remaining_estimate_seconds,
            sprint_id: sprint_id.or(fields.sprint.map(|s| s.id)),
            key: self.key,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorklogPage {
    #[serde(default)]
    pub start_at: u64,
    #[serde(default)]
    pub max_results: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub worklogs: Vec<JiraWorklog>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraWorklog {
    pub id: String,
    pub author: JiraUser,
    /// Plain text on API v2, a document node on v3.
    #[serde(default)]
    pub comment: Option<Value>,
    pub time_spent_seconds: i64,
    pub started: String,
}

impl JiraWorklog {
    pub fn into_worklog(self, issue_key: &str) -> Result<WorkLog> {
        let comment = match self.comment {
            Some(Value::String(text)) => text,
            _ => String::new(),
        };
        Ok(WorkLog {
            id: self.id,
            issue_key: issue_key.to_string(),
            author: self.author.handle(),
            comment,
            time_spent_seconds: self.time_spent_seconds,
            started: parse_jira_timestamp(&self.started)?,
        })
    }
}

/// Jira emits both RFC 3339 (`2024-03-04T09:00:00.000Z`) and a compact offset
/// form (`2024-03-04T09:00:00.000+0000`). The offset is kept.
pub fn parse_jira_timestamp(raw: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map_err(|e| SprintLensError::InvalidInput(format!("malformed timestamp '{}': {}", raw, e)))
}

pub fn parse_jira_datetime(raw: &str) -> Result<DateTime<Utc>> {
    parse_jira_timestamp(raw).map(|dt| dt.with_timezone(&Utc))
}

fn optional_datetime(raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.map(parse_jira_datetime).transpose()
}
