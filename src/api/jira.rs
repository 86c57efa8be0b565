use crate::config::settings::AuthMethod;
use crate::errors::{Result, SprintLensError};
use crate::models::jira::{IssuePage, JiraSprint, JiraUser, SprintPage, WorklogPage};
use crate::models::{Issue, Sprint, SprintState, User, WorkLog};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

const PAGE_SIZE: u64 = 50;

const ISSUE_FIELDS: &[&str] = &[
    "summary",
    "issuetype",
    "status",
    "priority",
    "assignee",
    "reporter",
    "created",
    "updated",
    "duedate",
    "resolutiondate",
    "timetracking",
    "sprint",
];

pub struct JiraClient {
    client: Client,
    base_url: String,
    email: String,
    auth_method: AuthMethod,
    story_point_fields: Vec<String>,
}

impl JiraClient {
    pub fn new(
        base_url: String,
        email: String,
        auth_method: AuthMethod,
        story_point_fields: Vec<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            email,
            auth_method,
            story_point_fields,
        }
    }

    /// The authenticated user. Used by `init` and `config validate` to check
    /// credentials.
    pub async fn myself(&self) -> Result<User> {
        let url = format!("{}/rest/api/2/myself", self.base_url);
        let user: JiraUser = self.get_json(&url).await?;
        Ok(user.into_user())
    }

    /// Looks a user up by username, email or display name. Data Center takes
    /// `username=`, Cloud only accepts `query=`.
    pub async fn find_user(&self, query: &str) -> Result<User> {
        let param = match self.auth_method {
            AuthMethod::PersonalAccessToken { .. } => "username",
            AuthMethod::ApiToken { .. } => "query",
        };
        let url = format!(
            "{}/rest/api/2/user/search?{}={}&maxResults={}",
            self.base_url,
            param,
            urlencoding::encode(query),
            PAGE_SIZE
        );
        let candidates: Vec<JiraUser> = self.get_json(&url).await?;
        debug!(query, candidates = candidates.len(), "user search finished");

        candidates
            .into_iter()
            .find(|user| user.matches(query))
            .map(JiraUser::into_user)
            .ok_or_else(|| SprintLensError::not_found("User", query))
    }

    /// Sprints of a board. An empty `states` slice returns every state.
    pub async fn board_sprints(&self, board_id: u64, states: &[SprintState]) -> Result<Vec<Sprint>> {
        let state_filter = if states.is_empty() {
            String::new()
        } else {
            let names: Vec<&str> = states.iter().map(SprintState::as_str).collect();
            format!("&state={}", names.join(","))
        };
        let mut sprints = Vec::new();
        let mut start_at = 0;

        loop {
            let url = format!(
                "{}/rest/agile/1.0/board/{}/sprint?startAt={}&maxResults={}{}",
                self.base_url, board_id, start_at, PAGE_SIZE, state_filter
            );
            let page: SprintPage = self.get_json(&url).await?;
            let fetched = page.values.len() as u64;

            for sprint in page.values {
                let mut sprint = sprint.into_sprint()?;
                sprint.board_id.get_or_insert(board_id);
                sprints.push(sprint);
            }

            if page.is_last || fetched == 0 {
                break;
            }
            start_at += fetched;
        }

        debug!(board_id, count = sprints.len(), "fetched board sprints");
        Ok(sprints)
    }

    pub async fn sprint(&self, sprint_id: u64) -> Result<Sprint> {
        let url = format!("{}/rest/agile/1.0/sprint/{}", self.base_url, sprint_id);
        let sprint: JiraSprint = self.get_json(&url).await?;
        sprint.into_sprint()
    }

    pub async fn sprint_issues(&self, sprint_id: u64) -> Result<Vec<Issue>> {
        let mut issues = Vec::new();
        let mut start_at = 0;

        loop {
            let url = format!(
                "{}/rest/agile/1.0/sprint/{}/issue?startAt={}&maxResults={}&fields={}",
                self.base_url,
                sprint_id,
                start_at,
                PAGE_SIZE,
                self.fields_param()
            );
            let page: IssuePage = self.get_json(&url).await?;
            let fetched = page.issues.len() as u64;

            for issue in page.issues {
                issues.push(issue.into_issue(&self.story_point_fields, Some(sprint_id))?);
            }

            start_at += fetched;
            if fetched == 0 || start_at >= page.total {
                break;
            }
        }

        debug!(sprint_id, count = issues.len(), "fetched sprint issues");
        Ok(issues)
    }

    /// Runs a JQL search, following pages until `limit` issues are collected.
    pub async fn search_with_jql(&self, jql: &str, limit: u32) -> Result<Vec<Issue>> {
        let limit = u64::from(limit);
        let mut issues = Vec::new();
        let mut start_at = 0;

        while (issues.len() as u64) < limit {
            let page_size = PAGE_SIZE.min(limit - issues.len() as u64);
            let url = format!(
                "{}/rest/api/2/search?jql={}&startAt={}&maxResults={}&fields={}",
                self.base_url,
                urlencoding::encode(jql),
                start_at,
                page_size,
                self.fields_param()
            );
            let page: IssuePage = self.get_json(&url).await?;
            let fetched = page.issues.len() as u64;

            for issue in page.issues {
                issues.push(issue.into_issue(&self.story_point_fields, None)?);
            }

            start_at += fetched;
            if fetched == 0 || start_at >= page.total {
                break;
            }
        }

        debug!(jql, count = issues.len(), "jql search finished");
        Ok(issues)
    }

    pub async fn issue_worklogs(&self, issue_key: &str) -> Result<Vec<WorkLog>> {
        let mut worklogs = Vec::new();
        let mut start_at = 0;

        loop {
            let url = format!(
                "{}/rest/api/2/issue/{}/worklog?startAt={}&maxResults={}",
                self.base_url,
                urlencoding::encode(issue_key),
                start_at,
                PAGE_SIZE
            );
            let page: WorklogPage = self.get_json(&url).await?;
            let fetched = page.worklogs.len() as u64;

            for worklog in page.worklogs {
                worklogs.push(worklog.into_worklog(issue_key)?);
            }

            start_at += fetched;
            if fetched == 0 || start_at >= page.total {
                break;
            }
        }

        Ok(worklogs)
    }

    fn fields_param(&self) -> String {
        ISSUE_FIELDS
            .iter()
            .map(|f| f.to_string())
            .chain(self.story_point_fields.iter().cloned())
            .collect::<Vec<_>>()
            .join(",")
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_method {
            AuthMethod::PersonalAccessToken { token } => request.bearer_auth(token),
            AuthMethod::ApiToken { token } => request.basic_auth(&self.email, Some(token)),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(url, "GET");

        let response = self
            .authorize(self.client.get(url))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| SprintLensError::NetworkError(format!("Failed to reach Jira: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => SprintLensError::JiraAuthFailed(status.as_u16()),
                404 => SprintLensError::not_found("Jira resource", url),
                code => SprintLensError::JiraApiError(code, text),
            });
        }

        response.json::<T>().await.map_err(|e| {
            SprintLensError::JiraApiError(
                status.as_u16(),
                format!("Failed to parse Jira response: {}", e),
            )
        })
    }
}
