//! Per-user and per-team views of assigned work.

use crate::engine::schedule::priority_rank;
use crate::engine::status::{StatusCategory, StatusMap};
use crate::errors::{Result, SprintLensError};
use crate::models::Issue;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

const NO_PRIORITY: &str = "None";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserIssueSummary {
    pub username: String,
    pub total_issues: usize,
    pub total_points: f64,
    pub unestimated_count: usize,
    pub priority_distribution: BTreeMap<String, usize>,
    pub status_distribution: BTreeMap<StatusCategory, usize>,
    pub issues: Vec<Issue>,
}

/// Open issues assigned to `username`, highest priority first.
pub fn user_issue_summary(
    username: &str,
    issues: &[Issue],
    statuses: &StatusMap,
) -> Result<UserIssueSummary> {
    let mut priority_distribution = BTreeMap::new();
    let mut status_distribution = BTreeMap::new();
    let mut total_points = 0.0;
    let mut unestimated_count = 0;
    let mut seen = HashSet::new();
    let mut open = Vec::new();

    for issue in issues.iter().filter(|i| i.is_assigned_to(username)) {
        if !seen.insert(issue.key.as_str()) {
            continue;
        }
        let category = statuses.classify(&issue.status)?;
        if category == StatusCategory::Done {
            continue;
        }
        match checked_points(issue)? {
            Some(points) => total_points += points,
            None => unestimated_count += 1,
        }
        let priority = issue.priority.clone().unwrap_or_else(|| NO_PRIORITY.to_string());
        *priority_distribution.entry(priority).or_insert(0) += 1;
        *status_distribution.entry(category).or_insert(0) += 1;
        open.push(issue.clone());
    }

    open.sort_by(|a, b| {
        priority_rank(b.priority.as_deref())
            .cmp(&priority_rank(a.priority.as_deref()))
            .then_with(|| a.key.cmp(&b.key))
    });

    Ok(UserIssueSummary {
        username: username.to_string(),
        total_issues: open.len(),
        total_points,
        unestimated_count,
        priority_distribution,
        status_distribution,
        issues: open,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadedIssue {
    pub key: String,
    pub summary: String,
    pub status: String,
    pub story_points: Option<f64>,
    /// Every requested sprint the issue was found in.
    pub sprint_ids: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberLoad {
    pub member: String,
    pub total_issues: usize,
    pub total_points: f64,
    pub issues: Vec<LoadedIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamLoad {
    pub sprint_ids: Vec<u64>,
    pub total_issues: usize,
    pub total_points: f64,
    pub members: Vec<MemberLoad>,
}

/// Issues and points per member across the given sprints. An issue carried
/// over between sprints counts once and lists each sprint it appeared in.
pub fn team_load(members: &[String], sprints: &[(u64, Vec<Issue>)]) -> Result<TeamLoad> {
    if members.is_empty() {
        return Err(SprintLensError::InvalidInput(
            "at least one team member is required".to_string(),
        ));
    }
    let mut seen_members = HashSet::new();
    for member in members {
        if !seen_members.insert(member.to_ascii_lowercase()) {
            return Err(SprintLensError::InvalidInput(format!(
                "team member '{}' is listed twice",
                member
            )));
        }
    }

    let mut loads = Vec::with_capacity(members.len());
    for member in members {
        let mut issues: Vec<LoadedIssue> = Vec::new();
        let mut total_points = 0.0;

        for (sprint_id, sprint_issues) in sprints {
            for issue in sprint_issues.iter().filter(|i| i.is_assigned_to(member)) {
                if let Some(known) = issues.iter_mut().find(|known| known.key == issue.key) {
                    if !known.sprint_ids.contains(sprint_id) {
                        known.sprint_ids.push(*sprint_id);
                    }
                    continue;
                }
                total_points += checked_points(issue)?.unwrap_or(0.0);
                issues.push(LoadedIssue {
                    key: issue.key.clone(),
                    summary: issue.summary.clone(),
                    status: issue.status.clone(),
                    story_points: issue.story_points,
                    sprint_ids: vec![*sprint_id],
                });
            }
        }

        loads.push(MemberLoad {
            member: member.clone(),
            total_issues: issues.len(),
            total_points,
            issues,
        });
    }

    let mut sprint_ids: Vec<u64> = Vec::new();
    for (sprint_id, _) in sprints {
        if !sprint_ids.contains(sprint_id) {
            sprint_ids.push(*sprint_id);
        }
    }

    Ok(TeamLoad {
        sprint_ids,
        total_issues: loads.iter().map(|m| m.total_issues).sum(),
        total_points: loads.iter().map(|m| m.total_points).sum(),
        members: loads,
    })
}

fn checked_points(issue: &Issue) -> Result<Option<f64>> {
    match issue.story_points {
        Some(points) if !points.is_finite() || points < 0.0 => Err(SprintLensError::InvalidInput(
            format!("issue {} has invalid story points {}", issue.key, points),
        )),
        points => Ok(points),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::issue::fixtures::issue;

    fn owned(key: &str, status: &str, assignee: &str, points: Option<f64>, priority: Option<&str>) -> Issue {
        let mut i = issue(key, status, points);
        i.assignee = Some(assignee.to_string());
        i.priority = priority.map(str::to_string);
        i
    }

    #[test]
    fn test_user_summary_counts_open_work_by_priority() {
        let issues = vec![
            owned("PROJ-1", "To Do", "alice", Some(3.0), Some("Low")),
            owned("PROJ-2", "In Progress", "Alice", Some(5.0), Some("High")),
            owned("PROJ-3", "Done", "alice", Some(8.0), Some("High")),
            owned("PROJ-4", "To Do", "alice", None, None),
            owned("PROJ-5", "To Do", "bob", Some(2.0), Some("High")),
        ];

        let summary = user_issue_summary("alice", &issues, &StatusMap::default()).unwrap();

        assert_eq!(summary.total_issues, 3);
        assert_eq!(summary.total_points, 8.0);
        assert_eq!(summary.unestimated_count, 1);
        assert_eq!(summary.priority_distribution["High"], 1);
        assert_eq!(summary.priority_distribution["Low"], 1);
        assert_eq!(summary.priority_distribution["None"], 1);
        assert_eq!(summary.status_distribution[&StatusCategory::ToDo], 2);
        let keys: Vec<&str> = summary.issues.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["PROJ-2", "PROJ-4", "PROJ-1"]);
    }

    #[test]
    fn test_user_summary_rejects_negative_points() {
        let issues = vec![owned("PROJ-1", "To Do", "alice", Some(-1.0), None)];
        let err = user_issue_summary("alice", &issues, &StatusMap::default()).unwrap_err();
        assert!(matches!(err, SprintLensError::InvalidInput(_)));
    }

    #[test]
    fn test_team_load_across_sprints_counts_carry_over_once() {
        let sprint_1 = vec![
            owned("PROJ-1", "In Progress", "alice", Some(5.0), None),
            owned("PROJ-2", "To Do", "bob", Some(3.0), None),
        ];
        let sprint_2 = vec![
            owned("PROJ-1", "In Progress", "alice", Some(5.0), None),
            owned("PROJ-3", "To Do", "alice", None, None),
            owned("PROJ-4", "To Do", "carol", Some(1.0), None),
        ];
        let members = vec!["alice".to_string(), "bob".to_string(), "dave".to_string()];

        let load = team_load(&members, &[(1, sprint_1), (2, sprint_2)]).unwrap();

        assert_eq!(load.sprint_ids, vec![1, 2]);
        assert_eq!(load.total_issues, 3);
        assert_eq!(load.total_points, 8.0);

        let alice = &load.members[0];
        assert_eq!(alice.total_issues, 2);
        assert_eq!(alice.total_points, 5.0);
        assert_eq!(alice.issues[0].sprint_ids, vec![1, 2]);
        assert_eq!(alice.issues[1].sprint_ids, vec![2]);

        assert_eq!(load.members[2].member, "dave");
        assert_eq!(load.members[2].total_issues, 0);
    }

    #[test]
    fn test_team_load_needs_distinct_members() {
        assert!(matches!(
            team_load(&[], &[]),
            Err(SprintLensError::InvalidInput(_))
        ));
        let twice = vec!["alice".to_string(), "Alice".to_string()];
        assert!(matches!(
            team_load(&twice, &[]),
            Err(SprintLensError::InvalidInput(_))
        ));
    }
}
