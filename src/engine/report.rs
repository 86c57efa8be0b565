use crate::engine::status::{StatusCategory, StatusMap};
use crate::errors::{Result, SprintLensError};
use crate::models::{Issue, Sprint};
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SprintSummary {
    pub sprint_id: u64,
    pub sprint_name: String,
    pub total_issues: usize,
    pub completed_issues: usize,
    pub total_points: f64,
    pub completed_points: f64,
    pub unestimated_count: usize,
    pub completion_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Burndown {
    pub total_points: f64,
    pub completed_points: f64,
    pub remaining_points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BurndownPoint {
    pub date: NaiveDate,
    pub remaining_points: f64,
    /// Linear target; absent when the sprint has no end date.
    pub ideal_remaining: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SprintReport {
    pub summary: SprintSummary,
    pub status_distribution: BTreeMap<StatusCategory, usize>,
    pub raw_status_counts: BTreeMap<String, usize>,
    pub assignee_distribution: BTreeMap<String, usize>,
    pub burndown: Burndown,
    pub burndown_series: Vec<BurndownPoint>,
}

pub fn find_sprint(sprints: &[Sprint], sprint_id: u64) -> Result<&Sprint> {
    sprints
        .iter()
        .find(|s| s.id == sprint_id)
        .ok_or_else(|| SprintLensError::not_found("Sprint", sprint_id))
}

/// Report for `sprint_id`, looked up among `sprints`.
pub fn sprint_report(
    sprint_id: u64,
    sprints: &[Sprint],
    issues: &[Issue],
    statuses: &StatusMap,
    as_of: NaiveDate,
) -> Result<SprintReport> {
    let sprint = find_sprint(sprints, sprint_id)?;
    build_sprint_report(sprint, issues, statuses, as_of)
}

/// Aggregates the issues of one sprint. Null story points count towards the
/// issue total but not towards any point sum.
pub fn build_sprint_report(
    sprint: &Sprint,
    issues: &[Issue],
    statuses: &StatusMap,
    as_of: NaiveDate,
) -> Result<SprintReport> {
    let mut status_distribution: BTreeMap<StatusCategory, usize> =
        StatusCategory::ALL.iter().map(|c| (*c, 0)).collect();
    let mut raw_status_counts = BTreeMap::new();
    let mut assignee_distribution = BTreeMap::new();

    let mut total_points = 0.0;
    let mut completed_points = 0.0;
    let mut completed_issues = 0;
    let mut unestimated_count = 0;
    let mut done = Vec::new();

    for issue in issues {
        let category = statuses.classify(&issue.status)?;
        *status_distribution.entry(category).or_insert(0) += 1;
        *raw_status_counts.entry(issue.status.clone()).or_insert(0) += 1;
        let assignee = issue.assignee.clone().unwrap_or_else(|| "Unassigned".to_string());
        *assignee_distribution.entry(assignee).or_insert(0) += 1;

        match issue.story_points {
            Some(points) if !points.is_finite() || points < 0.0 => {
                return Err(SprintLensError::InvalidInput(format!(
                    "issue {} has invalid story points {}",
                    issue.key, points
                )));
            }
            Some(points) => total_points += points,
            None => unestimated_count += 1,
        }

        if category == StatusCategory::Done {
            completed_issues += 1;
            completed_points += issue.points_or_zero();
            done.push(issue);
        }
    }

    let completion_percentage = if total_points > 0.0 {
        completed_points / total_points * 100.0
    } else {
        0.0
    };

    let burndown_series = burndown_series(sprint, total_points, &done, as_of);

    Ok(SprintReport {
        summary: SprintSummary {
            sprint_id: sprint.id,
            sprint_name: sprint.name.clone(),
            total_issues: issues.len(),
            completed_issues,
            total_points,
            completed_points,
            unestimated_count,
            completion_percentage,
        },
        status_distribution,
        raw_status_counts,
        assignee_distribution,
        burndown: Burndown {
            total_points,
            completed_points,
            remaining_points: total_points - completed_points,
        },
        burndown_series,
    })
}

/// One point per day from the sprint start through the earlier of its end
/// and `as_of`. A done issue without a resolution date counts as completed
/// on its last update.
fn burndown_series(
    sprint: &Sprint,
    total_points: f64,
    done: &[&Issue],
    as_of: NaiveDate,
) -> Vec<BurndownPoint> {
    let Some(start) = sprint.start_date.map(|d| d.date_naive()) else {
        return Vec::new();
    };
    let end = sprint.end_date.map(|d| d.date_naive());
    let last = end.map_or(as_of, |end| end.min(as_of));
    if last < start {
        return Vec::new();
    }

    let completions: Vec<(NaiveDate, f64)> = done
        .iter()
        .map(|issue| {
            let day = issue.resolved.unwrap_or(issue.updated).date_naive();
            (day, issue.points_or_zero())
        })
        .collect();

    let length = end.map(|end| (end - start).num_days());

    let mut series = Vec::new();
    let mut day = start;
    while day <= last {
        let burned: f64 = completions
            .iter()
            .filter(|(completed_on, _)| *completed_on <= day)
            .map(|(_, points)| points)
            .sum();
        let elapsed = (day - start).num_days();
        let ideal_remaining = length.map(|length| {
            if length <= 0 {
                0.0
            } else {
                (total_points * (1.0 - elapsed as f64 / length as f64)).max(0.0)
            }
        });
        series.push(BurndownPoint {
            date: day,
            remaining_points: total_points - burned,
            ideal_remaining,
        });
        match day.checked_add_days(Days::new(1)) {
            Some(next) => day = next,
            None => break,
        }
    }
    series
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::issue::fixtures::issue;
    use crate::models::SprintState;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn sprint(id: u64) -> Sprint {
        Sprint {
            id,
            name: format!("Sprint {}", id),
            state: SprintState::Active,
            start_date: Some(Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()),
            end_date: Some(Utc.with_ymd_and_hms(2024, 3, 8, 17, 0, 0).unwrap()),
            complete_date: None,
            goal: "Ship the report".to_string(),
            board_id: Some(7),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_three_issue_sprint_example() {
        let issues = vec![
            issue("PROJ-1", "Done", Some(5.0)),
            issue("PROJ-2", "In Progress", None),
            issue("PROJ-3", "To Do", Some(3.0)),
        ];

        let report =
            sprint_report(1, &[sprint(1)], &issues, &StatusMap::default(), day(6)).unwrap();

        assert_eq!(report.summary.total_issues, 3);
        assert_eq!(report.summary.total_points, 8.0);
        assert_eq!(report.summary.unestimated_count, 1);
        assert_eq!(report.summary.completed_points, 5.0);
        assert_eq!(report.summary.completion_percentage, 62.5);
        assert_eq!(report.status_distribution[&StatusCategory::Done], 1);
        assert_eq!(report.status_distribution[&StatusCategory::InProgress], 1);
        assert_eq!(report.status_distribution[&StatusCategory::ToDo], 1);
        assert_eq!(
            report.burndown,
            Burndown {
                total_points: 8.0,
                completed_points: 5.0,
                remaining_points: 3.0
            }
        );
    }

    #[test]
    fn test_empty_sprint_has_zero_completion() {
        let report = sprint_report(1, &[sprint(1)], &[], &StatusMap::default(), day(6)).unwrap();
        assert_eq!(report.summary.total_issues, 0);
        assert_eq!(report.summary.total_points, 0.0);
        assert_eq!(report.summary.completion_percentage, 0.0);
        assert_eq!(report.burndown.remaining_points, 0.0);
        assert!(report.status_distribution.values().all(|count| *count == 0));
    }

    #[test]
    fn test_unknown_sprint_is_not_found() {
        let err = sprint_report(99, &[sprint(1)], &[], &StatusMap::default(), day(6)).unwrap_err();
        assert!(matches!(err, SprintLensError::NotFound { kind: "Sprint", ref id } if id == "99"));
    }

    #[test]
    fn test_unrecognized_status_falls_into_default_category() {
        let issues = vec![
            issue("PROJ-1", "Waiting for Legal", Some(2.0)),
            issue("PROJ-2", "Closed", Some(1.0)),
        ];
        let report =
            build_sprint_report(&sprint(1), &issues, &StatusMap::default(), day(6)).unwrap();
        assert_eq!(report.status_distribution[&StatusCategory::ToDo], 1);
        assert_eq!(report.status_distribution[&StatusCategory::Done], 1);
        assert_eq!(report.raw_status_counts["Waiting for Legal"], 1);
    }

    #[test]
    fn test_missing_mapping_without_fallback_fails() {
        let issues = vec![issue("PROJ-1", "Waiting for Legal", Some(2.0))];
        let statuses = StatusMap::default().with_fallback(None);
        let err = build_sprint_report(&sprint(1), &issues, &statuses, day(6)).unwrap_err();
        assert!(matches!(err, SprintLensError::ConfigurationError(_)));
    }

    #[test]
    fn test_negative_story_points_are_rejected() {
        let issues = vec![
            issue("PROJ-1", "Done", Some(5.0)),
            issue("PROJ-2", "To Do", Some(-3.0)),
        ];
        let err = build_sprint_report(&sprint(1), &issues, &StatusMap::default(), day(6)).unwrap_err();
        assert!(matches!(err, SprintLensError::InvalidInput(ref msg) if msg.contains("PROJ-2")));
    }

    #[test]
    fn test_assignee_distribution_groups_unassigned() {
        let mut a = issue("PROJ-1", "To Do", Some(1.0));
        a.assignee = Some("alice".to_string());
        let b = issue("PROJ-2", "To Do", Some(1.0));
        let c = issue("PROJ-3", "To Do", Some(1.0));
        let report =
            build_sprint_report(&sprint(1), &[a, b, c], &StatusMap::default(), day(6)).unwrap();
        assert_eq!(report.assignee_distribution["alice"], 1);
        assert_eq!(report.assignee_distribution["Unassigned"], 2);
    }

    #[test]
    fn test_burndown_series_tracks_resolutions() {
        let mut first = issue("PROJ-1", "Done", Some(5.0));
        first.resolved = Some(Utc.with_ymd_and_hms(2024, 3, 5, 15, 0, 0).unwrap());
        let mut second = issue("PROJ-2", "Done", Some(3.0));
        second.updated = Utc.with_ymd_and_hms(2024, 3, 7, 11, 0, 0).unwrap();
        let open = issue("PROJ-3", "To Do", Some(2.0));

        let report = build_sprint_report(
            &sprint(1),
            &[first, second, open],
            &StatusMap::default(),
            day(20),
        )
        .unwrap();

        let remaining: Vec<f64> = report
            .burndown_series
            .iter()
            .map(|p| p.remaining_points)
            .collect();
        assert_eq!(remaining, vec![10.0, 5.0, 5.0, 2.0, 2.0]);
        assert_eq!(report.burndown_series[0].ideal_remaining, Some(10.0));
        assert_eq!(report.burndown_series[4].ideal_remaining, Some(0.0));
        assert_eq!(report.burndown_series[2].ideal_remaining, Some(5.0));
    }

    #[test]
    fn test_burndown_series_stops_at_as_of() {
        let report = build_sprint_report(&sprint(1), &[], &StatusMap::default(), day(5)).unwrap();
        assert_eq!(report.burndown_series.len(), 2);
    }

    #[test]
    fn test_burndown_series_without_end_date_has_no_ideal_line() {
        let mut open_ended = sprint(1);
        open_ended.end_date = None;
        let report =
            build_sprint_report(&open_ended, &[], &StatusMap::default(), day(6)).unwrap();
        assert_eq!(report.burndown_series.len(), 3);
        assert!(report.burndown_series.iter().all(|p| p.ideal_remaining.is_none()));
    }

    #[test]
    fn test_burndown_series_empty_without_start_date() {
        let mut future = sprint(1);
        future.start_date = None;
        future.state = SprintState::Future;
        let report = build_sprint_report(&future, &[], &StatusMap::default(), day(6)).unwrap();
        assert!(report.burndown_series.is_empty());
    }

    proptest! {
        #[test]
        fn prop_distribution_sums_to_total(
            specs in prop::collection::vec(
                (
                    prop::sample::select(vec!["To Do", "In Progress", "Done", "Closed", "Mystery", "qa"]),
                    prop::option::of(0u32..20),
                ),
                0..40,
            )
        ) {
            let issues: Vec<Issue> = specs
                .iter()
                .enumerate()
                .map(|(i, (status, points))| {
                    issue(&format!("PROJ-{}", i), status, points.map(f64::from))
                })
                .collect();
            let report = build_sprint_report(&sprint(1), &issues, &StatusMap::default(), day(6)).unwrap();

            let distributed: usize = report.status_distribution.values().sum();
            prop_assert_eq!(distributed, issues.len());

            let unestimated = specs.iter().filter(|(_, points)| points.is_none()).count();
            prop_assert_eq!(report.summary.unestimated_count, unestimated);
            prop_assert!(report.summary.completion_percentage >= 0.0);
            prop_assert!(report.summary.completion_percentage <= 100.0);
        }
    }
}
