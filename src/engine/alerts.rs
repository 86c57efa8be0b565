use crate::engine::status::{StatusCategory, StatusMap};
use crate::errors::{Result, SprintLensError};
use crate::models::{Issue, WorkLog};
use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    MissingWorklog,
    Overdue,
    DueToday,
    DueSoon,
    DailySync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertResult {
    pub kind: AlertKind,
    pub message: String,
    pub issue_key: Option<String>,
    pub day: Option<NaiveDate>,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertOptions {
    pub lookback_days: u32,
    pub due_warning_days: u32,
    pub work_days: Vec<Weekday>,
}

impl Default for AlertOptions {
    fn default() -> Self {
        Self {
            lookback_days: 7,
            due_warning_days: 2,
            work_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
        }
    }
}

/// Derives the alerts for `username` as of `today`. Issues and work logs of
/// other users are ignored, so callers may pass unfiltered collections.
pub fn evaluate_alerts(
    username: &str,
    today: NaiveDate,
    issues: &[Issue],
    worklogs: &[WorkLog],
    statuses: &StatusMap,
    options: &AlertOptions,
) -> Result<Vec<AlertResult>> {
    if options.lookback_days == 0 {
        return Err(SprintLensError::InvalidInput(
            "alert lookback window must be at least one day".to_string(),
        ));
    }
    if options.work_days.is_empty() {
        return Err(SprintLensError::InvalidInput(
            "at least one work day must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    let mut assigned = Vec::new();
    for issue in issues.iter().filter(|i| i.is_assigned_to(username)) {
        if seen.insert(issue.key.as_str()) {
            assigned.push((issue, statuses.classify(&issue.status)?));
        }
    }

    let mut logged_by_day: BTreeMap<NaiveDate, (i64, BTreeSet<&str>)> = BTreeMap::new();
    for log in worklogs
        .iter()
        .filter(|w| w.author.eq_ignore_ascii_case(username))
    {
        let entry = logged_by_day.entry(log.day()).or_default();
        entry.0 += log.time_spent_seconds;
        entry.1.insert(log.issue_key.as_str());
    }

    let mut alerts = missing_worklogs(today, &assigned, &logged_by_day, options);
    alerts.extend(due_dates(today, &assigned, options.due_warning_days));
    alerts.push(daily_sync(today, &assigned, &logged_by_day));
    Ok(alerts)
}

/// One alert per work day in the window, never one per issue.
fn missing_worklogs(
    today: NaiveDate,
    assigned: &[(&Issue, StatusCategory)],
    logged_by_day: &BTreeMap<NaiveDate, (i64, BTreeSet<&str>)>,
    options: &AlertOptions,
) -> Vec<AlertResult> {
    let mut alerts = Vec::new();
    for offset in (1..=options.lookback_days).rev() {
        let Some(day) = today.checked_sub_days(Days::new(u64::from(offset))) else {
            continue;
        };
        if !options.work_days.contains(&day.weekday()) {
            continue;
        }
        let logged = logged_by_day.get(&day).map_or(0, |(seconds, _)| *seconds);
        if logged > 0 {
            continue;
        }

        let active: Vec<&str> = assigned
            .iter()
            .filter(|(issue, category)| {
                *category == StatusCategory::InProgress && issue.created.date_naive() <= day
            })
            .map(|(issue, _)| issue.key.as_str())
            .collect();
        if active.is_empty() {
            continue;
        }

        alerts.push(AlertResult {
            kind: AlertKind::MissingWorklog,
            message: format!(
                "No work logged on {} {} while {} in progress",
                day.weekday(),
                day,
                describe_keys(&active)
            ),
            issue_key: None,
            day: Some(day),
            severity: Severity::Medium,
        });
    }
    alerts
}

/// At most one alert per issue: overdue, due today, or due within the
/// warning threshold. Done issues never alert.
fn due_dates(
    today: NaiveDate,
    assigned: &[(&Issue, StatusCategory)],
    warning_days: u32,
) -> Vec<AlertResult> {
    let mut due: Vec<(NaiveDate, &Issue)> = assigned
        .iter()
        .filter(|(_, category)| *category != StatusCategory::Done)
        .filter_map(|(issue, _)| issue.due_date.map(|d| (d, *issue)))
        .collect();
    due.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.key.cmp(&b.1.key)));

    due.into_iter()
        .filter_map(|(due_date, issue)| {
            let days_left = (due_date - today).num_days();
            let (kind, severity, message) = if days_left < 0 {
                (
                    AlertKind::Overdue,
                    Severity::High,
                    format!("Issue {} is overdue by {}", issue.key, plural_days(-days_left)),
                )
            } else if days_left == 0 {
                (
                    AlertKind::DueToday,
                    Severity::Medium,
                    format!("Issue {} is due today", issue.key),
                )
            } else if days_left <= i64::from(warning_days) {
                (
                    AlertKind::DueSoon,
                    Severity::Low,
                    format!("Issue {} is due in {}", issue.key, plural_days(days_left)),
                )
            } else {
                return None;
            };
            Some(AlertResult {
                kind,
                message,
                issue_key: Some(issue.key.clone()),
                day: Some(due_date),
                severity,
            })
        })
        .collect()
}

fn daily_sync(
    today: NaiveDate,
    assigned: &[(&Issue, StatusCategory)],
    logged_by_day: &BTreeMap<NaiveDate, (i64, BTreeSet<&str>)>,
) -> AlertResult {
    let yesterday_part = match today
        .pred_opt()
        .and_then(|yesterday| logged_by_day.get(&yesterday).map(|entry| (yesterday, entry)))
    {
        Some((yesterday, (seconds, keys))) if *seconds > 0 => {
            let keys: Vec<&str> = keys.iter().copied().collect();
            format!(
                "Yesterday ({}): {:.1}h logged on {}.",
                yesterday,
                *seconds as f64 / 3600.0,
                keys.join(", ")
            )
        }
        _ => "Yesterday: nothing logged.".to_string(),
    };

    let in_progress: Vec<&str> = assigned
        .iter()
        .filter(|(_, category)| *category == StatusCategory::InProgress)
        .map(|(issue, _)| issue.key.as_str())
        .collect();
    let today_part = if in_progress.is_empty() {
        "Today: no issues in progress.".to_string()
    } else {
        format!("Today in progress: {}.", in_progress.join(", "))
    };

    AlertResult {
        kind: AlertKind::DailySync,
        message: format!("{} {}", yesterday_part, today_part),
        issue_key: None,
        day: Some(today),
        severity: Severity::Info,
    }
}

fn describe_keys(keys: &[&str]) -> String {
    match keys {
        [single] => format!("{} was", single),
        many => format!("{} were", many.join(", ")),
    }
}

fn plural_days(days: i64) -> String {
    if days == 1 {
        "1 day".to_string()
    } else {
        format!("{} days", days)
    }
}
