use crate::engine::capacity::estimated_effort_hours;
use crate::engine::status::{StatusCategory, StatusMap};
use crate::errors::{Result, SprintLensError};
use crate::models::Issue;
use chrono::{NaiveDate, Weekday};
use serde::Serialize;
use std::cmp::Ordering;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleOptions {
    pub work_days: Vec<Weekday>,
    pub hours_per_day: f64,
    pub hours_per_point: f64,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            work_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            hours_per_day: 8.0,
            hours_per_point: 8.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledWork {
    pub issue_key: String,
    pub hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayPlan {
    pub day: String,
    pub available_hours: f64,
    pub entries: Vec<ScheduledWork>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklySchedule {
    pub days: Vec<DayPlan>,
    pub unscheduled: Vec<ScheduledWork>,
    pub total_hours: f64,
    pub available_hours: f64,
    pub allocated_hours: f64,
    pub utilization_percentage: f64,
}

/// Numeric rank of a Jira priority name; unknown names rank as Medium.
pub fn priority_rank(priority: Option<&str>) -> u8 {
    match priority.map(|p| p.trim().to_ascii_lowercase()).as_deref() {
        Some("highest") | Some("blocker") | Some("critical") => 5,
        Some("high") | Some("major") => 4,
        Some("low") | Some("minor") => 2,
        Some("lowest") | Some("trivial") => 1,
        _ => 3,
    }
}

/// Lays the user's open issues over one working week, highest priority first,
/// then earliest due date, then largest effort. Issues split across days when
/// a day fills up; whatever does not fit the week is reported as unscheduled.
pub fn plan_week(
    issues: &[Issue],
    statuses: &StatusMap,
    options: &ScheduleOptions,
) -> Result<WeeklySchedule> {
    if options.work_days.is_empty() {
        return Err(SprintLensError::InvalidInput(
            "at least one work day must be configured".to_string(),
        ));
    }
    if !options.hours_per_day.is_finite() || options.hours_per_day <= 0.0 || options.hours_per_day > 24.0 {
        return Err(SprintLensError::InvalidInput(format!(
            "hours per day must be within 0..24, got {}",
            options.hours_per_day
        )));
    }

    let mut open = Vec::new();
    for issue in issues {
        if statuses.classify(&issue.status)? == StatusCategory::Done {
            continue;
        }
        let effort = estimated_effort_hours(issue, options.hours_per_point);
        if !effort.is_finite() || effort < 0.0 {
            return Err(SprintLensError::InvalidInput(format!(
                "issue {} has invalid effort {}",
                issue.key, effort
            )));
        }
        open.push((issue, effort));
    }
    open.sort_by(|(a, effort_a), (b, effort_b)| compare_for_schedule(a, *effort_a, b, *effort_b));

    let mut days: Vec<DayPlan> = options
        .work_days
        .iter()
        .map(|weekday| DayPlan {
            day: weekday.to_string(),
            available_hours: options.hours_per_day,
            entries: Vec::new(),
        })
        .collect();

    let mut unscheduled = Vec::new();
    let mut day_index = 0;
    let mut used_today = 0.0;

    for (issue, effort) in &open {
        // Unestimated work still shows up, on the day the queue has reached.
        if *effort <= EPSILON {
            let day = day_index.min(days.len() - 1);
            days[day].entries.push(ScheduledWork {
                issue_key: issue.key.clone(),
                hours: 0.0,
            });
            continue;
        }

        let mut remaining = *effort;
        while remaining > EPSILON && day_index < days.len() {
            let free = options.hours_per_day - used_today;
            if free <= EPSILON {
                day_index += 1;
                used_today = 0.0;
                continue;
            }
            let hours = remaining.min(free);
            days[day_index].entries.push(ScheduledWork {
                issue_key: issue.key.clone(),
                hours,
            });
            used_today += hours;
            remaining -= hours;
        }
        if remaining > EPSILON {
            unscheduled.push(ScheduledWork {
                issue_key: issue.key.clone(),
                hours: remaining,
            });
        }
    }

    let total_hours: f64 = open.iter().map(|(_, effort)| effort).sum();
    let available_hours = options.hours_per_day * days.len() as f64;
    let allocated_hours: f64 = days
        .iter()
        .flat_map(|d| d.entries.iter())
        .map(|e| e.hours)
        .sum();

    Ok(WeeklySchedule {
        days,
        unscheduled,
        total_hours,
        available_hours,
        allocated_hours,
        utilization_percentage: allocated_hours / available_hours * 100.0,
    })
}

fn compare_for_schedule(a: &Issue, effort_a: f64, b: &Issue, effort_b: f64) -> Ordering {
    let due = |d: Option<NaiveDate>| d.unwrap_or(NaiveDate::MAX);
    priority_rank(b.priority.as_deref())
        .cmp(&priority_rank(a.priority.as_deref()))
        .then_with(|| due(a.due_date).cmp(&due(b.due_date)))
        .then_with(|| effort_b.total_cmp(&effort_a))
        .then_with(|| a.key.cmp(&b.key))
}
