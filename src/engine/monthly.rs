//! Monthly throughput: issues created and resolved in a calendar month.

use crate::errors::{Result, SprintLensError};
use crate::models::Issue;
use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Issues listed per section of the report.
pub const TOP_ISSUES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySummary {
    pub total_issues_created: usize,
    pub total_issues_completed: usize,
    pub total_story_points: f64,
    /// Story points resolved within the month.
    pub team_velocity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyIssue {
    pub key: String,
    pub summary: String,
    pub status: String,
    pub assignee: String,
    pub story_points: f64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyReport {
    pub period: String,
    pub start: NaiveDate,
    /// First day after the month.
    pub end: NaiveDate,
    pub summary: MonthlySummary,
    pub velocity_by_assignee: BTreeMap<String, f64>,
    pub created_issues: Vec<MonthlyIssue>,
    pub resolved_issues: Vec<MonthlyIssue>,
}

/// `[first day of month, first day of next month)`.
pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
        SprintLensError::InvalidInput(format!("{}-{:02} is not a valid month", year, month))
    })?;
    let end = start.checked_add_months(Months::new(1)).ok_or_else(|| {
        SprintLensError::InvalidInput(format!("{}-{:02} is out of range", year, month))
    })?;
    Ok((start, end))
}

pub fn monthly_report(year: i32, month: u32, issues: &[Issue]) -> Result<MonthlyReport> {
    let (start, end) = month_bounds(year, month)?;
    let within = |at: &DateTime<Utc>| {
        let day = at.date_naive();
        day >= start && day < end
    };

    let mut created: Vec<&Issue> = issues.iter().filter(|i| within(&i.created)).collect();
    created.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| a.key.cmp(&b.key)));

    let mut resolved: Vec<(&Issue, DateTime<Utc>)> = issues
        .iter()
        .filter_map(|i| i.resolved.filter(|at| within(at)).map(|at| (i, at)))
        .collect();
    resolved.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.key.cmp(&b.0.key)));

    let mut total_story_points = 0.0;
    for issue in &created {
        total_story_points += points(issue)?;
    }
    let mut team_velocity = 0.0;
    let mut velocity_by_assignee = BTreeMap::new();
    for (issue, _) in &resolved {
        let points = points(issue)?;
        team_velocity += points;
        *velocity_by_assignee.entry(assignee(issue)).or_insert(0.0) += points;
    }

    Ok(MonthlyReport {
        period: format!("{}-{:02}", year, month),
        start,
        end,
        summary: MonthlySummary {
            total_issues_created: created.len(),
            total_issues_completed: resolved.len(),
            total_story_points,
            team_velocity,
        },
        velocity_by_assignee,
        created_issues: created
            .iter()
            .take(TOP_ISSUES)
            .map(|issue| listed(issue, issue.created))
            .collect(),
        resolved_issues: resolved
            .iter()
            .take(TOP_ISSUES)
            .map(|(issue, at)| listed(issue, *at))
            .collect(),
    })
}

fn points(issue: &Issue) -> Result<f64> {
    let points = issue.points_or_zero();
    if !points.is_finite() || points < 0.0 {
        return Err(SprintLensError::InvalidInput(format!(
            "issue {} has invalid story points {}",
            issue.key, points
        )));
    }
    Ok(points)
}

fn assignee(issue: &Issue) -> String {
    issue.assignee.clone().unwrap_or_else(|| "Unassigned".to_string())
}

fn listed(issue: &Issue, at: DateTime<Utc>) -> MonthlyIssue {
    MonthlyIssue {
        key: issue.key.clone(),
        summary: issue.summary.clone(),
        status: issue.status.clone(),
        assignee: assignee(issue),
        story_points: issue.points_or_zero(),
        at,
    }
}

/// Standalone HTML page for sharing the report outside the terminal.
pub fn render_html(report: &MonthlyReport) -> String {
    let mut html = String::new();
    let summary = &report.summary;

    // Writing into a String cannot fail.
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Monthly Report - {period}</title>\n\
         <style>body{{font-family:sans-serif;margin:2em}}table{{border-collapse:collapse;margin-bottom:2em}}\
         th,td{{border:1px solid #999;padding:4px 8px;text-align:left}}th{{background:#eee}}</style>\n\
         </head>\n<body>\n<h1>Monthly Report - {period}</h1>\n",
        period = escape(&report.period)
    );

    html.push_str("<h2>Summary</h2>\n<table>\n<tr><th>Metric</th><th>Value</th></tr>\n");
    let _ = writeln!(html, "<tr><td>Issues created</td><td>{}</td></tr>", summary.total_issues_created);
    let _ = writeln!(html, "<tr><td>Issues completed</td><td>{}</td></tr>", summary.total_issues_completed);
    let _ = writeln!(html, "<tr><td>Story points created</td><td>{:.1}</td></tr>", summary.total_story_points);
    let _ = writeln!(html, "<tr><td>Team velocity</td><td>{:.1}</td></tr>", summary.team_velocity);
    html.push_str("</table>\n");

    if !report.velocity_by_assignee.is_empty() {
        html.push_str("<h2>Velocity by assignee</h2>\n<table>\n<tr><th>Assignee</th><th>Points</th></tr>\n");
        for (assignee, points) in &report.velocity_by_assignee {
            let _ = writeln!(html, "<tr><td>{}</td><td>{:.1}</td></tr>", escape(assignee), points);
        }
        html.push_str("</table>\n");
    }

    issue_table(&mut html, "Created issues", "Created", &report.created_issues);
    issue_table(&mut html, "Resolved issues", "Resolved", &report.resolved_issues);

    html.push_str("</body>\n</html>\n");
    html
}

fn issue_table(html: &mut String, title: &str, at_label: &str, issues: &[MonthlyIssue]) {
    let _ = writeln!(html, "<h2>{}</h2>", title);
    if issues.is_empty() {
        html.push_str("<p>None</p>\n");
        return;
    }
    let _ = writeln!(
        html,
        "<table>\n<tr><th>Key</th><th>Summary</th><th>Status</th><th>Assignee</th><th>Points</th><th>{}</th></tr>",
        at_label
    );
    for issue in issues {
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{:.1}</td><td>{}</td></tr>",
            escape(&issue.key),
            escape(&issue.summary),
            escape(&issue.status),
            escape(&issue.assignee),
            issue.story_points,
            issue.at.date_naive()
        );
    }
    html.push_str("</table>\n");
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::issue::fixtures::issue;
    use chrono::TimeZone;

    fn at(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, month, day, 12, 0, 0).unwrap()
    }

    fn sample() -> Vec<Issue> {
        let mut created_and_resolved = issue("PROJ-1", "Done", Some(5.0));
        created_and_resolved.created = at(3, 2);
        created_and_resolved.resolved = Some(at(3, 20));
        created_and_resolved.assignee = Some("alice".to_string());

        let mut created_only = issue("PROJ-2", "To Do", None);
        created_only.created = at(3, 31);

        let mut resolved_from_february = issue("PROJ-3", "Done", Some(3.0));
        resolved_from_february.created = at(2, 10);
        resolved_from_february.resolved = Some(at(3, 1));

        let mut april = issue("PROJ-4", "To Do", Some(8.0));
        april.created = at(4, 1);

        vec![created_and_resolved, created_only, resolved_from_february, april]
    }

    #[test]
    fn test_month_bounds() {
        let (start, end) = month_bounds(2024, 12).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert!(matches!(month_bounds(2024, 13), Err(SprintLensError::InvalidInput(_))));
        assert!(matches!(month_bounds(2024, 0), Err(SprintLensError::InvalidInput(_))));
    }

    #[test]
    fn test_monthly_report_counts_created_and_resolved() {
        let report = monthly_report(2024, 3, &sample()).unwrap();

        assert_eq!(report.period, "2024-03");
        assert_eq!(report.summary.total_issues_created, 2);
        assert_eq!(report.summary.total_issues_completed, 2);
        assert_eq!(report.summary.total_story_points, 5.0);
        assert_eq!(report.summary.team_velocity, 8.0);
        assert_eq!(report.velocity_by_assignee["alice"], 5.0);
        assert_eq!(report.velocity_by_assignee["Unassigned"], 3.0);

        let created: Vec<&str> = report.created_issues.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(created, vec!["PROJ-2", "PROJ-1"]);
        let resolved: Vec<&str> = report.resolved_issues.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(resolved, vec!["PROJ-1", "PROJ-3"]);
    }

    #[test]
    fn test_monthly_lists_are_capped() {
        let issues: Vec<Issue> = (1..=15)
            .map(|n| {
                let mut i = issue(&format!("PROJ-{}", n), "To Do", Some(1.0));
                i.created = at(5, n);
                i
            })
            .collect();
        let report = monthly_report(2024, 5, &issues).unwrap();
        assert_eq!(report.summary.total_issues_created, 15);
        assert_eq!(report.created_issues.len(), TOP_ISSUES);
        assert_eq!(report.created_issues[0].key, "PROJ-15");
    }

    #[test]
    fn test_empty_month() {
        let report = monthly_report(2023, 1, &sample()).unwrap();
        assert_eq!(report.summary.total_issues_created, 0);
        assert_eq!(report.summary.team_velocity, 0.0);
        assert!(report.velocity_by_assignee.is_empty());
    }

    #[test]
    fn test_html_escapes_issue_text() {
        let mut issues = sample();
        issues[0].summary = "Fix <script> & \"quotes\"".to_string();
        let html = render_html(&monthly_report(2024, 3, &issues).unwrap());

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Monthly Report - 2024-03</title>"));
        assert!(html.contains("Fix &lt;script&gt; &amp; &quot;quotes&quot;"));
        assert!(html.contains("<tr><td>Team velocity</td><td>8.0</td></tr>"));
        assert!(!html.contains("<script>"));
    }
}
