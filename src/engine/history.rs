//! Work-log history of one user over a relative period.

use crate::errors::{Result, SprintLensError};
use crate::models::WorkLog;
use chrono::{Datelike, Days, Months, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// `7d`, `3m`, `1y` or `all`. Months and years reach back to the start of
/// the calendar month or year, days to the start of that day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Days(u32),
    Months(u32),
    Years(u32),
    All,
}

impl Default for Period {
    fn default() -> Self {
        Period::Days(7)
    }
}

impl Period {
    /// First day inside the period, or `None` for `all`.
    pub fn since(&self, today: NaiveDate) -> Result<Option<NaiveDate>> {
        let out_of_range = || SprintLensError::InvalidInput(format!("period {} reaches too far back", self));
        match *self {
            Period::All => Ok(None),
            Period::Days(days) => today
                .checked_sub_days(Days::new(u64::from(days)))
                .map(Some)
                .ok_or_else(out_of_range),
            Period::Months(months) => today
                .with_day(1)
                .and_then(|first| first.checked_sub_months(Months::new(months)))
                .map(Some)
                .ok_or_else(out_of_range),
            Period::Years(years) => i32::try_from(years)
                .ok()
                .and_then(|years| today.year().checked_sub(years))
                .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
                .map(Some)
                .ok_or_else(out_of_range),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Days(n) => write!(f, "{}d", n),
            Period::Months(n) => write!(f, "{}m", n),
            Period::Years(n) => write!(f, "{}y", n),
            Period::All => f.write_str("all"),
        }
    }
}

impl FromStr for Period {
    type Err = SprintLensError;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim().to_ascii_lowercase();
        if raw == "all" {
            return Ok(Period::All);
        }
        let invalid = || {
            SprintLensError::InvalidInput(format!(
                "unknown period '{}' (expected e.g. 7d, 30d, 3m, 6m, 1y or all)",
                s
            ))
        };
        let Some(unit) = raw.chars().last() else {
            return Err(invalid());
        };
        let count: u32 = raw[..raw.len() - unit.len_utf8()]
            .parse()
            .map_err(|_| invalid())?;
        match unit {
            'd' => Ok(Period::Days(count)),
            'm' => Ok(Period::Months(count)),
            'y' => Ok(Period::Years(count)),
            _ => Err(invalid()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorklogHistory {
    pub username: String,
    pub period: String,
    pub since: Option<NaiveDate>,
    pub total_worklogs: usize,
    pub total_hours: f64,
    pub daily_hours: BTreeMap<NaiveDate, f64>,
    pub issue_hours: BTreeMap<String, f64>,
    pub worklogs: Vec<WorkLog>,
}

/// Work logs of `username` from the start of `period` through `today`,
/// oldest first. Days are taken in the author's time zone.
pub fn worklog_history(
    username: &str,
    period: Period,
    today: NaiveDate,
    worklogs: &[WorkLog],
) -> Result<WorklogHistory> {
    let since = period.since(today)?;

    let mut selected: Vec<WorkLog> = worklogs
        .iter()
        .filter(|w| w.author.eq_ignore_ascii_case(username))
        .filter(|w| since.map_or(true, |since| w.day() >= since) && w.day() <= today)
        .cloned()
        .collect();
    selected.sort_by(|a, b| {
        a.day()
            .cmp(&b.day())
            .then_with(|| a.started.cmp(&b.started))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut daily_hours = BTreeMap::new();
    let mut issue_hours = BTreeMap::new();
    let mut total_seconds = 0;
    for log in &selected {
        if log.time_spent_seconds < 0 {
            return Err(SprintLensError::InvalidInput(format!(
                "work log {} has negative time spent",
                log.id
            )));
        }
        total_seconds += log.time_spent_seconds;
        *daily_hours.entry(log.day()).or_insert(0.0) += log.hours();
        *issue_hours.entry(log.issue_key.clone()).or_insert(0.0) += log.hours();
    }

    Ok(WorklogHistory {
        username: username.to_string(),
        period: period.to_string(),
        since,
        total_worklogs: selected.len(),
        total_hours: (total_seconds as f64 / 36.0).round() / 100.0,
        daily_hours,
        issue_hours,
        worklogs: selected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn log(id: &str, key: &str, author: &str, started: &str, minutes: i64) -> WorkLog {
        WorkLog {
            id: id.to_string(),
            issue_key: key.to_string(),
            author: author.to_string(),
            comment: String::new(),
            time_spent_seconds: minutes * 60,
            started: DateTime::parse_from_rfc3339(started).unwrap(),
        }
    }

    #[test]
    fn test_period_parsing() {
        assert_eq!("7d".parse::<Period>().unwrap(), Period::Days(7));
        assert_eq!("3M".parse::<Period>().unwrap(), Period::Months(3));
        assert_eq!(" 1y".parse::<Period>().unwrap(), Period::Years(1));
        assert_eq!("all".parse::<Period>().unwrap(), Period::All);
        for bad in ["", "d", "7w", "-3d", "lots"] {
            assert!(matches!(bad.parse::<Period>(), Err(SprintLensError::InvalidInput(_))), "{bad}");
        }
    }

    #[test]
    fn test_period_start_dates() {
        let today = date(2024, 3, 13);
        assert_eq!(Period::Days(7).since(today).unwrap(), Some(date(2024, 3, 6)));
        assert_eq!(Period::Months(3).since(today).unwrap(), Some(date(2023, 12, 1)));
        assert_eq!(Period::Years(1).since(today).unwrap(), Some(date(2023, 1, 1)));
        assert_eq!(Period::All.since(today).unwrap(), None);
    }

    #[test]
    fn test_history_totals_and_buckets() {
        let logs = vec![
            log("1", "PROJ-1", "alice", "2024-03-12T09:00:00+00:00", 90),
            log("2", "PROJ-2", "Alice", "2024-03-12T18:00:00-08:00", 60),
            log("3", "PROJ-1", "alice", "2024-03-08T09:00:00+00:00", 20),
            log("4", "PROJ-1", "bob", "2024-03-12T09:00:00+00:00", 600),
            log("5", "PROJ-1", "alice", "2024-02-01T09:00:00+00:00", 600),
        ];

        let history = worklog_history("alice", Period::Days(7), date(2024, 3, 13), &logs).unwrap();

        let ids: Vec<&str> = history.worklogs.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
        assert_eq!(history.total_worklogs, 3);
        assert_eq!(history.total_hours, 2.83);
        assert_eq!(history.daily_hours[&date(2024, 3, 12)], 2.5);
        assert_eq!(history.issue_hours["PROJ-2"], 1.0);
        assert_eq!(history.period, "7d");
        assert_eq!(history.since, Some(date(2024, 3, 6)));
    }

    #[test]
    fn test_all_period_keeps_everything_up_to_today() {
        let logs = vec![
            log("1", "PROJ-1", "alice", "2020-01-02T09:00:00+00:00", 60),
            log("2", "PROJ-1", "alice", "2024-03-14T09:00:00+00:00", 60),
        ];
        let history = worklog_history("alice", Period::All, date(2024, 3, 13), &logs).unwrap();
        assert_eq!(history.total_worklogs, 1);
        assert_eq!(history.since, None);
        assert_eq!(history.total_hours, 1.0);
    }
}
