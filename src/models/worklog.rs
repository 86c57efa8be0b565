use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkLog {
    pub id: String,
    pub issue_key: String,
    pub author: String,
    pub comment: String,
    pub time_spent_seconds: i64,
    /// Keeps the author's UTC offset, as Jira reports it.
    pub started: DateTime<FixedOffset>,
}

impl WorkLog {
    /// Calendar day in the author's own time zone.
    pub fn day(&self) -> NaiveDate {
        self.started.date_naive()
    }

    pub fn hours(&self) -> f64 {
        self.time_spent_seconds as f64 / 3600.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_is_the_authors_local_date() {
        let log = WorkLog {
            id: "1".to_string(),
            issue_key: "PROJ-1".to_string(),
            author: "alice".to_string(),
            comment: String::new(),
            time_spent_seconds: 4 * 3600,
            started: DateTime::parse_from_rfc3339("2024-03-12T18:00:00-08:00").unwrap(),
        };
        assert_eq!(log.day(), NaiveDate::from_ymd_opt(2024, 3, 12).unwrap());
        assert_eq!(log.hours(), 4.0);
    }
}
