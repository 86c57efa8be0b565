//! Aggregation engine: pure computations over already-fetched tracker data.
//!
//! Nothing in here performs I/O or keeps state between calls; every result is
//! rebuilt from the issues, sprints and work logs handed in.

pub mod alerts;
pub mod capacity;
pub mod history;
pub mod monthly;
pub mod report;
pub mod schedule;
pub mod status;
pub mod workload;

pub use alerts::{evaluate_alerts, AlertOptions, AlertResult, Severity};
pub use capacity::{
    allocate, assess, completion_history, work_items_from_issues, CapacityAllocation,
    CapacityOptions, CapacityPlan, CapacityStrategy, TeamMember,
};
pub use history::{worklog_history, Period, WorklogHistory};
pub use monthly::{monthly_report, render_html, MonthlyReport};
pub use report::{sprint_report, SprintReport};
pub use schedule::{plan_week, ScheduleOptions, WeeklySchedule};
pub use status::{StatusCategory, StatusMap};
pub use workload::{team_load, user_issue_summary, TeamLoad, UserIssueSummary};
