pub mod issue;
pub mod jira;
pub mod sprint;
pub mod user;
pub mod worklog;

pub use issue::Issue;
pub use sprint::{Sprint, SprintState};
pub use user::User;
pub use worklog::WorkLog;
