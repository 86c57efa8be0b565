use colored::*;
use std::fmt;

#[derive(Debug)]
pub enum SprintLensError {
    // Aggregation errors
    NotFound { kind: &'static str, id: String },
    InvalidInput(String),
    CapacityExceeded {
        demand_hours: f64,
        capacity_hours: f64,
        tolerance_pct: f64,
    },
    ConfigurationError(String),

    // Configuration file errors
    ConfigNotFound,
    ConfigInvalid(String),

    // Jira errors
    JiraAuthFailed(u16),
    JiraApiError(u16, String),

    // Local cache errors
    Store(String),

    // Network errors
    NetworkError(String),

    // Generic error
    Other(String),
}

impl SprintLensError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        SprintLensError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl fmt::Display for SprintLensError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Aggregation errors
            SprintLensError::NotFound { kind, id } => {
                write!(f, "{}\n", format!("{} '{}' not found", kind, id).red().bold())?;
                write!(f, "   {}\n\n", "It is not in the local cache".dimmed())?;
                write!(f, "   To fix:\n")?;
                write!(f, "   1. Check the identifier is correct\n")?;
                if *kind == "User" {
                    let command = format!("sprintlens sync --user {}", id);
                    write!(f, "   2. Pull the user into the cache: {}", command.green())
                } else {
                    write!(f, "   2. Refresh the cache: {}", "sprintlens sync".green())
                }
            }
            SprintLensError::InvalidInput(msg) => {
                write!(f, "{}\n", "Invalid input".red().bold())?;
                write!(f, "   {}", msg.dimmed())
            }
            SprintLensError::CapacityExceeded {
                demand_hours,
                capacity_hours,
                tolerance_pct,
            } => {
                write!(f, "{}\n", "Capacity exceeded".red().bold())?;
                write!(
                    f,
                    "   {}\n\n",
                    format!(
                        "Demand of {:.1}h exceeds team capacity of {:.1}h (tolerance {:.0}%)",
                        demand_hours, capacity_hours, tolerance_pct
                    )
                    .dimmed()
                )?;
                write!(f, "   To fix:\n")?;
                write!(f, "   1. Move issues out of the sprint\n")?;
                write!(f, "   2. Declare more available hours in [[team]]\n")?;
                write!(f, "   3. Or allow overflow: {}", "sprintlens capacity --tolerance 10".green())
            }
            SprintLensError::ConfigurationError(msg) => {
                write!(f, "{}\n", "Configuration error".red().bold())?;
                write!(f, "   {}\n\n", msg.dimmed())?;
                write!(f, "   Check the [engine] section: {}", "sprintlens config show".green())
            }

            // Configuration file errors
            SprintLensError::ConfigNotFound => {
                write!(f, "{}\n", "Configuration not found".red().bold())?;
                write!(f, "   {}\n\n", "Run 'sprintlens init' to set up your configuration".dimmed())?;
                write!(f, "   {}", "sprintlens init".green())
            }
            SprintLensError::ConfigInvalid(msg) => {
                write!(f, "{}\n", "Invalid configuration".red().bold())?;
                write!(f, "   {}\n\n", msg.dimmed())?;
                write!(f, "   To fix:\n")?;
                write!(f, "   1. Check your config file: ~/.sprintlens/config.toml\n")?;
                write!(f, "   2. Or reinitialize: {}", "sprintlens init".green())
            }

            // Jira errors
            SprintLensError::JiraAuthFailed(status) => {
                write!(f, "{}\n", format!("Jira authentication failed ({})", status).red().bold())?;
                write!(f, "   {}\n\n", "Your API token may have expired or is invalid".dimmed())?;
                write!(f, "   To fix:\n")?;
                write!(f, "   1. Generate new token: {}\n", "https://id.atlassian.com/manage-profile/security/api-tokens".cyan())?;
                write!(f, "   2. Update config: {}", "sprintlens config set jira.token <token>".green())
            }
            SprintLensError::JiraApiError(status, msg) => {
                write!(f, "{}\n", format!("Jira API error ({})", status).red().bold())?;
                write!(f, "   {}\n\n", msg.dimmed())?;
                write!(f, "   Try again or check your network connection")
            }

            // Local cache errors
            SprintLensError::Store(msg) => {
                write!(f, "{}\n", "Local cache error".red().bold())?;
                write!(f, "   {}\n\n", msg.dimmed())?;
                write!(f, "   The cache can be deleted safely and rebuilt with {}", "sprintlens sync".green())
            }

            // Network errors
            SprintLensError::NetworkError(msg) => {
                write!(f, "{}\n", "Network error".red().bold())?;
                write!(f, "   {}\n\n", msg.dimmed())?;
                write!(f, "   To fix:\n")?;
                write!(f, "   1. Check your internet connection\n")?;
                write!(f, "   2. Verify you can reach the Jira URL\n")?;
                write!(f, "   3. Try again in a moment")
            }

            // Generic
            SprintLensError::Other(msg) => {
                write!(f, "{}\n", "Error".red().bold())?;
                write!(f, "   {}", msg.dimmed())
            }
        }
    }
}

impl std::error::Error for SprintLensError {}

// Conversion from anyhow::Error
impl From<anyhow::Error> for SprintLensError {
    fn from(err: anyhow::Error) -> Self {
        SprintLensError::Other(err.to_string())
    }
}

impl From<std::io::Error> for SprintLensError {
    fn from(err: std::io::Error) -> Self {
        SprintLensError::Other(err.to_string())
    }
}

impl From<reqwest::Error> for SprintLensError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            SprintLensError::NetworkError(err.to_string())
        } else if let Some(status) = err.status() {
            if status == 401 || status == 403 {
                SprintLensError::JiraAuthFailed(status.as_u16())
            } else {
                SprintLensError::JiraApiError(status.as_u16(), err.to_string())
            }
        } else {
            SprintLensError::Other(err.to_string())
        }
    }
}

impl From<rusqlite::Error> for SprintLensError {
    fn from(err: rusqlite::Error) -> Self {
        SprintLensError::Store(err.to_string())
    }
}

impl From<::config::ConfigError> for SprintLensError {
    fn from(err: ::config::ConfigError) -> Self {
        SprintLensError::ConfigInvalid(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SprintLensError>;
