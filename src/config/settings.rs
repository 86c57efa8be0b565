use crate::engine::{
    AlertOptions, CapacityOptions, CapacityStrategy, ScheduleOptions, StatusCategory, StatusMap,
    TeamMember,
};
use crate::errors::{Result, SprintLensError};
use crate::models::jira::DEFAULT_STORY_POINT_FIELDS;
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "SPRINTLENS";
pub const CONFIG_PATH_ENV: &str = "SPRINTLENS_CONFIG";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub jira: JiraConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub team: Vec<TeamMember>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthMethod {
    /// Bearer token, Jira Data Center/Server
    PersonalAccessToken { token: String },
    /// Basic auth with email, Jira Cloud
    ApiToken { token: String },
}

impl AuthMethod {
    pub fn token(&self) -> &str {
        match self {
            AuthMethod::PersonalAccessToken { token } | AuthMethod::ApiToken { token } => token,
        }
    }

    pub fn with_token(&self, token: String) -> Self {
        match self {
            AuthMethod::PersonalAccessToken { .. } => AuthMethod::PersonalAccessToken { token },
            AuthMethod::ApiToken { .. } => AuthMethod::ApiToken { token },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AuthMethod::PersonalAccessToken { .. } => "Personal Access Token",
            AuthMethod::ApiToken { .. } => "API Token",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JiraConfig {
    pub url: String,
    pub email: String,
    pub auth_method: AuthMethod,
    pub project_key: String,
    #[serde(default)]
    pub board_id: Option<u64>,
    #[serde(default = "default_story_point_fields")]
    pub story_point_fields: Vec<String>,
}

fn default_story_point_fields() -> Vec<String> {
    DEFAULT_STORY_POINT_FIELDS.iter().map(|f| f.to_string()).collect()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Category for statuses missing from the table; "none" makes them an error.
    pub default_category: String,
    pub status_categories: BTreeMap<String, String>,
    pub capacity_strategy: String,
    pub overflow_tolerance_pct: f64,
    pub default_hourly_rate: f64,
    pub alert_lookback_days: u32,
    pub due_warning_days: u32,
    pub hours_per_point: f64,
    pub hours_per_day: f64,
    pub work_days: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_category: "to_do".to_string(),
            status_categories: BTreeMap::new(),
            capacity_strategy: CapacityStrategy::default().as_str().to_string(),
            overflow_tolerance_pct: 0.0,
            default_hourly_rate: crate::engine::capacity::DEFAULT_HOURLY_RATE,
            alert_lookback_days: 7,
            due_warning_days: 2,
            hours_per_point: 8.0,
            hours_per_day: 8.0,
            work_days: ["Mon", "Tue", "Wed", "Thu", "Fri"]
                .iter()
                .map(|d| d.to_string())
                .collect(),
        }
    }
}

impl EngineConfig {
    /// Default workflow table with the configured entries layered on top.
    pub fn status_map(&self) -> Result<StatusMap> {
        let fallback = match self.default_category.trim().to_ascii_lowercase().as_str() {
            "none" | "" => None,
            other => Some(other.parse::<StatusCategory>()?),
        };
        let mut map = StatusMap::default().with_fallback(fallback);
        for (status, category) in &self.status_categories {
            map.insert(status, category.parse()?);
        }
        Ok(map)
    }

    pub fn strategy(&self) -> Result<CapacityStrategy> {
        self.capacity_strategy.parse()
    }

    pub fn capacity_options(&self) -> Result<CapacityOptions> {
        Ok(CapacityOptions {
            strategy: self.strategy()?,
            overflow_tolerance_pct: self.overflow_tolerance_pct,
            default_hourly_rate: self.default_hourly_rate,
        })
    }

    pub fn work_days(&self) -> Result<Vec<Weekday>> {
        self.work_days
            .iter()
            .map(|day| {
                day.parse::<Weekday>().map_err(|_| {
                    SprintLensError::ConfigurationError(format!("unknown work day '{}'", day))
                })
            })
            .collect()
    }

    pub fn alert_options(&self) -> Result<AlertOptions> {
        Ok(AlertOptions {
            lookback_days: self.alert_lookback_days,
            due_warning_days: self.due_warning_days,
            work_days: self.work_days()?,
        })
    }

    pub fn schedule_options(&self) -> Result<ScheduleOptions> {
        Ok(ScheduleOptions {
            work_days: self.work_days()?,
            hours_per_day: self.hours_per_day,
            hours_per_point: self.hours_per_point,
        })
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Layers the TOML file under environment variables such as
    /// `SPRINTLENS__JIRA__URL`.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let env_prefix = format!("{}__", ENV_PREFIX);
        let has_env = std::env::vars().any(|(key, _)| key.starts_with(&env_prefix));

        if !config_path.exists() && !has_env {
            return Err(SprintLensError::ConfigNotFound);
        }

        let settings = ::config::Config::builder()
            .add_source(
                ::config::File::from(config_path.to_path_buf())
                    .format(::config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Settings>()?;

        Ok(settings)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let config_str = toml::to_string_pretty(self)
            .map_err(|e| SprintLensError::ConfigInvalid(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(config_path, config_str)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(config_path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(config_path, perms)?;
        }

        Ok(())
    }

    /// Updates one `section.field` key. `status.<name>` maps a tracker status
    /// to a category.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let Some((section, field)) = key.split_once('.') else {
            return Err(SprintLensError::InvalidInput(
                "Invalid key format. Use format: section.field (e.g., jira.email)".to_string(),
            ));
        };

        let value = value.to_string();
        match (section, field) {
            ("jira", "url") => self.jira.url = value,
            ("jira", "email") => self.jira.email = value,
            ("jira", "token") => self.jira.auth_method = self.jira.auth_method.with_token(value),
            ("jira", "project_key") => self.jira.project_key = value,
            ("jira", "board_id") => self.jira.board_id = Some(parse_number(key, &value)?),
            ("store", "path") => self.store.path = Some(PathBuf::from(value)),
            ("engine", "default_category") => self.engine.default_category = value,
            ("engine", "capacity_strategy") => {
                value.parse::<CapacityStrategy>()?;
                self.engine.capacity_strategy = value;
            }
            ("engine", "overflow_tolerance_pct") => {
                self.engine.overflow_tolerance_pct = parse_number(key, &value)?
            }
            ("engine", "default_hourly_rate") => {
                self.engine.default_hourly_rate = parse_number(key, &value)?
            }
            ("engine", "alert_lookback_days") => {
                self.engine.alert_lookback_days = parse_number(key, &value)?
            }
            ("engine", "due_warning_days") => {
                self.engine.due_warning_days = parse_number(key, &value)?
            }
            ("engine", "hours_per_point") => self.engine.hours_per_point = parse_number(key, &value)?,
            ("engine", "hours_per_day") => self.engine.hours_per_day = parse_number(key, &value)?,
            ("status", status) => {
                value.parse::<StatusCategory>()?;
                self.engine.status_categories.insert(status.to_string(), value);
            }
            _ => {
                return Err(SprintLensError::InvalidInput(format!(
                    "Unknown configuration key: {}",
                    key
                )))
            }
        }

        // re-validate everything derived from the engine section
        self.engine.status_map()?;
        Ok(())
    }

    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.store.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("cache.sqlite3")),
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn config_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME").map_err(|_| {
            SprintLensError::Other("HOME environment variable not set".to_string())
        })?;
        Ok(PathBuf::from(home).join(".sprintlens"))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SprintLensError::InvalidInput(format!("{} expects a number, got '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Settings {
        Settings {
            jira: JiraConfig {
                url: "https://jira.example.com".to_string(),
                email: "test@example.com".to_string(),
                auth_method: AuthMethod::ApiToken {
                    token: "test-token".to_string(),
                },
                project_key: "TEST".to_string(),
                board_id: Some(42),
                story_point_fields: default_story_point_fields(),
            },
            store: StoreConfig::default(),
            engine: EngineConfig::default(),
            team: vec![TeamMember {
                id: "alice".to_string(),
                available_hours: 30.0,
                hourly_rate: Some(90.0),
            }],
        }
    }

    #[test]
    fn test_config_serialization() {
        let settings = sample();

        let toml_str = toml::to_string(&settings).unwrap();
        assert!(toml_str.contains("https://jira.example.com"));
        assert!(toml_str.contains("api_token"));

        let deserialized: Settings = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized.jira.url, "https://jira.example.com");
        assert_eq!(deserialized.jira.board_id, Some(42));
        assert_eq!(deserialized.team[0].id, "alice");
    }

    #[test]
    fn test_save_then_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut settings = sample();
        settings.engine.capacity_strategy = "cost-optimize".to_string();
        settings
            .engine
            .status_categories
            .insert("Ready for QA".to_string(), "in_progress".to_string());
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.jira.project_key, "TEST");
        assert_eq!(loaded.engine.strategy().unwrap(), CapacityStrategy::CostOptimize);
        assert_eq!(loaded.team[0].available_hours, 30.0);

        let map = loaded.engine.status_map().unwrap();
        assert_eq!(map.classify("Ready for QA").unwrap(), StatusCategory::InProgress);
    }

    #[test]
    fn test_minimal_file_uses_engine_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[jira]
url = "https://jira.example.com"
email = "me@example.com"
project_key = "PROJ"

[jira.auth_method]
type = "personal_access_token"
token = "secret"
"#,
        )
        .unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(
            loaded.jira.auth_method,
            AuthMethod::PersonalAccessToken {
                token: "secret".to_string()
            }
        );
        assert_eq!(loaded.jira.story_point_fields.len(), 4);
        assert_eq!(loaded.engine.alert_lookback_days, 7);
        assert_eq!(loaded.engine.due_warning_days, 2);
        assert_eq!(loaded.engine.work_days().unwrap().len(), 5);
        assert!(loaded.team.is_empty());
    }

    #[test]
    fn test_config_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Settings::load_from(&dir.path().join("absent.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_strategy_is_configuration_error() {
        let engine = EngineConfig {
            capacity_strategy: "round-robin".to_string(),
            ..EngineConfig::default()
        };
        assert!(matches!(
            engine.capacity_options().unwrap_err(),
            SprintLensError::ConfigurationError(_)
        ));
    }

    #[test]
    fn test_default_category_none_removes_fallback() {
        let engine = EngineConfig {
            default_category: "none".to_string(),
            ..EngineConfig::default()
        };
        let map = engine.status_map().unwrap();
        assert!(map.fallback().is_none());
        assert!(map.classify("Mystery").is_err());
    }

    #[test]
    fn test_set_value_updates_known_keys() {
        let mut settings = sample();
        settings.set_value("jira.token", "rotated").unwrap();
        settings.set_value("engine.overflow_tolerance_pct", "15").unwrap();
        settings.set_value("status.Ready for QA", "in_progress").unwrap();

        assert_eq!(settings.jira.auth_method.token(), "rotated");
        assert_eq!(settings.engine.overflow_tolerance_pct, 15.0);
        assert_eq!(settings.engine.status_categories["Ready for QA"], "in_progress");
    }

    #[test]
    fn test_set_value_rejects_bad_input() {
        let mut settings = sample();
        assert!(settings.set_value("jira", "x").is_err());
        assert!(settings.set_value("jira.nickname", "x").is_err());
        assert!(settings.set_value("engine.capacity_strategy", "random").is_err());
        assert!(settings.set_value("engine.due_warning_days", "soon").is_err());
        assert!(settings.set_value("status.Blocked", "stuck").is_err());
    }

    #[test]
    fn test_unknown_work_day() {
        let engine = EngineConfig {
            work_days: vec!["Mon".to_string(), "Funday".to_string()],
            ..EngineConfig::default()
        };
        assert!(engine.alert_options().is_err());
    }
}
