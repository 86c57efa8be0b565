use chrono::{Datelike, Days, Local, NaiveDate};
use clap::{Parser, Subcommand};
use colored::*;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;
mod engine;
mod errors;
mod models;
mod store;

use crate::config::settings::{AuthMethod, JiraConfig, Settings};
use crate::engine::{
    AlertOptions, AlertResult, CapacityAllocation, CapacityPlan, MonthlyReport, Period, Severity,
    SprintReport, StatusCategory, StatusMap, TeamLoad, UserIssueSummary, WeeklySchedule,
    WorklogHistory,
};
use crate::errors::SprintLensError;
use crate::models::{Issue, Sprint, SprintState, User};
use std::path::{Path, PathBuf};
use crate::store::Store;

#[derive(Parser)]
#[command(name = "sprintlens")]
#[command(version = "0.1.0")]
#[command(about = "Sprint reports, capacity planning and work-log alerts for Jira", long_about = None)]
struct Cli {
    /// for debugging purposes
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive setup of ~/.sprintlens/config.toml
    Init,

    /// Pull sprints, issues and work logs from Jira into the local cache
    Sync {
        /// Only refresh this sprint
        #[arg(long)]
        sprint: Option<u64>,

        /// Whose issues and work logs to pull (defaults to the authenticated user)
        #[arg(long)]
        user: Option<String>,

        /// How far back to look for the user's work logs (defaults to engine.alert_lookback_days)
        #[arg(long)]
        days: Option<u32>,
    },

    /// List cached sprints
    Sprints {
        #[arg(long)]
        json: bool,
    },

    /// Completion, status breakdown and burndown of a sprint
    Report {
        /// Sprint id. If not provided, pick one interactively
        sprint_id: Option<u64>,

        /// Refresh the sprint from Jira first
        #[arg(long)]
        sync: bool,

        #[arg(long)]
        json: bool,
    },

    /// Distribute a sprint's open work over the configured team
    Capacity {
        #[arg(long)]
        sprint: u64,

        /// load-balance, cost-optimize or efficiency-max
        #[arg(long)]
        strategy: Option<String>,

        /// Allowed overflow of demand over capacity, in percent
        #[arg(long)]
        tolerance: Option<f64>,

        #[arg(long)]
        json: bool,
    },

    /// Missing work logs, due dates and a daily sync summary
    Alerts {
        #[arg(long)]
        user: String,

        /// Look-back window for missing work logs
        #[arg(long)]
        days: Option<u32>,

        #[arg(long)]
        json: bool,
    },

    /// Lay a user's open issues over the working week
    Schedule {
        #[arg(long)]
        user: String,

        #[arg(long)]
        hours_per_day: Option<f64>,

        #[arg(long)]
        json: bool,
    },

    /// Hours a user logged over a period
    Worklogs {
        #[arg(long)]
        user: String,

        /// 7d, 30d, 3m, 6m, 1y or all
        #[arg(long, default_value = "7d")]
        period: String,

        /// Refresh the user's work logs for the period first
        #[arg(long)]
        sync: bool,

        #[arg(long)]
        json: bool,
    },

    /// A user's open issues by priority and status
    Issues {
        #[arg(long)]
        user: String,

        #[arg(long)]
        json: bool,
    },

    /// Issues and points per team member across one or more sprints
    Team {
        /// Sprint id, repeatable (defaults to the active cached sprints)
        #[arg(long = "sprint")]
        sprints: Vec<u64>,

        /// Member username, repeatable (defaults to the configured [[team]])
        #[arg(long = "member")]
        members: Vec<String>,

        #[arg(long)]
        json: bool,
    },

    /// Issues created and resolved in a calendar month
    Monthly {
        /// 1-12 (defaults to the current month)
        #[arg(long)]
        month: Option<u32>,

        #[arg(long)]
        year: Option<i32>,

        /// Pull the month's created and resolved issues from Jira first
        #[arg(long)]
        sync: bool,

        /// Also write the report as an HTML page
        #[arg(long)]
        html: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Open the board, or a sprint report, in the browser
    Open {
        #[arg(long)]
        sprint: Option<u64>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Display current configuration (with masked secrets)
    Show,

    /// Set a specific configuration value
    Set {
        /// Configuration key (e.g., jira.email, engine.capacity_strategy, status.Blocked)
        key: String,
        /// New value
        value: String,
    },

    /// Validate configuration by testing the Jira connection
    Validate,

    /// Get the path to the config file
    Path,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Init => handle_init().await,

        Commands::Sync { sprint, user, days } => handle_sync(sprint, user.as_deref(), days).await,

        Commands::Sprints { json } => handle_sprints(json),

        Commands::Report { sprint_id, sync, json } => handle_report(sprint_id, sync, json).await,

        Commands::Capacity { sprint, strategy, tolerance, json } => {
            handle_capacity(sprint, strategy.as_deref(), tolerance, json)
        }

        Commands::Alerts { user, days, json } => handle_alerts(&user, days, json),

        Commands::Schedule { user, hours_per_day, json } => {
            handle_schedule(&user, hours_per_day, json)
        }

        Commands::Worklogs { user, period, sync, json } => {
            handle_worklogs(&user, &period, sync, json).await
        }

        Commands::Issues { user, json } => handle_issues(&user, json),

        Commands::Team { sprints, members, json } => handle_team(&sprints, &members, json),

        Commands::Monthly { month, year, sync, html, json } => {
            handle_monthly(month, year, sync, html.as_deref(), json).await
        }

        Commands::Open { sprint } => handle_open(sprint),

        Commands::Config { action } => handle_config(action).await,
    };

    if let Err(e) = result {
        eprintln!("\n{}", e);
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins; otherwise warnings only, or debug output with `--verbose`.
/// Logs go to stderr so `--json` output stays parseable.
fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "sprintlens=debug,warn" } else { "warn" })
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

fn jira_client(jira: &JiraConfig) -> api::jira::JiraClient {
    api::jira::JiraClient::new(
        jira.url.clone(),
        jira.email.clone(),
        jira.auth_method.clone(),
        jira.story_point_fields.clone(),
    )
}

fn open_store(settings: &Settings) -> anyhow::Result<Store> {
    let path = settings.store_path()?;
    Ok(Store::open(&path)?)
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

async fn handle_init() -> anyhow::Result<()> {
    use crate::config::settings::{EngineConfig, StoreConfig};

    println!("{}", "SprintLens Configuration Setup".cyan().bold());
    println!();
    println!(
        "{}",
        "This will store your credentials in ~/.sprintlens/config.toml".dimmed()
    );
    println!(
        "{}",
        "The file will be created with read-only permissions (600)".dimmed()
    );
    println!();

    println!("{}", "Jira Configuration".bold());
    let jira_url = prompt("Jira URL (e.g., https://<company>.atlassian.net)")?;
    let jira_email = prompt("Jira email")?;
    println!();

    println!("{}", "Select authentication method:".bold());
    println!("{}", "  1. Personal Access Token (for Jira Data Center/Server)".dimmed());
    println!("{}", "  2. API Token (for Jira Cloud)".dimmed());
    let auth_choice = prompt_with_default("Choice (1/2)", "2")?;

    let auth_method = if auth_choice == "1" {
        println!();
        println!("{}", "To create a Personal Access Token:".dimmed());
        println!("{}", "  1. Go to Jira → Profile → Personal Access Tokens".dimmed());
        println!("{}", "  2. Click 'Create token'".dimmed());
        println!("{}", "  3. Copy and paste it here".dimmed());
        println!();
        let token = prompt("Personal Access Token")?;
        AuthMethod::PersonalAccessToken { token }
    } else {
        println!();
        println!("{}", "To create a Jira API token:".dimmed());
        println!("{}", "  1. Go to https://id.atlassian.com/manage-profile/security/api-tokens".dimmed());
        println!("{}", "  2. Click 'Create API token'".dimmed());
        println!("{}", "  3. Copy and paste it here".dimmed());
        println!();
        let token = prompt("Jira API token")?;
        AuthMethod::ApiToken { token }
    };

    let project_key = prompt("Default project key (e.g., PROJ)")?;
    let board_id = prompt_with_default("Scrum board id (blank to skip)", "")?;
    let board_id = if board_id.is_empty() {
        None
    } else {
        Some(
            board_id
                .parse::<u64>()
                .map_err(|_| SprintLensError::InvalidInput(format!("board id must be a number, got '{}'", board_id)))?,
        )
    };

    let jira = JiraConfig {
        url: jira_url,
        email: jira_email,
        auth_method,
        project_key,
        board_id,
        story_point_fields: models::jira::DEFAULT_STORY_POINT_FIELDS
            .iter()
            .map(|f| f.to_string())
            .collect(),
    };

    println!();
    println!("{}", "Validating configuration...".cyan());
    println!();

    print!("{}", "  Testing Jira connection... ".dimmed());
    std::io::Write::flush(&mut std::io::stdout())?;
    let me = match jira_client(&jira).myself().await {
        Ok(user) => {
            println!("{}", "✓".green().bold());
            user
        }
        Err(e) => {
            println!("{}", "✗".red().bold());
            return Err(e.into());
        }
    };
    println!("  {} {} ({})", "Signed in as".dimmed(), me.display_name.bright_white(), me.username);

    let settings = Settings {
        jira,
        store: StoreConfig::default(),
        engine: EngineConfig::default(),
        team: Vec::new(),
    };
    settings.save()?;

    let config_path = Settings::config_path()?;
    println!();
    println!("{}", "Configuration saved!".green().bold());
    println!(
        "  Location: {}",
        config_path.display().to_string().bright_white()
    );
    println!();
    println!("{}", "Next steps:".bold());
    println!("  {} {}", "1.".dimmed(), "Declare your team as [[team]] entries in the config file");
    println!("  {} {}", "2.".dimmed(), "sprintlens sync".green());
    println!();
    println!("{}", "Keep your API tokens secure!".yellow());
    println!("{}", "  Never commit config.toml to git".dimmed());

    Ok(())
}

fn prompt(message: &str) -> anyhow::Result<String> {
    use std::io::Write;
    print!("{}: ", message.bright_white());
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn prompt_with_default(message: &str, default: &str) -> anyhow::Result<String> {
    use std::io::Write;
    print!("{} [{}]: ", message.bright_white(), default.dimmed());
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    let trimmed = input.trim();
    if trimmed.is_empty() {
        Ok(default.to_string())
    } else {
        Ok(trimmed.to_string())
    }
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

async fn handle_sync(sprint_id: Option<u64>, user: Option<&str>, days: Option<u32>) -> anyhow::Result<()> {
    println!("{}", "Syncing from Jira...".cyan().bold());
    println!();

    let settings = Settings::load()?;
    let jira = jira_client(&settings.jira);
    let mut store = open_store(&settings)?;

    let sprint_ids = match sprint_id {
        Some(id) => vec![id],
        None => match settings.jira.board_id {
            Some(board_id) => {
                let sprints = sync_board(&jira, &mut store, board_id).await?;
                println!(
                    "  {} {} sprints on board {}",
                    "✓".green(),
                    sprints.len().to_string().bright_white(),
                    board_id
                );
                sprints
                    .iter()
                    .filter(|s| s.state == SprintState::Active)
                    .map(|s| s.id)
                    .collect()
            }
            None => {
                warn!("no board_id configured, skipping sprint sync");
                println!(
                    "{}",
                    "  No board configured, skipping sprints (sprintlens config set jira.board_id <id>)"
                        .yellow()
                );
                Vec::new()
            }
        },
    };

    for id in sprint_ids {
        let (sprint, count) = sync_sprint(&jira, &mut store, id).await?;
        println!(
            "  {} {} ({} issues)",
            "✓".green(),
            sprint.name.bright_white(),
            count
        );
    }

    let user = match user {
        Some(query) => jira.find_user(query).await?,
        None => jira.myself().await?,
    };
    store.upsert_user(&user)?;

    let days = days.unwrap_or(settings.engine.alert_lookback_days);
    let since = today()
        .checked_sub_days(Days::new(u64::from(days)))
        .ok_or_else(|| SprintLensError::InvalidInput(format!("cannot look back {} days", days)))?;
    let (issues, worklogs) =
        sync_user(&jira, &mut store, &settings.jira.project_key, &user.username, Some(since)).await?;
    println!(
        "  {} {} issues and {} work logs for {}",
        "✓".green(),
        issues,
        worklogs,
        user.username.bright_white()
    );

    println!();
    println!("{}", "Cache is up to date".green().bold());
    Ok(())
}

async fn sync_board(
    jira: &api::jira::JiraClient,
    store: &mut Store,
    board_id: u64,
) -> errors::Result<Vec<Sprint>> {
    let sprints = jira.board_sprints(board_id, &[]).await?;
    store.upsert_sprints(&sprints)?;
    store.record_sync(&format!("board:{}", board_id))?;
    info!(board_id, sprints = sprints.len(), "board synced");
    Ok(sprints)
}

async fn sync_sprint(
    jira: &api::jira::JiraClient,
    store: &mut Store,
    sprint_id: u64,
) -> errors::Result<(Sprint, usize)> {
    let sprint = jira.sprint(sprint_id).await?;
    let issues = jira.sprint_issues(sprint_id).await?;
    store.sync_sprint(&sprint, &issues)?;
    info!(sprint_id, issues = issues.len(), "sprint synced");
    Ok((sprint, issues.len()))
}

/// Pulls the user's assigned issues in the project plus every issue they
/// logged work on since `since`, and replaces the work logs of all of them.
async fn sync_user(
    jira: &api::jira::JiraClient,
    store: &mut Store,
    project_key: &str,
    username: &str,
    since: Option<NaiveDate>,
) -> errors::Result<(usize, usize)> {
    let assigned = jira.search_with_jql(&assignee_jql(username, project_key), 200).await?;
    let logged = jira.search_with_jql(&worklog_author_jql(username, since), 200).await?;
    debug!(assigned = assigned.len(), logged = logged.len(), "user searches finished");

    let issues = merge_issues(assigned, logged);
    store.upsert_issues(&issues)?;

    let mut worklog_count = 0;
    for issue in &issues {
        let worklogs = jira.issue_worklogs(&issue.key).await?;
        debug!(issue = %issue.key, worklogs = worklogs.len(), "fetched work logs");
        worklog_count += worklogs
            .iter()
            .filter(|w| w.author.eq_ignore_ascii_case(username))
            .count();
        store.replace_worklogs(&issue.key, &worklogs)?;
    }
    store.record_sync(&format!("user:{}", username))?;

    info!(username, issues = issues.len(), worklogs = worklog_count, "user synced");
    Ok((issues.len(), worklog_count))
}

/// Union of both searches, first occurrence wins.
fn merge_issues(first: Vec<Issue>, second: Vec<Issue>) -> Vec<Issue> {
    let mut merged: Vec<Issue> = Vec::with_capacity(first.len() + second.len());
    for issue in first.into_iter().chain(second) {
        if !merged.iter().any(|known| known.key == issue.key) {
            merged.push(issue);
        }
    }
    merged
}

fn jql_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn assignee_jql(username: &str, project_key: &str) -> String {
    format!(
        "assignee = {} AND project = {} ORDER BY updated DESC",
        jql_string(username),
        project_key
    )
}

fn worklog_author_jql(username: &str, since: Option<NaiveDate>) -> String {
    match since {
        Some(since) => format!(
            "worklogAuthor = {} AND worklogDate >= \"{}\" ORDER BY updated DESC",
            jql_string(username),
            since
        ),
        None => format!("worklogAuthor = {} ORDER BY updated DESC", jql_string(username)),
    }
}

fn monthly_jql(project_key: &str, start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "project = {project} AND ((created >= \"{start}\" AND created < \"{end}\") \
         OR (resolved >= \"{start}\" AND resolved < \"{end}\")) ORDER BY created DESC",
        project = project_key,
        start = start,
        end = end
    )
}

// ---------------------------------------------------------------------------
// Sprints and reports
// ---------------------------------------------------------------------------

fn handle_sprints(json_output: bool) -> anyhow::Result<()> {
    let settings = Settings::load()?;
    let store = open_store(&settings)?;
    let sprints = store.sprints()?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&sprints)?);
        return Ok(());
    }

    println!("{}", "Cached Sprints".cyan().bold());
    println!();

    if sprints.is_empty() {
        println!("{}", "  No sprints cached. Run 'sprintlens sync' first".dimmed());
        return Ok(());
    }

    for sprint in &sprints {
        let state = match sprint.state {
            SprintState::Active => sprint.state.as_str().green(),
            SprintState::Future => sprint.state.as_str().yellow(),
            SprintState::Closed => sprint.state.as_str().bright_black(),
        };
        println!(
            "  {:>6}  [{}]  {}  {}",
            sprint.id.to_string().bright_white().bold(),
            state,
            sprint.name,
            date_range(sprint).dimmed()
        );
    }

    Ok(())
}

async fn handle_report(sprint_id: Option<u64>, sync: bool, json_output: bool) -> anyhow::Result<()> {
    let settings = Settings::load()?;
    let statuses = settings.engine.status_map()?;
    let mut store = open_store(&settings)?;

    if sync {
        let jira = jira_client(&settings.jira);
        match sprint_id {
            Some(id) => {
                sync_sprint(&jira, &mut store, id).await?;
            }
            None => {
                let board_id = settings.jira.board_id.ok_or_else(|| {
                    SprintLensError::ConfigurationError(
                        "--sync without a sprint id needs jira.board_id".to_string(),
                    )
                })?;
                for sprint in sync_board(&jira, &mut store, board_id).await? {
                    if sprint.state == SprintState::Active {
                        sync_sprint(&jira, &mut store, sprint.id).await?;
                    }
                }
            }
        }
    }

    let sprints = store.sprints()?;
    let sprint_id = match sprint_id {
        Some(id) => id,
        None => match select_sprint(&sprints)? {
            Some(id) => id,
            None => {
                println!("\n{}", "No sprint selected".yellow());
                return Ok(());
            }
        },
    };

    let issues = store.sprint_issues(sprint_id)?;
    let report = engine::sprint_report(sprint_id, &sprints, &issues, &statuses, today())?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let sprint = store.sprint(sprint_id)?;
    print_report(&sprint, &report);
    if let Some(synced_at) = store.last_synced(&format!("sprint:{}", sprint_id))? {
        println!();
        println!(
            "{}",
            format!("Last synced {}", synced_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")).dimmed()
        );
    }
    Ok(())
}

fn select_sprint(sprints: &[Sprint]) -> anyhow::Result<Option<u64>> {
    use dialoguer::Select;

    if sprints.is_empty() {
        return Err(SprintLensError::InvalidInput(
            "No sprints cached. Run 'sprintlens sync' first".to_string(),
        )
        .into());
    }

    let items: Vec<String> = sprints
        .iter()
        .map(|s| format!("{} [{}] {}", s.id, s.state, s.name))
        .collect();
    let default = sprints
        .iter()
        .position(|s| s.state == SprintState::Active)
        .unwrap_or(0);

    let selection = Select::new()
        .with_prompt("Select a sprint")
        .items(&items)
        .default(default)
        .interact_opt()?;

    Ok(selection.map(|index| sprints[index].id))
}

fn print_report(sprint: &Sprint, report: &SprintReport) {
    let summary = &report.summary;

    println!("{}", format!("Sprint Report: {}", summary.sprint_name).cyan().bold());
    println!("  {} {}", "State:".bold(), sprint.state);
    match sprint.length_days() {
        Some(days) => println!("  {} {} ({} days)", "Dates:".bold(), date_range(sprint), days),
        None => println!("  {} {}", "Dates:".bold(), date_range(sprint)),
    }
    if !sprint.goal.is_empty() {
        println!("  {} {}", "Goal:".bold(), sprint.goal);
    }
    println!();

    println!(
        "  {} {} ({} done)",
        "Issues:".bold(),
        summary.total_issues.to_string().bright_white(),
        summary.completed_issues
    );
    println!(
        "  {} {:.1} / {:.1}",
        "Points:".bold(),
        summary.completed_points,
        summary.total_points
    );
    if summary.unestimated_count > 0 {
        println!(
            "  {} {}",
            "Unestimated:".bold(),
            summary.unestimated_count.to_string().yellow()
        );
    }
    println!(
        "  {} {} {:.1}%",
        "Completion:".bold(),
        progress_bar(summary.completion_percentage, 20).green(),
        summary.completion_percentage
    );

    println!();
    println!("{}", "Status".bold());
    for (category, count) in &report.status_distribution {
        println!("  {:<12} {}", category_label(*category), count);
    }

    if !report.assignee_distribution.is_empty() {
        println!();
        println!("{}", "Assignees".bold());
        for (assignee, count) in &report.assignee_distribution {
            println!("  {:<24} {}", assignee, count);
        }
    }

    if !report.burndown_series.is_empty() {
        println!();
        println!("{}", "Burndown".bold());
        for point in &report.burndown_series {
            let ideal = point
                .ideal_remaining
                .map(|v| format!("(ideal {:.1})", v))
                .unwrap_or_default();
            println!(
                "  {}  {:>6.1}  {}",
                point.date,
                point.remaining_points,
                ideal.dimmed()
            );
        }
    }
}

fn category_label(category: StatusCategory) -> ColoredString {
    match category {
        StatusCategory::ToDo => category.label().yellow(),
        StatusCategory::InProgress => category.label().green(),
        StatusCategory::Done => category.label().bright_black(),
    }
}

fn date_range(sprint: &Sprint) -> String {
    let fmt = |d: Option<chrono::DateTime<chrono::Utc>>| {
        d.map(|d| d.date_naive().to_string())
            .unwrap_or_else(|| "?".to_string())
    };
    format!("{} → {}", fmt(sprint.start_date), fmt(sprint.end_date))
}

fn progress_bar(percentage: f64, width: usize) -> String {
    let filled = ((percentage.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(width - filled))
}

// ---------------------------------------------------------------------------
// Capacity, alerts, schedule
// ---------------------------------------------------------------------------

fn handle_capacity(
    sprint_id: u64,
    strategy: Option<&str>,
    tolerance: Option<f64>,
    json_output: bool,
) -> anyhow::Result<()> {
    let settings = Settings::load()?;
    let statuses = settings.engine.status_map()?;
    let store = open_store(&settings)?;

    let mut options = settings.engine.capacity_options()?;
    if let Some(strategy) = strategy {
        options.strategy = strategy.parse()?;
    }
    if let Some(tolerance) = tolerance {
        options.overflow_tolerance_pct = tolerance;
    }

    if settings.team.is_empty() {
        return Err(SprintLensError::ConfigurationError(
            "no team members configured; add [[team]] entries to the config file".to_string(),
        )
        .into());
    }

    let sprint = store.sprint(sprint_id)?;
    let issues = store.sprint_issues(sprint_id)?;
    let items = engine::work_items_from_issues(&issues, &statuses, settings.engine.hours_per_point)?;
    let scores = engine::completion_history(&store.issues()?, &statuses)?;
    debug!(items = items.len(), members = settings.team.len(), "allocating sprint work");

    let allocation = engine::allocate(&settings.team, &items, &options, &scores)?;
    let assessment = engine::assess(&allocation, &items, &scores);
    let plan = CapacityPlan { allocation, assessment };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    print_allocation(&sprint, &plan.allocation);
    print_assessment(&plan);
    Ok(())
}

fn print_assessment(plan: &CapacityPlan) {
    let assessment = &plan.assessment;
    println!();
    println!(
        "  {} {:.0}% utilization, {:.0}% of demand covered",
        "Plan:".bold(),
        assessment.utilization_rate * 100.0,
        assessment.satisfaction_rate * 100.0
    );
    if let Some(efficiency) = assessment.average_efficiency {
        println!("  {} {:.2}", "Efficiency:".bold(), efficiency);
    }
    if assessment.recommendations.is_empty() {
        return;
    }
    println!();
    println!("{}", "Recommendations".bold());
    for recommendation in &assessment.recommendations {
        println!("  {} {}", "→".cyan(), recommendation);
    }
}

fn print_allocation(sprint: &Sprint, allocation: &CapacityAllocation) {
    println!(
        "{}",
        format!("Capacity Plan: {} ({})", sprint.name, allocation.strategy).cyan().bold()
    );
    println!(
        "  {} {:.1}h demand / {:.1}h capacity",
        "Totals:".bold(),
        allocation.total_demand_hours,
        allocation.total_capacity_hours
    );
    println!("  {} {:.2}", "Cost:".bold(), allocation.total_cost);
    println!();

    for member in &allocation.members {
        let utilization = format!("{:.0}%", member.utilization_percentage);
        let utilization = if member.utilization_percentage >= 100.0 {
            utilization.red()
        } else if member.utilization_percentage >= 80.0 {
            utilization.yellow()
        } else {
            utilization.green()
        };
        println!(
            "  {}  {:.1}h / {:.1}h  {}",
            member.member_id.bright_white().bold(),
            member.assigned_hours,
            member.available_hours,
            utilization
        );
        for assignment in &member.assignments {
            println!("      {} {:.1}h", assignment.issue_key, assignment.hours);
        }
    }

    if !allocation.unallocated.is_empty() {
        println!();
        println!(
            "{}",
            format!("Unallocated ({:.1}h)", allocation.unallocated_hours()).yellow().bold()
        );
        for item in &allocation.unallocated {
            println!("  {} {:.1}h", item.issue_key, item.hours);
        }
    }
}

fn handle_alerts(username: &str, days: Option<u32>, json_output: bool) -> anyhow::Result<()> {
    let settings = Settings::load()?;
    let statuses = settings.engine.status_map()?;
    let store = open_store(&settings)?;

    let mut options = settings.engine.alert_options()?;
    if let Some(days) = days {
        options.lookback_days = days;
    }

    let (user, alerts) = alerts_for(&store, username, today(), &statuses, &options)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&alerts)?);
        return Ok(());
    }

    println!("{}", format!("Alerts for {}", user.display_name).cyan().bold());
    println!();
    for alert in &alerts {
        println!("  {} {}", severity_marker(alert), alert.message);
    }

    Ok(())
}

/// Alerts from the cache for a user that must already be known to it.
fn alerts_for(
    store: &Store,
    username: &str,
    today: NaiveDate,
    statuses: &StatusMap,
    options: &AlertOptions,
) -> errors::Result<(User, Vec<AlertResult>)> {
    let user = store.user(username)?;
    let since = today
        .checked_sub_days(Days::new(u64::from(options.lookback_days)))
        .ok_or_else(|| {
            SprintLensError::InvalidInput(format!("cannot look back {} days", options.lookback_days))
        })?;

    let issues = store.issues_assigned_to(&user.username)?;
    let worklogs = store.worklogs_by_author(&user.username, since)?;
    if issues.is_empty() {
        warn!(username = %user.username, "no cached issues for user");
    }

    let alerts = engine::evaluate_alerts(&user.username, today, &issues, &worklogs, statuses, options)?;
    Ok((user, alerts))
}

fn severity_marker(alert: &AlertResult) -> ColoredString {
    match alert.severity {
        Severity::High => "!!".red().bold(),
        Severity::Medium => "! ".yellow().bold(),
        Severity::Low => "· ".blue(),
        Severity::Info => "  ".normal(),
    }
}

fn handle_schedule(username: &str, hours_per_day: Option<f64>, json_output: bool) -> anyhow::Result<()> {
    let settings = Settings::load()?;
    let statuses = settings.engine.status_map()?;
    let store = open_store(&settings)?;

    let mut options = settings.engine.schedule_options()?;
    if let Some(hours) = hours_per_day {
        options.hours_per_day = hours;
    }

    let user = store.user(username)?;
    let issues = store.issues_assigned_to(&user.username)?;
    let schedule = engine::plan_week(&issues, &statuses, &options)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&schedule)?);
        return Ok(());
    }

    print_schedule(username, &schedule);
    Ok(())
}

fn print_schedule(username: &str, schedule: &WeeklySchedule) {
    println!("{}", format!("Weekly Plan for {}", username).cyan().bold());
    println!(
        "  {} {:.1}h of {:.1}h ({:.0}%)",
        "Allocated:".bold(),
        schedule.allocated_hours,
        schedule.available_hours,
        schedule.utilization_percentage
    );
    println!();

    for day in &schedule.days {
        println!("{}", day.day.bold());
        if day.entries.is_empty() {
            println!("  {}", "free".dimmed());
        }
        for entry in &day.entries {
            println!("  {:<14} {:.1}h", entry.issue_key, entry.hours);
        }
    }

    if !schedule.unscheduled.is_empty() {
        println!();
        println!("{}", "Does not fit this week".yellow().bold());
        for entry in &schedule.unscheduled {
            println!("  {:<14} {:.1}h", entry.issue_key, entry.hours);
        }
    }
}

// ---------------------------------------------------------------------------
// Work-log history, user issues, team load, monthly report
// ---------------------------------------------------------------------------

async fn handle_worklogs(username: &str, period: &str, sync: bool, json_output: bool) -> anyhow::Result<()> {
    let period: Period = period.parse()?;
    let settings = Settings::load()?;
    let mut store = open_store(&settings)?;
    let today = today();

    if sync {
        let jira = jira_client(&settings.jira);
        let user = jira.find_user(username).await?;
        store.upsert_user(&user)?;
        sync_user(&jira, &mut store, &settings.jira.project_key, &user.username, period.since(today)?).await?;
    }

    let history = worklog_history_for(&store, username, period, today)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    print_worklog_history(&history);
    Ok(())
}

fn worklog_history_for(
    store: &Store,
    username: &str,
    period: Period,
    today: NaiveDate,
) -> errors::Result<WorklogHistory> {
    let user = store.user(username)?;
    let worklogs = match period.since(today)? {
        Some(since) => store.worklogs_by_author(&user.username, since)?,
        None => store.all_worklogs_by_author(&user.username)?,
    };
    engine::worklog_history(&user.username, period, today, &worklogs)
}

fn print_worklog_history(history: &WorklogHistory) {
    let since = history
        .since
        .map(|d| format!("since {}", d))
        .unwrap_or_else(|| "all time".to_string());
    println!(
        "{}",
        format!("Work Logs for {} ({})", history.username, history.period).cyan().bold()
    );
    println!(
        "  {} {:.2}h in {} logs, {}",
        "Total:".bold(),
        history.total_hours,
        history.total_worklogs,
        since.dimmed()
    );

    if history.worklogs.is_empty() {
        println!();
        println!("{}", "  No work logged in this period".dimmed());
        return;
    }

    println!();
    println!("{}", "By day".bold());
    for (day, hours) in &history.daily_hours {
        println!("  {}  {:>6.2}h", day, hours);
    }

    println!();
    println!("{}", "By issue".bold());
    for (key, hours) in &history.issue_hours {
        println!("  {:<14} {:>6.2}h", key, hours);
    }
}

fn handle_issues(username: &str, json_output: bool) -> anyhow::Result<()> {
    let settings = Settings::load()?;
    let statuses = settings.engine.status_map()?;
    let store = open_store(&settings)?;

    let user = store.user(username)?;
    let issues = store.issues_assigned_to(&user.username)?;
    let summary = engine::user_issue_summary(&user.username, &issues, &statuses)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    print_issue_summary(&user, &summary);
    Ok(())
}

fn print_issue_summary(user: &User, summary: &UserIssueSummary) {
    println!("{}", format!("Open Issues for {}", user.display_name).cyan().bold());
    println!(
        "  {} {} ({:.1} points, {} unestimated)",
        "Issues:".bold(),
        summary.total_issues.to_string().bright_white(),
        summary.total_points,
        summary.unestimated_count
    );

    if summary.issues.is_empty() {
        return;
    }

    println!();
    println!("{}", "Priority".bold());
    for (priority, count) in &summary.priority_distribution {
        println!("  {:<12} {}", priority, count);
    }

    println!();
    println!("{}", "Status".bold());
    for (category, count) in &summary.status_distribution {
        println!("  {:<12} {}", category_label(*category), count);
    }

    println!();
    for issue in &summary.issues {
        let points = issue
            .story_points
            .map(|p| format!("{:.1}", p))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<14} {:<10} {:>5}  {}",
            issue.key.bright_white(),
            issue.priority.as_deref().unwrap_or("None"),
            points,
            issue.summary
        );
    }
}

fn handle_team(sprint_ids: &[u64], members: &[String], json_output: bool) -> anyhow::Result<()> {
    let settings = Settings::load()?;
    let store = open_store(&settings)?;

    let members: Vec<String> = if members.is_empty() {
        settings.team.iter().map(|m| m.id.clone()).collect()
    } else {
        members.to_vec()
    };
    if members.is_empty() {
        return Err(SprintLensError::ConfigurationError(
            "no team members given; pass --member or add [[team]] entries to the config file".to_string(),
        )
        .into());
    }

    let load = team_load_for(&store, sprint_ids, &members)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&load)?);
        return Ok(());
    }

    print_team_load(&load);
    Ok(())
}

/// Requested sprints, or every active cached sprint when none are given.
fn team_load_for(store: &Store, sprint_ids: &[u64], members: &[String]) -> errors::Result<TeamLoad> {
    let sprint_ids: Vec<u64> = if sprint_ids.is_empty() {
        store
            .sprints()?
            .into_iter()
            .filter(|s| s.state == SprintState::Active)
            .map(|s| s.id)
            .collect()
    } else {
        sprint_ids.to_vec()
    };
    if sprint_ids.is_empty() {
        return Err(SprintLensError::InvalidInput(
            "no active sprint cached; pass --sprint or run 'sprintlens sync'".to_string(),
        ));
    }

    let mut sprints = Vec::with_capacity(sprint_ids.len());
    for id in sprint_ids {
        store.sprint(id)?;
        sprints.push((id, store.sprint_issues(id)?));
    }
    engine::team_load(members, &sprints)
}

fn print_team_load(load: &TeamLoad) {
    let ids: Vec<String> = load.sprint_ids.iter().map(|id| id.to_string()).collect();
    println!("{}", format!("Team Load (sprints {})", ids.join(", ")).cyan().bold());
    println!(
        "  {} {} issues, {:.1} points",
        "Totals:".bold(),
        load.total_issues,
        load.total_points
    );
    println!();

    for member in &load.members {
        println!(
            "  {}  {} issues  {:.1} points",
            member.member.bright_white().bold(),
            member.total_issues,
            member.total_points
        );
        for issue in &member.issues {
            let sprints: Vec<String> = issue.sprint_ids.iter().map(|id| id.to_string()).collect();
            println!(
                "      {:<14} {:<14} {}",
                issue.key,
                issue.status,
                format!("sprint {}", sprints.join(", ")).dimmed()
            );
        }
    }
}

async fn handle_monthly(
    month: Option<u32>,
    year: Option<i32>,
    sync: bool,
    html_path: Option<&Path>,
    json_output: bool,
) -> anyhow::Result<()> {
    let settings = Settings::load()?;
    let mut store = open_store(&settings)?;

    let today = today();
    let year = year.unwrap_or_else(|| today.year());
    let month = month.unwrap_or_else(|| today.month());
    let (start, end) = engine::monthly::month_bounds(year, month)?;

    if sync {
        let jira = jira_client(&settings.jira);
        let issues = jira
            .search_with_jql(&monthly_jql(&settings.jira.project_key, start, end), 1000)
            .await?;
        store.upsert_issues(&issues)?;
        store.record_sync(&format!("month:{}-{:02}", year, month))?;
        info!(year, month, issues = issues.len(), "month synced");
    }

    let report = engine::monthly_report(year, month, &store.issues()?)?;

    if let Some(path) = html_path {
        std::fs::write(path, engine::render_html(&report))?;
        if !json_output {
            println!("{} {}", "Wrote".dimmed(), path.display().to_string().bright_white());
            println!();
        }
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_monthly(&report);
    Ok(())
}

fn print_monthly(report: &MonthlyReport) {
    let summary = &report.summary;
    println!("{}", format!("Monthly Report: {}", report.period).cyan().bold());
    println!("  {} {}", "Created:".bold(), summary.total_issues_created);
    println!("  {} {}", "Completed:".bold(), summary.total_issues_completed);
    println!("  {} {:.1}", "Points created:".bold(), summary.total_story_points);
    println!("  {} {:.1}", "Velocity:".bold(), summary.team_velocity);

    if !report.velocity_by_assignee.is_empty() {
        println!();
        println!("{}", "Velocity by assignee".bold());
        for (assignee, points) in &report.velocity_by_assignee {
            println!("  {:<24} {:.1}", assignee, points);
        }
    }

    for (title, issues) in [
        ("Recently created", &report.created_issues),
        ("Recently resolved", &report.resolved_issues),
    ] {
        if issues.is_empty() {
            continue;
        }
        println!();
        println!("{}", title.bold());
        for issue in issues {
            println!(
                "  {}  {:<14} {}",
                issue.at.date_naive().to_string().dimmed(),
                issue.key.bright_white(),
                issue.summary
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Open and config
// ---------------------------------------------------------------------------

fn handle_open(sprint_id: Option<u64>) -> anyhow::Result<()> {
    let settings = Settings::load()?;

    let url = match sprint_id {
        Some(id) => sprint_report_url(&settings.jira, id)?,
        None => board_url(&settings.jira),
    };

    println!("{} {}", "Opening:".dimmed(), url.bright_white());
    open::that(&url)?;
    Ok(())
}

fn board_url(jira: &JiraConfig) -> String {
    match jira.board_id {
        Some(board_id) => format!("{}/secure/RapidBoard.jspa?rapidView={}", jira.url, board_id),
        None => format!("{}/jira/software/projects/{}/boards", jira.url, jira.project_key),
    }
}

fn sprint_report_url(jira: &JiraConfig, sprint_id: u64) -> errors::Result<String> {
    let board_id = jira.board_id.ok_or_else(|| {
        SprintLensError::ConfigurationError(
            "opening a sprint report needs jira.board_id".to_string(),
        )
    })?;
    Ok(format!(
        "{}/secure/RapidBoard.jspa?rapidView={}&view=reporting&chart=sprintRetrospective&sprint={}",
        jira.url, board_id, sprint_id
    ))
}

fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}***{}", head, tail)
}

async fn handle_config(action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let settings = Settings::load()?;

            println!("{}", "Current Configuration".cyan().bold());
            println!();

            println!("{}", "[jira]".bold());
            println!("  {} {}", "url:".dimmed(), settings.jira.url.bright_white());
            println!("  {} {}", "email:".dimmed(), settings.jira.email.bright_white());
            println!("  {} {}", "auth_method:".dimmed(), settings.jira.auth_method.label().bright_white());
            println!("  {} {}", "token:".dimmed(), mask_token(settings.jira.auth_method.token()).yellow());
            println!("  {} {}", "project_key:".dimmed(), settings.jira.project_key.bright_white());
            if let Some(board_id) = settings.jira.board_id {
                println!("  {} {}", "board_id:".dimmed(), board_id.to_string().bright_white());
            }
            println!(
                "  {} {}",
                "story_point_fields:".dimmed(),
                settings.jira.story_point_fields.join(", ").bright_white()
            );

            println!();
            println!("{}", "[store]".bold());
            println!("  {} {}", "path:".dimmed(), settings.store_path()?.display().to_string().bright_white());

            let engine = &settings.engine;
            println!();
            println!("{}", "[engine]".bold());
            println!("  {} {}", "default_category:".dimmed(), engine.default_category.bright_white());
            println!("  {} {}", "capacity_strategy:".dimmed(), engine.capacity_strategy.bright_white());
            println!("  {} {}%", "overflow_tolerance_pct:".dimmed(), engine.overflow_tolerance_pct);
            println!("  {} {}", "default_hourly_rate:".dimmed(), engine.default_hourly_rate);
            println!("  {} {}", "alert_lookback_days:".dimmed(), engine.alert_lookback_days);
            println!("  {} {}", "due_warning_days:".dimmed(), engine.due_warning_days);
            println!("  {} {}", "hours_per_point:".dimmed(), engine.hours_per_point);
            println!("  {} {}", "hours_per_day:".dimmed(), engine.hours_per_day);
            println!("  {} {}", "work_days:".dimmed(), engine.work_days.join(", "));
            for (status, category) in &engine.status_categories {
                println!("  {} {} = {}", "status:".dimmed(), status, category.bright_white());
            }

            if !settings.team.is_empty() {
                println!();
                println!("{}", "[[team]]".bold());
                for member in &settings.team {
                    let rate = member
                        .hourly_rate
                        .map(|r| format!(" @ {}/h", r))
                        .unwrap_or_default();
                    println!("  {} {}h{}", member.id.bright_white(), member.available_hours, rate.dimmed());
                }
            }

            Ok(())
        }

        ConfigAction::Set { key, value } => {
            let mut settings = Settings::load()?;
            settings.set_value(&key, &value)?;
            settings.save()?;

            let shown = if key == "jira.token" { mask_token(&value) } else { value };
            println!("{}", format!("✓ Updated {} to: {}", key, shown).green().bold());
            println!();
            println!("{}", "Configuration saved successfully!".green());

            Ok(())
        }

        ConfigAction::Validate => {
            println!("{}", "Validating configuration...".cyan().bold());
            println!();

            let settings = Settings::load()?;

            print!("{}", "  Checking engine settings... ".dimmed());
            std::io::Write::flush(&mut std::io::stdout())?;
            let engine_check = settings
                .engine
                .status_map()
                .and_then(|_| settings.engine.capacity_options())
                .and_then(|_| settings.engine.alert_options())
                .and_then(|_| settings.engine.schedule_options());
            match engine_check {
                Ok(_) => println!("{}", "✓".green().bold()),
                Err(e) => {
                    println!("{}", "✗".red().bold());
                    return Err(e.into());
                }
            }

            print!("{}", "  Testing Jira connection... ".dimmed());
            std::io::Write::flush(&mut std::io::stdout())?;
            match jira_client(&settings.jira).myself().await {
                Ok(user) => {
                    println!("{} {}", "✓".green().bold(), user.username.dimmed());
                }
                Err(e) => {
                    println!("{}", "✗".red().bold());
                    return Err(e.into());
                }
            }

            print!("{}", "  Opening local cache... ".dimmed());
            std::io::Write::flush(&mut std::io::stdout())?;
            open_store(&settings)?;
            println!("{}", "✓".green().bold());

            println!();
            println!("{}", "✓ All validations passed!".green().bold());

            Ok(())
        }

        ConfigAction::Path => {
            let config_path = Settings::config_path()?;
            println!("{}", config_path.display());
            Ok(())
        }
    }
}
