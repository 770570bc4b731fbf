use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use clap::{Args, Parser, Subcommand, ValueEnum};
use courtbook_core::{
    load_courtbook_config, BookingError, ConfigError, ControllerError, CourtbookConfig, MonthDay,
    ResourceKind, RunReport, RunState, TriggerScheduler, TriggerTime,
};
use serde::Serialize;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub mod commands;

use commands::book::{book, BookArgs};

pub const DEFAULT_CONFIG: &str = "configs/courtbook.toml";

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid booking request: {0}")]
    Booking(#[from] BookingError),
    #[error("{0}")]
    Controller(#[from] ControllerError),
    #[error("booking run ended {0}")]
    RunFailed(RunState),
    #[error("required resource missing: {0}")]
    MissingResource(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Timed court booking from the command line", long_about = None)]
pub struct Cli {
    /// Path to courtbook.toml; built-in defaults apply when the default file is absent
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Debug-level logs on stderr
    #[arg(long, short)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Lists court types, their booking pages, courts and hours
    Courts(CourtsArgs),
    /// Shows when a trigger time would fire without booking anything
    Plan(PlanArgs),
    /// Waits for the trigger time and books the requested slots
    Book(BookArgs),
    /// Verifies the configuration and the browser installation
    Check,
}

#[derive(Args, Debug)]
pub struct CourtsArgs {
    /// Restrict to one court type
    #[arg(long)]
    pub kind: Option<String>,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Daily trigger instant (HH:MM:SS)
    #[arg(long, default_value = "08:00:00")]
    pub trigger: String,
    /// Booking date (MM/DD) to resolve against today
    #[arg(long)]
    pub date: Option<String>,
}

/// Installs the stderr log subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Courts(args) => {
            let catalog = court_catalog(args)?;
            render(&catalog, cli.format)?;
        }
        Commands::Plan(args) => {
            let preview = plan_preview(args, &TriggerScheduler::default())?;
            render(&preview, cli.format)?;
        }
        Commands::Book(args) => {
            let config = load_config(cli.config.as_deref())?;
            let report = book(config, args, cli.format == OutputFormat::Json)?;
            render(&report, cli.format)?;
            run_outcome(report.state)?;
        }
        Commands::Check => {
            let report = health_check(cli.config.as_deref());
            render(&report, cli.format)?;
            if report
                .iter()
                .any(|entry| matches!(entry.status, CheckStatus::Error))
            {
                return Err(AppError::MissingResource(
                    "one or more checks failed".to_string(),
                ));
            }
        }
    }

    Ok(())
}

/// An explicit path must exist; the default path may be absent.
pub fn load_config(path: Option<&Path>) -> Result<CourtbookConfig> {
    match path {
        Some(path) => Ok(load_courtbook_config(path)?),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            Ok(load_courtbook_config(DEFAULT_CONFIG)?)
        }
        None => Ok(CourtbookConfig::default()),
    }
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug, Serialize)]
pub struct CourtCatalog {
    pub kinds: Vec<KindEntry>,
}

#[derive(Debug, Serialize)]
pub struct KindEntry {
    pub kind: ResourceKind,
    pub name: String,
    pub endpoint: String,
    pub courts: Vec<String>,
    pub hours: Vec<String>,
}

fn court_catalog(args: &CourtsArgs) -> Result<CourtCatalog> {
    let kinds = match &args.kind {
        Some(kind) => vec![kind.parse::<ResourceKind>()?],
        None => ResourceKind::ALL.to_vec(),
    };
    let kinds = kinds
        .into_iter()
        .map(|kind| KindEntry {
            kind,
            name: kind.display_name().to_string(),
            endpoint: kind.endpoint().to_string(),
            courts: kind.courts().iter().map(|court| court.to_string()).collect(),
            hours: kind
                .time_options()
                .iter()
                .map(ToString::to_string)
                .collect(),
        })
        .collect();
    Ok(CourtCatalog { kinds })
}

impl DisplayFallback for CourtCatalog {
    fn display(&self) -> String {
        let mut lines = Vec::new();
        for entry in &self.kinds {
            lines.push(format!("{} ({})", entry.kind, entry.name));
            lines.push(format!("  page:   {}", entry.endpoint));
            lines.push(format!("  courts: {}", entry.courts.join(", ")));
            lines.push(format!("  hours:  {}", entry.hours.join(" ")));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct TriggerPreview {
    pub trigger: TriggerTime,
    pub now: NaiveDateTime,
    pub target: NaiveDateTime,
    pub wait_seconds: f64,
    pub rolled_over: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_date: Option<NaiveDate>,
    #[serde(skip)]
    pub lines: Vec<String>,
}

fn plan_preview(args: &PlanArgs, scheduler: &TriggerScheduler) -> Result<TriggerPreview> {
    let trigger = args.trigger.parse::<TriggerTime>()?;
    let plan = scheduler.plan(trigger);
    let booking_date = args
        .date
        .as_deref()
        .map(|date| date.parse::<MonthDay>())
        .transpose()?
        .map(|date| date.next_occurrence(plan.now.date()));
    Ok(TriggerPreview {
        trigger,
        now: plan.now,
        target: plan.target,
        wait_seconds: plan.wait.as_secs_f64(),
        rolled_over: plan.rolled_over,
        booking_date,
        lines: plan.describe(),
    })
}

impl DisplayFallback for TriggerPreview {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "trigger {} (now {})",
            self.trigger,
            self.now.format("%Y-%m-%d %H:%M:%S")
        )];
        lines.extend(self.lines.iter().cloned());
        if let Some(date) = self.booking_date {
            lines.push(format!("booking date resolves to {}", date.format("%Y-%m-%d")));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for RunReport {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "run {} {} after {}s",
            self.run_id,
            self.state,
            (self.finished_at - self.started_at).num_seconds()
        )];
        for slot in &self.outcomes {
            lines.push(format!("  {slot}"));
        }
        if let Some(err) = &self.error {
            lines.push(format!("  reason: {err}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct HealthEntry {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub enum CheckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

impl HealthEntry {
    fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Ok,
            detail: detail.into(),
        }
    }

    fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Warn,
            detail: detail.into(),
        }
    }

    fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Error,
            detail: detail.into(),
        }
    }
}

impl DisplayFallback for Vec<HealthEntry> {
    fn display(&self) -> String {
        self.iter()
            .map(|entry| format!("[{}] {}: {}", entry.status, entry.name, entry.detail))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

const CHROMIUM_BINARIES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
];

fn health_check(path: Option<&Path>) -> Vec<HealthEntry> {
    let mut entries = Vec::new();
    let config = match load_config(path) {
        Ok(config) => {
            let source = path.unwrap_or(Path::new(DEFAULT_CONFIG));
            if source.exists() {
                entries.push(HealthEntry::ok("config", source.display().to_string()));
            } else {
                entries.push(HealthEntry::warn(
                    "config",
                    "file absent; built-in defaults in use",
                ));
            }
            config
        }
        Err(err) => {
            entries.push(HealthEntry::error("config", err.to_string()));
            return entries;
        }
    };

    entries.push(check_executable(config.browser.executable_path.as_deref()));

    if let Some(dir) = config.browser.user_data_dir() {
        entries.push(match std::fs::metadata(&dir) {
            Ok(meta) if meta.is_dir() => HealthEntry::ok("profile", dir.display().to_string()),
            Ok(_) => HealthEntry::error(
                "profile",
                format!("{} is not a directory", dir.display()),
            ),
            Err(_) => HealthEntry::warn(
                "profile",
                format!("{} will be created on first launch", dir.display()),
            ),
        });
    }

    if config.selectors.submit_text.trim().is_empty() {
        entries.push(HealthEntry::warn(
            "selectors",
            "submit_text is empty; any primary button will be submitted",
        ));
    } else {
        entries.push(HealthEntry::ok("selectors", "page vocabulary loaded"));
    }
    entries
}

fn check_executable(configured: Option<&str>) -> HealthEntry {
    if let Some(path) = configured {
        let path = Path::new(path);
        return if path.is_file() {
            HealthEntry::ok("chromium", path.display().to_string())
        } else {
            HealthEntry::error("chromium", format!("{} not found", path.display()))
        };
    }
    let found = std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .flat_map(|dir| CHROMIUM_BINARIES.iter().map(move |name| dir.join(name)))
            .find(|candidate| candidate.is_file())
    });
    match found {
        Some(path) => HealthEntry::ok("chromium", path.display().to_string()),
        None => HealthEntry::error(
            "chromium",
            format!("none of {} on PATH", CHROMIUM_BINARIES.join(", ")),
        ),
    }
}

/// A cancelled run is an operator decision, so only a failed run is an error.
fn run_outcome(state: RunState) -> Result<()> {
    match state {
        RunState::Completed | RunState::Cancelled => Ok(()),
        other => Err(AppError::RunFailed(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;

    use courtbook_core::FixedClock;
    use tempfile::TempDir;

    #[test]
    fn catalog_lists_every_kind_by_default() {
        let catalog = court_catalog(&CourtsArgs { kind: None }).unwrap();
        assert_eq!(catalog.kinds.len(), 2);
        assert_eq!(catalog.kinds[0].courts.len(), 6);
        assert!(!catalog.kinds[0].hours.contains(&"12:00".to_string()));
        assert!(catalog.display().contains("FB南网球场"));

        let tennis = court_catalog(&CourtsArgs {
            kind: Some("tennis".into()),
        })
        .unwrap();
        assert_eq!(tennis.kinds.len(), 1);
        assert_eq!(tennis.kinds[0].hours.first().map(String::as_str), Some("08:00"));
    }

    #[test]
    fn unknown_kind_is_a_booking_error() {
        let err = court_catalog(&CourtsArgs {
            kind: Some("squash".into()),
        })
        .unwrap_err();
        assert!(matches!(err, AppError::Booking(BookingError::Configuration(_))));
    }

    #[test]
    fn plan_preview_rolls_over_and_resolves_the_date() {
        let now = NaiveDate::from_ymd_opt(2025, 12, 31)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let scheduler = TriggerScheduler::new(Arc::new(FixedClock(now)));
        let preview = plan_preview(
            &PlanArgs {
                trigger: "08:00:00".into(),
                date: Some("01/02".into()),
            },
            &scheduler,
        )
        .unwrap();
        assert!(preview.rolled_over);
        assert_eq!(preview.wait_seconds, 23.0 * 3600.0);
        assert_eq!(preview.booking_date, NaiveDate::from_ymd_opt(2026, 1, 2));

        let json = serde_json::to_value(&preview).unwrap();
        assert_eq!(json["trigger"], "08:00:00");
        assert!(json.get("lines").is_none());
    }

    #[test]
    fn explicit_config_must_exist() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("courtbook.toml");
        assert!(matches!(
            load_config(Some(&missing)),
            Err(AppError::Config(ConfigError::Io { .. }))
        ));

        fs::write(&missing, "[timing]\nrelease_delay_seconds = 0\n").unwrap();
        let config = load_config(Some(&missing)).unwrap();
        assert_eq!(config.timing.release_delay().as_secs(), 0);
    }

    #[test]
    fn health_check_reports_a_broken_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("courtbook.toml");
        fs::write(&path, "[browser\n").unwrap();
        let report = health_check(Some(&path));
        assert_eq!(report.len(), 1);
        assert!(matches!(report[0].status, CheckStatus::Error));
    }

    #[test]
    fn configured_executable_must_be_a_file() {
        let temp = TempDir::new().unwrap();
        let entry = check_executable(temp.path().to_str());
        assert!(matches!(entry.status, CheckStatus::Error));

        let binary = temp.path().join("chromium");
        fs::write(&binary, "").unwrap();
        let entry = check_executable(binary.to_str());
        assert!(matches!(entry.status, CheckStatus::Ok));
    }

    #[test]
    fn cancelled_run_is_not_an_error() {
        assert!(run_outcome(RunState::Completed).is_ok());
        assert!(run_outcome(RunState::Cancelled).is_ok());

        let err = run_outcome(RunState::Failed).unwrap_err();
        assert!(matches!(err, AppError::RunFailed(RunState::Failed)));
        assert_eq!(err.to_string(), "booking run ended failed");
    }
}
