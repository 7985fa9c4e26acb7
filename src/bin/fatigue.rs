//! Fatigue CLI - Command-line interface for Fatigue Sense
//!
//! Commands:
//! - replay: Drive a recorded event stream through a session (NDJSON in, NDJSON out)
//! - policy: Print the intervention threshold and time-cap tables
//! - doctor: Diagnose configuration and a persisted store

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

use fatigue_sense::fatigue::baseline::{
    BaselineStore, LATENCY_BASELINE_KEY, VARIANCE_BASELINE_KEY,
};
use fatigue_sense::policy::{critical_threshold, time_cap_minutes};
use fatigue_sense::replay::{self, ReplayRecord};
use fatigue_sense::session::{SessionSnapshot, SESSION_SNAPSHOT_KEY};
use fatigue_sense::storage::{FileStore, MemoryStore, SharedStore};
use fatigue_sense::{EngineConfig, FatigueError, Intensity, ENGINE_VERSION, PRODUCER_NAME};

/// Fatigue - On-device fatigue inference from keystroke and pointer telemetry
#[derive(Parser)]
#[command(name = "fatigue")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Replay and inspect fatigue telemetry sessions", long_about = None)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded event stream through a session
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Persist baselines and session state in this JSON file
        #[arg(long)]
        store: Option<PathBuf>,

        /// Engine configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Wall-clock time of offset 0 (RFC 3339); defaults to now
        #[arg(long)]
        origin: Option<String>,
    },

    /// Print intervention thresholds and time caps per intensity
    Policy {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and a persisted store
    Doctor {
        /// Store file to inspect
        #[arg(long)]
        store: Option<PathBuf>,

        /// Engine configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Forget the calibrated baselines in the store before checking it
        #[arg(long, requires = "store")]
        reset_baselines: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), FatigueCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            output_format,
            store,
            config,
            origin,
        } => cmd_replay(
            &input,
            &output,
            output_format,
            store.as_deref(),
            config.as_deref(),
            origin.as_deref(),
        ),

        Commands::Policy { json } => cmd_policy(json),

        Commands::Doctor {
            store,
            config,
            reset_baselines,
            json,
        } => cmd_doctor(store.as_deref(), config.as_deref(), reset_baselines, json),
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, FatigueCliError> {
    match path {
        Some(path) => Ok(EngineConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(EngineConfig::default()),
    }
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    output_format: OutputFormat,
    store: Option<&Path>,
    config: Option<&Path>,
    origin: Option<&str>,
) -> Result<(), FatigueCliError> {
    let config = load_config(config)?;

    let origin = match origin {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map_err(|e| FatigueCliError::BadOrigin(format!("{}: {}", raw, e)))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let events = replay::parse_ndjson(&input_data)?;
    if events.is_empty() {
        return Err(FatigueCliError::NoEvents);
    }

    let store: SharedStore = match store {
        Some(path) => Rc::new(FileStore::new(path)),
        None => MemoryStore::shared(),
    };

    let records = replay::run(&events, store, &config, origin)?;
    let output_data = format_output(&records, &output_format)?;

    if output.to_string_lossy() == "-" {
        let mut stdout = io::stdout();
        write!(stdout, "{}", output_data)?;
        stdout.flush()?;
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_policy(json: bool) -> Result<(), FatigueCliError> {
    let rows: Vec<PolicyRow> = Intensity::all()
        .map(|intensity| PolicyRow {
            intensity: intensity.level(),
            critical_threshold: critical_threshold(intensity.level()),
            time_cap_minutes: time_cap_minutes(intensity.level()),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!("Intensity  Threshold  Time cap");
        println!("=========  =========  ========");
        for row in &rows {
            println!(
                "{:>9}  {:>9}  {:>5} min",
                row.intensity, row.critical_threshold, row.time_cap_minutes
            );
        }
    }

    Ok(())
}

fn cmd_doctor(
    store: Option<&Path>,
    config: Option<&Path>,
    reset_baselines: bool,
    json: bool,
) -> Result<(), FatigueCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Fatigue Sense version {}", ENGINE_VERSION),
    });

    let config = match load_config(config) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "{}ms windows, smoothing over {}, time cap {}",
                    config.window_size_ms,
                    config.smoothing_window,
                    if config.time_cap_enabled { "on" } else { "off" }
                ),
            });
            config
        }
        Err(e) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: CliError::from(e).message,
            });
            EngineConfig::default()
        }
    };

    if let Some(path) = store {
        if reset_baselines {
            BaselineStore::new(Rc::new(FileStore::new(path)), &config).clear();
            checks.push(DoctorCheck {
                name: "baselines_reset".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Baselines reset to {:.1}ms/{:.1}ms",
                    config.default_latency_baseline_ms, config.default_variance_baseline_ms
                ),
            });
        }
        if path.exists() {
            checks.extend(store_checks(&FileStore::new(path)));
        } else {
            checks.push(DoctorCheck {
                name: "store".to_string(),
                status: CheckStatus::Warning,
                message: "Store file does not exist; defaults will be used".to_string(),
            });
        }
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (replay from - ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: ENGINE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Fatigue Doctor Report");
        println!("=====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(FatigueCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn store_checks(store: &FileStore) -> Vec<DoctorCheck> {
    let entries = match store.entries() {
        Ok(entries) => entries,
        Err(e) => {
            return vec![DoctorCheck {
                name: "store".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot read {}: {}", store.path().display(), e),
            }]
        }
    };

    let mut checks = Vec::new();
    for (name, key) in [
        ("latency_baseline", LATENCY_BASELINE_KEY),
        ("variance_baseline", VARIANCE_BASELINE_KEY),
    ] {
        let check = match entries.get(key).map(|raw| raw.parse::<f64>()) {
            Some(Ok(value)) if value.is_finite() && value > 0.0 => DoctorCheck {
                name: name.to_string(),
                status: CheckStatus::Ok,
                message: format!("{:.1}ms", value),
            },
            Some(_) => DoctorCheck {
                name: name.to_string(),
                status: CheckStatus::Warning,
                message: "Stored value is unusable; the default will be used".to_string(),
            },
            None => DoctorCheck {
                name: name.to_string(),
                status: CheckStatus::Ok,
                message: "Not calibrated yet (default in use)".to_string(),
            },
        };
        checks.push(check);
    }

    if let Some(raw) = entries.get(SESSION_SNAPSHOT_KEY) {
        let check = match serde_json::from_str::<SessionSnapshot>(raw) {
            Ok(snapshot) => DoctorCheck {
                name: "session".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "{} at intensity {}, {}s elapsed",
                    snapshot.status, snapshot.intensity, snapshot.elapsed_secs
                ),
            },
            Err(e) => DoctorCheck {
                name: "session".to_string(),
                status: CheckStatus::Warning,
                message: format!("Snapshot is corrupt and will be ignored: {}", e),
            },
        };
        checks.push(check);
    }

    checks
}

// Helper functions

fn format_output(
    records: &[ReplayRecord],
    format: &OutputFormat,
) -> Result<String, FatigueCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for record in records {
                lines.push(serde_json::to_string(record)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(records)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(records)?),
    }
}

// Error types

#[derive(Debug)]
enum FatigueCliError {
    Io(io::Error),
    Engine(FatigueError),
    Json(serde_json::Error),
    BadOrigin(String),
    NoEvents,
    DoctorFailed,
}

impl From<io::Error> for FatigueCliError {
    fn from(e: io::Error) -> Self {
        FatigueCliError::Io(e)
    }
}

impl From<FatigueError> for FatigueCliError {
    fn from(e: FatigueError) -> Self {
        FatigueCliError::Engine(e)
    }
}

impl From<serde_json::Error> for FatigueCliError {
    fn from(e: serde_json::Error) -> Self {
        FatigueCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FatigueCliError> for CliError {
    fn from(e: FatigueCliError) -> Self {
        match e {
            FatigueCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FatigueCliError::Engine(e) => {
                let (code, hint) = match &e {
                    FatigueError::InvalidIntensity(_) => {
                        ("INVALID_INTENSITY", "Use an intensity from 1 to 10")
                    }
                    FatigueError::InvalidConfig(_) => {
                        ("INVALID_CONFIG", "Check the config file values")
                    }
                    FatigueError::Storage(_) => {
                        ("STORAGE_ERROR", "Run 'fatigue doctor --store <file>'")
                    }
                    FatigueError::Json(_) => ("JSON_ERROR", "Check JSON syntax"),
                    FatigueError::InvalidTransition { .. } => (
                        "INVALID_TRANSITION",
                        "Check the order of session actions in the recording",
                    ),
                    FatigueError::Replay(_) => (
                        "REPLAY_ERROR",
                        "Each line must be one event with a non-decreasing at_ms",
                    ),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            FatigueCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            FatigueCliError::BadOrigin(msg) => CliError {
                code: "BAD_ORIGIN".to_string(),
                message: msg,
                hint: Some("Use an RFC 3339 timestamp, e.g. 2024-03-04T09:00:00Z".to_string()),
            },
            FatigueCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            FatigueCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct PolicyRow {
    intensity: u8,
    critical_threshold: u8,
    time_cap_minutes: u32,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
