//! Motion Flux CLI - Command-line interface for Motion Flux
//!
//! Commands:
//! - extract: Compute features from sample windows (stateless)
//! - session: Create, flush or show capture sessions
//! - ingest: Append sample windows to a session
//! - features: List stored features of a session or athlete
//! - doctor: Diagnose configuration and storage

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use motion_flux::config::PipelineConfig;
use motion_flux::{
    extract_features, DeviceDescriptor, NewSession, SqliteStore, WearableError,
    WearablePipeline, FEATURE_SCHEMA_VERSION, FLUX_VERSION, PRODUCER_NAME,
};

/// Motion Flux - Wearable IMU feature extraction
#[derive(Parser)]
#[command(name = "motion-flux")]
#[command(author = "Synheart AI Inc")]
#[command(version = FLUX_VERSION)]
#[command(about = "Turn wearable IMU windows into landing-mechanics features", long_about = None)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file for sessions and features
    #[arg(long, global = true, env = "MOTION_FLUX_DB")]
    db: Option<PathBuf>,

    /// Log progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute features from sample windows without storing anything
    Extract {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Manage capture sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Append sample windows to a session
    Ingest {
        /// Session identifier
        session_id: String,

        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Output format for the created features
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// List stored features in window order
    Features {
        /// Session identifier
        #[arg(required_unless_present = "athlete")]
        session_id: Option<String>,

        /// List across all sessions of an athlete instead
        #[arg(long, conflicts_with = "session_id")]
        athlete: Option<String>,

        /// Only the most recent N windows
        #[arg(long)]
        last: Option<usize>,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Diagnose configuration and storage
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Open a new session
    Create {
        #[arg(long)]
        athlete: String,

        #[arg(long)]
        drill: String,

        /// Device id (repeatable)
        #[arg(long = "device")]
        device_ids: Vec<String>,

        /// JSON file with an array of device descriptors to register first
        #[arg(long)]
        devices_file: Option<PathBuf>,

        #[arg(long)]
        surface: Option<String>,

        #[arg(long)]
        temp_f: Option<f64>,

        #[arg(long)]
        humidity_pct: Option<f64>,
    },

    /// Mark a session ended
    Flush { session_id: String },

    /// Print a session record
    Show { session_id: String },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array
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
    let level = if verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn run(cli: Cli) -> Result<(), FluxCliError> {
    let config = load_config(cli.config.as_deref(), cli.db)?;

    match cli.command {
        Commands::Extract {
            input,
            output,
            output_format,
        } => cmd_extract(&input, &output, &output_format),

        Commands::Session { action } => cmd_session(config, action),

        Commands::Ingest {
            session_id,
            input,
            output_format,
        } => cmd_ingest(config, &session_id, &input, &output_format),

        Commands::Features {
            session_id,
            athlete,
            last,
            output_format,
        } => cmd_features(config, session_id, athlete, last, &output_format),

        Commands::Doctor { json } => cmd_doctor(&config, json),
    }
}

fn load_config(path: Option<&Path>, db: Option<PathBuf>) -> Result<PipelineConfig, FluxCliError> {
    let mut config = match path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::from_env()?,
    };
    if db.is_some() {
        config.database_path = db;
    }
    Ok(config)
}

/// Sessions only make sense against a database that outlives the process
fn open_persistent(config: PipelineConfig) -> Result<WearablePipeline, FluxCliError> {
    if config.database_path.is_none() {
        return Err(FluxCliError::NoDatabase);
    }
    Ok(WearablePipeline::open(config)?)
}

fn cmd_extract(
    input: &Path,
    output: &Path,
    output_format: &OutputFormat,
) -> Result<(), FluxCliError> {
    let input_data = read_input(input)?;
    let features = extract_features(&input_data)?;
    write_output(output, &format_output(&features, output_format)?)
}

fn cmd_session(config: PipelineConfig, action: SessionAction) -> Result<(), FluxCliError> {
    let pipeline = open_persistent(config)?;

    let session = match action {
        SessionAction::Create {
            athlete,
            drill,
            device_ids,
            devices_file,
            surface,
            temp_f,
            humidity_pct,
        } => {
            let devices: Vec<DeviceDescriptor> = match devices_file {
                Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
                None => Vec::new(),
            };
            pipeline.start_session(NewSession {
                athlete_id: athlete,
                drill_type: drill,
                device_ids,
                devices,
                surface,
                temp_f,
                humidity_pct,
            })?
        }
        SessionAction::Flush { session_id } => pipeline.flush(&session_id)?,
        SessionAction::Show { session_id } => pipeline.get_session(&session_id)?,
    };

    println!("{}", serde_json::to_string_pretty(&session)?);
    Ok(())
}

fn cmd_ingest(
    config: PipelineConfig,
    session_id: &str,
    input: &Path,
    output_format: &OutputFormat,
) -> Result<(), FluxCliError> {
    let pipeline = open_persistent(config)?;
    let input_data = read_input(input)?;

    let outcome = pipeline.ingest_raw(session_id, &input_data)?;
    if outcome.windows_skipped > 0 {
        log::warn!(
            "{} of {} windows produced no feature",
            outcome.windows_skipped,
            outcome.windows_received
        );
    }

    print!("{}", format_output(&outcome.features, output_format)?);
    Ok(())
}

fn cmd_features(
    config: PipelineConfig,
    session_id: Option<String>,
    athlete: Option<String>,
    last: Option<usize>,
    output_format: &OutputFormat,
) -> Result<(), FluxCliError> {
    let pipeline = open_persistent(config)?;

    let records = match (athlete, session_id) {
        (Some(athlete), _) => pipeline.recent_athlete_features(&athlete, last)?,
        (None, Some(session_id)) => match last {
            Some(n) => pipeline.recent_features(&session_id, Some(n))?,
            None => pipeline.list_features(&session_id)?,
        },
        (None, None) => return Err(FluxCliError::MissingTarget),
    };

    print!("{}", format_output(&records, output_format)?);
    Ok(())
}

fn cmd_doctor(config: &PipelineConfig, json: bool) -> Result<(), FluxCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "flux_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Motion Flux version {}", FLUX_VERSION),
    });

    checks.push(DoctorCheck {
        name: "schema_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Feature schema: {}", FEATURE_SCHEMA_VERSION),
    });

    checks.push(if config.enabled {
        DoctorCheck {
            name: "pipeline_gate".to_string(),
            status: CheckStatus::Ok,
            message: "Pipeline enabled".to_string(),
        }
    } else {
        DoctorCheck {
            name: "pipeline_gate".to_string(),
            status: CheckStatus::Warning,
            message: "Pipeline disabled; every operation will be rejected".to_string(),
        }
    });

    let db_check = match &config.database_path {
        Some(path) => match SqliteStore::open(path) {
            Ok(_) => DoctorCheck {
                name: "database".to_string(),
                status: CheckStatus::Ok,
                message: format!("Database ready at {}", path.display()),
            },
            Err(e) => DoctorCheck {
                name: "database".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot open database {}: {}", path.display(), e),
            },
        },
        None => DoctorCheck {
            name: "database".to_string(),
            status: CheckStatus::Warning,
            message: "No database configured; only `extract` is available".to_string(),
        },
    };
    checks.push(db_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: FLUX_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Motion Flux Doctor Report");
        println!("=========================");
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

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(FluxCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn read_input(input: &Path) -> Result<String, FluxCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), FluxCliError> {
    if output.to_string_lossy() == "-" {
        print!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn format_output<T: Serialize>(records: &[T], format: &OutputFormat) -> Result<String, FluxCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut out = String::new();
            for record in records {
                out.push_str(&serde_json::to_string(record)?);
                out.push('\n');
            }
            Ok(out)
        }
        OutputFormat::Json => Ok(serde_json::to_string(records)? + "\n"),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(records)? + "\n"),
    }
}

// Error types

#[derive(Debug)]
enum FluxCliError {
    Io(io::Error),
    Pipeline(WearableError),
    Json(serde_json::Error),
    NoDatabase,
    MissingTarget,
    DoctorFailed,
}

impl From<io::Error> for FluxCliError {
    fn from(e: io::Error) -> Self {
        FluxCliError::Io(e)
    }
}

impl From<WearableError> for FluxCliError {
    fn from(e: WearableError) -> Self {
        FluxCliError::Pipeline(e)
    }
}

impl From<serde_json::Error> for FluxCliError {
    fn from(e: serde_json::Error) -> Self {
        FluxCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(code: &str, message: String, hint: &str) -> Self {
        CliError {
            code: code.to_string(),
            message,
            hint: Some(hint.to_string()),
        }
    }
}

impl From<FluxCliError> for CliError {
    fn from(e: FluxCliError) -> Self {
        match e {
            FluxCliError::Io(e) => {
                CliError::new("IO_ERROR", e.to_string(), "Check file paths and permissions")
            }
            FluxCliError::Json(e) => CliError::new("JSON_ERROR", e.to_string(), "Check JSON syntax"),
            FluxCliError::NoDatabase => CliError::new(
                "NO_DATABASE",
                "No database configured".to_string(),
                "Pass --db or set MOTION_FLUX_DB",
            ),
            FluxCliError::MissingTarget => CliError::new(
                "MISSING_TARGET",
                "No session or athlete given".to_string(),
                "Pass a session id or --athlete",
            ),
            FluxCliError::DoctorFailed => CliError::new(
                "DOCTOR_FAILED",
                "One or more health checks failed".to_string(),
                "Review the doctor report for details",
            ),
            FluxCliError::Pipeline(e) => {
                let message = e.to_string();
                match e {
                    WearableError::FeatureDisabled => CliError::new(
                        "FEATURE_DISABLED",
                        message,
                        "Set MOTION_FLUX_ENABLED=true or enable it in the config file",
                    ),
                    WearableError::SessionNotFound(_) => CliError::new(
                        "SESSION_NOT_FOUND",
                        message,
                        "Create the session first with 'motion-flux session create'",
                    ),
                    WearableError::SessionClosed(_) => CliError::new(
                        "SESSION_CLOSED",
                        message,
                        "Start a new session for further captures",
                    ),
                    WearableError::InvalidPayload(_) | WearableError::JsonError(_) => {
                        CliError::new(
                            "PARSE_ERROR",
                            message,
                            "Send an array of windows, {\"windows\": [...]}, {\"samples\": [...]} or NDJSON",
                        )
                    }
                    WearableError::Config(_) => {
                        CliError::new("CONFIG_ERROR", message, "Check the configuration file")
                    }
                    WearableError::Database(_) | WearableError::Storage(_) => {
                        CliError::new("STORAGE_ERROR", message, "Run 'motion-flux doctor'")
                    }
                }
            }
        }
    }
}

// Report types

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
