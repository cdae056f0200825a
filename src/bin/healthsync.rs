//! healthsync CLI - Command-line interface for healthsync
//!
//! Commands:
//! - normalize: Convert a raw metric document into the upload body
//! - collect: Run an aggregation session over a snapshot
//! - upload: Collect, normalize and upload a snapshot
//! - validate: Check an upload body against the wire contract
//! - doctor: Diagnose configuration and connectivity settings
//! - schema: Describe the upload wire schema

use clap::{Args, Parser, Subcommand};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use healthsync::config::DEFAULT_CONFIG_FILE;
use healthsync::normalizer::FIELD_MAP;
use healthsync::{
    json_schema, normalize_to_json, AggregationSession, CanonicalHealthRecord, CliOverrides,
    Difficulty, RawMetricBag, RecordEncoder, SessionReport, SourceRegistry, SyncConfig, SyncError,
    SyncPipeline, UploadClient, CLIENT_NAME, HEALTHSYNC_VERSION, WIRE_SCHEMA_ID,
};

/// healthsync - Collect and upload daily health metrics
#[derive(Parser)]
#[command(name = "healthsync")]
#[command(version = HEALTHSYNC_VERSION)]
#[command(about = "Normalize and upload daily health metrics", long_about = None)]
struct Cli {
    /// Config file (defaults to ./healthsync.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a raw metric document into the upload body
    Normalize {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        #[command(flatten)]
        record: RecordArgs,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },

    /// Run an aggregation session over a snapshot and print the bag and report
    Collect {
        /// Snapshot file path (use - for stdin)
        #[arg(short, long)]
        snapshot: PathBuf,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Collect, normalize and upload a snapshot
    Upload {
        /// Snapshot file path (use - for stdin)
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Aggregation server base URL
        #[arg(long)]
        server_url: Option<String>,

        #[command(flatten)]
        record: RecordArgs,

        #[command(flatten)]
        session: SessionArgs,

        /// Build the record without uploading it
        #[arg(long)]
        dry_run: bool,
    },

    /// Check an upload body against the wire contract
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and connectivity settings
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Describe the upload wire schema
    Schema {
        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Args)]
struct RecordArgs {
    /// User identifier; the server assigns one when empty
    #[arg(long)]
    user_id: Option<String>,

    /// Record date (YYYY-MM-DD), defaults to today
    #[arg(long)]
    date: Option<String>,

    /// low, medium or high (하, 중, 상 also accepted)
    #[arg(long, value_parser = parse_difficulty)]
    difficulty: Option<Difficulty>,

    /// Session length in minutes
    #[arg(long)]
    duration: Option<u32>,
}

#[derive(Args)]
struct SessionArgs {
    /// Per-source timeout in milliseconds (0 = none)
    #[arg(long)]
    source_timeout_ms: Option<u64>,

    /// Session deadline in milliseconds (0 = none)
    #[arg(long)]
    deadline_ms: Option<u64>,
}

fn parse_difficulty(s: &str) -> Result<Difficulty, String> {
    s.parse().map_err(|e: SyncError| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(verbose)
        .init();
}

async fn run(cli: Cli) -> Result<(), HealthsyncCliError> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Normalize {
            input,
            output,
            record,
            pretty,
        } => {
            let config = load_config(config_path, &record, None, None)?;
            cmd_normalize(&input, &output, &config, record.date.as_deref(), pretty)
        }

        Commands::Collect { snapshot, session } => {
            let config = load_config(config_path, &RecordArgs::none(), Some(&session), None)?;
            cmd_collect(&snapshot, &config).await
        }

        Commands::Upload {
            snapshot,
            server_url,
            record,
            session,
            dry_run,
        } => {
            let config = load_config(config_path, &record, Some(&session), server_url)?;
            cmd_upload(&snapshot, &config, record.date.as_deref(), dry_run).await
        }

        Commands::Validate { input, json } => cmd_validate(&input, json),

        Commands::Doctor { json } => cmd_doctor(config_path, json),

        Commands::Schema { json_schema } => cmd_schema(json_schema),
    }
}

impl RecordArgs {
    fn none() -> Self {
        Self {
            user_id: None,
            date: None,
            difficulty: None,
            duration: None,
        }
    }
}

fn load_config(
    path: Option<&Path>,
    record: &RecordArgs,
    session: Option<&SessionArgs>,
    server_url: Option<String>,
) -> Result<SyncConfig, HealthsyncCliError> {
    let mut config = SyncConfig::load(path)?;
    config.apply_overrides(&CliOverrides {
        server_url,
        user_id: record.user_id.clone(),
        difficulty: record.difficulty,
        duration_min: record.duration,
        source_timeout_ms: session.and_then(|s| s.source_timeout_ms),
        deadline_ms: session.and_then(|s| s.deadline_ms),
    });
    Ok(config)
}

fn cmd_normalize(
    input: &Path,
    output: &Path,
    config: &SyncConfig,
    date: Option<&str>,
    pretty: bool,
) -> Result<(), HealthsyncCliError> {
    let input_data = read_input(input)?;
    let record_config = config.record_config(date)?;
    let body = normalize_to_json(&input_data, &record_config, pretty)?;

    if output.to_string_lossy() == "-" {
        println!("{}", body);
    } else {
        fs::write(output, body + "\n")?;
    }

    Ok(())
}

async fn cmd_collect(snapshot: &Path, config: &SyncConfig) -> Result<(), HealthsyncCliError> {
    let registry = SourceRegistry::from_snapshot_json(&read_input(snapshot)?)?;
    let session = AggregationSession::with_policy(registry, config.session_policy());
    let (bag, report) = session.collect_with_report().await;

    let output = CollectOutput {
        bag: &bag,
        report: &report,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

async fn cmd_upload(
    snapshot: &Path,
    config: &SyncConfig,
    date: Option<&str>,
    dry_run: bool,
) -> Result<(), HealthsyncCliError> {
    let registry = SourceRegistry::from_snapshot_json(&read_input(snapshot)?)?;
    let record_config = config.record_config(date)?;
    let pipeline = SyncPipeline::from_config(config)?.dry_run(dry_run);

    let report = pipeline.run(registry, &record_config).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    match report.outcome {
        None => Ok(()),
        Some(outcome) if outcome.is_success() => Ok(()),
        Some(outcome) => Err(HealthsyncCliError::UploadFailed(outcome.to_string())),
    }
}

fn cmd_validate(input: &Path, json: bool) -> Result<(), HealthsyncCliError> {
    let input_data = read_input(input)?;

    let problems = match serde_json::from_str::<CanonicalHealthRecord>(&input_data) {
        Ok(record) => RecordEncoder::problems(&record),
        Err(e) => vec![e.to_string()],
    };

    let report = ValidationReport {
        schema: WIRE_SCHEMA_ID.to_string(),
        valid: problems.is_empty(),
        problems,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Schema: {}", report.schema);
        println!("Valid:  {}", if report.valid { "yes" } else { "no" });

        if !report.problems.is_empty() {
            println!("\nProblems:");
            for problem in &report.problems {
                println!("  - {}", problem);
            }
        }
    }

    if report.valid {
        Ok(())
    } else {
        Err(HealthsyncCliError::ValidationFailed(report.problems.len()))
    }
}

fn cmd_doctor(config_path: Option<&Path>, json: bool) -> Result<(), HealthsyncCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("healthsync version {}", HEALTHSYNC_VERSION),
    });

    let source = match config_path {
        Some(path) => path.display().to_string(),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => DEFAULT_CONFIG_FILE.to_string(),
        None => "built-in defaults".to_string(),
    };

    match SyncConfig::load(config_path) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!("Loaded from {}", source),
            });

            match UploadClient::from_config(&config) {
                Ok(client) => checks.push(DoctorCheck {
                    name: "endpoint".to_string(),
                    status: CheckStatus::Ok,
                    message: client.endpoint().to_string(),
                }),
                Err(e) => checks.push(DoctorCheck {
                    name: "endpoint".to_string(),
                    status: CheckStatus::Error,
                    message: e.to_string(),
                }),
            }

            checks.push(if config.record.user_id.is_empty() {
                DoctorCheck {
                    name: "user_id".to_string(),
                    status: CheckStatus::Warning,
                    message: "No user id configured; the server will assign one".to_string(),
                }
            } else {
                DoctorCheck {
                    name: "user_id".to_string(),
                    status: CheckStatus::Ok,
                    message: config.record.user_id.clone(),
                }
            });

            checks.push(DoctorCheck {
                name: "auth".to_string(),
                status: CheckStatus::Ok,
                message: if config.server.auth_token.is_some() {
                    "Bearer token configured".to_string()
                } else {
                    "No auth token configured".to_string()
                },
            });

            let policy = config.session_policy();
            checks.push(DoctorCheck {
                name: "session".to_string(),
                status: if policy.deadline.is_none() && policy.source_timeout.is_none() {
                    CheckStatus::Warning
                } else {
                    CheckStatus::Ok
                },
                message: format!(
                    "source timeout {}, deadline {}",
                    describe_limit(policy.source_timeout),
                    describe_limit(policy.deadline)
                ),
            });
        }
        Err(e) => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Error,
            message: format!("Cannot load {}: {}", source, e),
        }),
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
            message: "stdin is a pipe (input with -i - ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        client: CLIENT_NAME.to_string(),
        version: HEALTHSYNC_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("healthsync Doctor Report");
        println!("========================");
        println!("Client:  {}", report.client);
        println!("Version: {}", report.version);
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
        Err(HealthsyncCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(as_json_schema: bool) -> Result<(), HealthsyncCliError> {
    if as_json_schema {
        println!("{}", serde_json::to_string_pretty(&json_schema())?);
        return Ok(());
    }

    println!("Upload Schema: {}", WIRE_SCHEMA_ID);
    println!();
    println!("- user_id: string (empty lets the server assign one)");
    println!("- date: YYYY-MM-DD");
    println!("- difficulty: low | medium | high");
    println!("- duration: integer minutes");
    println!("- raw_json: {} numeric fields, every one always present:", FIELD_MAP.len());
    for mapping in FIELD_MAP.iter() {
        match mapping.source {
            Some(metric) => println!(
                "  - {:<20} {:<8} from {} ({})",
                mapping.canonical,
                mapping.unit,
                metric.raw_name(),
                metric.raw_unit()
            ),
            None => println!("  - {:<20} {:<8} always 0", mapping.canonical, mapping.unit),
        }
    }

    Ok(())
}

// Helper functions

fn read_input(input: &Path) -> Result<String, HealthsyncCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn describe_limit(limit: Option<std::time::Duration>) -> String {
    match limit {
        Some(d) => format!("{}ms", d.as_millis()),
        None => "none".to_string(),
    }
}

// Error types

#[derive(Debug)]
enum HealthsyncCliError {
    Io(io::Error),
    Sync(SyncError),
    Json(serde_json::Error),
    ValidationFailed(usize),
    UploadFailed(String),
    DoctorFailed,
}

impl From<io::Error> for HealthsyncCliError {
    fn from(e: io::Error) -> Self {
        HealthsyncCliError::Io(e)
    }
}

impl From<SyncError> for HealthsyncCliError {
    fn from(e: SyncError) -> Self {
        HealthsyncCliError::Sync(e)
    }
}

impl From<serde_json::Error> for HealthsyncCliError {
    fn from(e: serde_json::Error) -> Self {
        HealthsyncCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<HealthsyncCliError> for CliError {
    fn from(e: HealthsyncCliError) -> Self {
        match e {
            HealthsyncCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            HealthsyncCliError::Sync(e) => {
                let (code, hint) = match &e {
                    SyncError::ConfigError(_) | SyncError::IoError { .. } => {
                        ("CONFIG_ERROR", "Run 'healthsync doctor' to inspect the configuration")
                    }
                    SyncError::InvalidDate(_) => ("INVALID_DATE", "Use the YYYY-MM-DD format"),
                    SyncError::InvalidDifficulty(_) => {
                        ("INVALID_DIFFICULTY", "Use low, medium or high")
                    }
                    SyncError::ClientError(_) => {
                        ("CLIENT_ERROR", "Check the server URL and TLS setup")
                    }
                    _ => ("PARSE_ERROR", "Ensure input is a JSON object keyed by metric name"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            HealthsyncCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            HealthsyncCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} problems found", count),
                hint: Some("Run 'healthsync schema' for the expected shape".to_string()),
            },
            HealthsyncCliError::UploadFailed(msg) => CliError {
                code: "UPLOAD_FAILED".to_string(),
                message: msg,
                hint: Some("Retry later or rerun with --verbose for the server response".to_string()),
            },
            HealthsyncCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct CollectOutput<'a> {
    bag: &'a RawMetricBag,
    report: &'a SessionReport,
}

#[derive(serde::Serialize)]
struct ValidationReport {
    schema: String,
    valid: bool,
    problems: Vec<String>,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    client: String,
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
