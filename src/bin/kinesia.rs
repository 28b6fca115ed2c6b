//! Kinesia CLI - Command-line interface for the Kinesia analysis engine
//!
//! Commands:
//! - run: Process streaming frame records from stdin (one JSON per line)
//! - analyze: Process a recorded session file in batch mode
//! - doctor: Diagnose engine configuration and environment

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use kinesia_core::{
    AnalysisResult, ClinicalSummary, EngineConfig, EngineError, RawFrameRecord, SessionAnalyzer,
    ENGINE_VERSION, PRODUCER_NAME,
};

/// Kinesia - Real-time multi-sensor analysis engine for VR therapy sessions
#[derive(Parser)]
#[command(name = "kinesia")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Analyze VR therapy sensor streams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process streaming frame records from stdin (one JSON per line)
    Run {
        /// Engine configuration file (JSON); defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Emit clinical summaries for all sessions at end of input
        #[arg(long, default_value = "true")]
        summaries: bool,

        /// Flush output after each record
        #[arg(long, default_value = "true")]
        flush: bool,
    },

    /// Process a recorded session file in batch mode
    Analyze {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Engine configuration file (JSON); defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Diagnose engine configuration and environment
    Doctor {
        /// Engine configuration file to check (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

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
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("kinesia: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), KinesiaCliError> {
    match cli.command {
        Commands::Run {
            config,
            output_format,
            summaries,
            flush,
        } => cmd_run(config.as_deref(), output_format, summaries, flush),

        Commands::Analyze {
            input,
            output,
            config,
            output_format,
        } => cmd_analyze(&input, &output, config.as_deref(), output_format),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, KinesiaCliError> {
    let config = match path {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };
    Ok(config)
}

fn cmd_run(
    config: Option<&Path>,
    output_format: OutputFormat,
    summaries: bool,
    flush: bool,
) -> Result<(), KinesiaCliError> {
    let mut analyzer = SessionAnalyzer::new(load_config(config)?)?;
    let mut seen_sessions: HashSet<String> = HashSet::new();

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut results: Vec<AnalysisResult> = Vec::new();
    let streaming = matches!(output_format, OutputFormat::Ndjson);

    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        // A bad frame never takes down the stream: the rejection goes to
        // stderr and later frames (and all pending summaries) still flow.
        let raw: RawFrameRecord = match serde_json::from_str(trimmed) {
            Ok(raw) => raw,
            Err(e) => {
                eprintln!("kinesia: skipping unparseable frame: {}", e);
                continue;
            }
        };

        // Sessions are opened on first sight; re-sending a closed session's
        // id is still an error surfaced by the engine.
        if seen_sessions.insert(raw.session_id.clone()) {
            analyzer.open_session(&raw.session_id, &raw.participant_id);
        }

        let result = match analyzer.ingest(&raw) {
            Ok(result) => result,
            Err(e) => {
                eprintln!("kinesia: frame rejected: {}", e);
                continue;
            }
        };
        if streaming {
            writeln!(stdout, "{}", serde_json::to_string(&result)?)?;
            if flush {
                stdout.flush()?;
            }
        } else {
            results.push(result);
        }
    }

    let mut closing: Vec<ClinicalSummary> = Vec::new();
    if summaries {
        for session_id in &seen_sessions {
            if let Ok(summary) = analyzer.close_session(session_id) {
                closing.push(summary);
            }
        }
        closing.sort_by(|a, b| a.session_id.cmp(&b.session_id));
    }

    if streaming {
        for summary in &closing {
            writeln!(stdout, "{}", serde_json::to_string(summary)?)?;
        }
        stdout.flush()?;
    } else {
        let report = BatchOutput {
            results,
            summaries: closing,
        };
        write!(stdout, "{}", format_output(&report, &output_format)?)?;
    }

    Ok(())
}

fn cmd_analyze(
    input: &PathBuf,
    output: &PathBuf,
    config: Option<&Path>,
    output_format: OutputFormat,
) -> Result<(), KinesiaCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let mut analyzer = SessionAnalyzer::new(load_config(config)?)?;
    let mut seen_sessions: HashSet<String> = HashSet::new();
    let mut results: Vec<AnalysisResult> = Vec::new();

    let mut frames = 0usize;
    for line in input_data.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        frames += 1;

        // Same rejection policy as streaming mode: report and keep going.
        let raw: RawFrameRecord = match serde_json::from_str(trimmed) {
            Ok(raw) => raw,
            Err(e) => {
                eprintln!("kinesia: skipping unparseable frame: {}", e);
                continue;
            }
        };
        if seen_sessions.insert(raw.session_id.clone()) {
            analyzer.open_session(&raw.session_id, &raw.participant_id);
        }
        match analyzer.ingest(&raw) {
            Ok(result) => results.push(result),
            Err(e) => eprintln!("kinesia: frame rejected: {}", e),
        }
    }

    if frames == 0 {
        return Err(KinesiaCliError::NoFrames);
    }

    let mut summaries: Vec<ClinicalSummary> = Vec::new();
    for session_id in &seen_sessions {
        if let Ok(summary) = analyzer.close_session(session_id) {
            summaries.push(summary);
        }
    }
    summaries.sort_by(|a, b| a.session_id.cmp(&b.session_id));

    let report = BatchOutput { results, summaries };
    let output_data = format_output(&report, &output_format)?;

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), KinesiaCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Kinesia version {}", ENGINE_VERSION),
    });

    // Check configuration if provided, otherwise the defaults
    match load_config(config) {
        Ok(engine_config) => match engine_config.validate() {
            Ok(()) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Configuration valid (horizon {}s, window {} samples)",
                        engine_config.forecast_horizon_s, engine_config.window_capacity
                    ),
                });
            }
            Err(e) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Invalid configuration: {}", e),
                });
            }
        },
        Err(e) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot load configuration: {}", e),
            });
        }
    }

    // Check stdin mode (for streaming)
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
            message: "stdin is a pipe (streaming mode ready)".to_string(),
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
        println!("Kinesia Doctor Report");
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

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(KinesiaCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper types

#[derive(Serialize)]
struct BatchOutput {
    results: Vec<AnalysisResult>,
    summaries: Vec<ClinicalSummary>,
}

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
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

fn format_output(report: &BatchOutput, format: &OutputFormat) -> Result<String, KinesiaCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for result in &report.results {
                lines.push(serde_json::to_string(result)?);
            }
            for summary in &report.summaries {
                lines.push(serde_json::to_string(summary)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(report)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(report)?),
    }
}

#[derive(Debug)]
enum KinesiaCliError {
    Io(io::Error),
    Engine(EngineError),
    Json(serde_json::Error),
    NoFrames,
    DoctorFailed,
}

impl std::fmt::Display for KinesiaCliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KinesiaCliError::Io(e) => write!(f, "io error: {}", e),
            KinesiaCliError::Engine(e) => write!(f, "engine error: {}", e),
            KinesiaCliError::Json(e) => write!(f, "json error: {}", e),
            KinesiaCliError::NoFrames => write!(f, "no frame records in input"),
            KinesiaCliError::DoctorFailed => write!(f, "doctor checks failed"),
        }
    }
}

impl From<io::Error> for KinesiaCliError {
    fn from(e: io::Error) -> Self {
        KinesiaCliError::Io(e)
    }
}

impl From<EngineError> for KinesiaCliError {
    fn from(e: EngineError) -> Self {
        KinesiaCliError::Engine(e)
    }
}

impl From<serde_json::Error> for KinesiaCliError {
    fn from(e: serde_json::Error) -> Self {
        KinesiaCliError::Json(e)
    }
}
