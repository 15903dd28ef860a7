//! Daily CLI - Command-line interface for Synheart Daily
//!
//! Commands:
//! - summarize: Build one record per date from row files
//! - day: Single-date query over hourly rows
//! - distribution: Heart-rate five-number summary per date
//! - validate: Parse rows and report what would be dropped or flagged
//! - config: Print the effective configuration as TOML

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use synheart_daily::diagnostics::{DiagnosticCounts, Diagnostics};
use synheart_daily::parser::ReadingParser;
use synheart_daily::schema::{parse_json_rows, parse_ndjson_rows, DailyFeedRow, HourlyRow, ManualEntry};
use synheart_daily::timestamp::{parse_calendar_date, TimestampNormalizer};
use synheart_daily::{
    ComputeError, ConfigError, DailyPipeline, DailySummary, DateRange, InMemorySource,
    PipelineConfig, SummaryEncoder, DAILY_VERSION,
};

/// Daily - per-day summaries from wearable telemetry
#[derive(Parser)]
#[command(name = "daily")]
#[command(author = "Synheart AI Inc")]
#[command(version = DAILY_VERSION)]
#[command(about = "Reconcile wearable rows into one record per calendar date", long_about = None)]
struct Cli {
    /// Log level
    #[arg(long, global = true, default_value = "warn")]
    log_level: LogLevel,

    /// Log output format (logs go to stderr)
    #[arg(long, global = true, default_value = "compact")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build one record per date in a range
    Summarize {
        /// Hourly rows file (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Pre-aggregated daily feed file
        #[arg(long)]
        daily: Option<PathBuf>,

        /// Manual entries file
        #[arg(long)]
        manual: Option<PathBuf>,

        /// First date (YYYY-MM-DD or M/D/YYYY)
        #[arg(long, value_parser = parse_date)]
        from: NaiveDate,

        /// Last date, inclusive
        #[arg(long, value_parser = parse_date)]
        to: NaiveDate,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,

        /// Pipeline configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Rows belonging to one date, with the parsed count
    Day {
        /// Hourly rows file (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Date to query
        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Pipeline configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Heart-rate five-number summary for each date in a range
    Distribution {
        /// Hourly rows file (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long, value_parser = parse_date)]
        from: NaiveDate,

        #[arg(long, value_parser = parse_date)]
        to: NaiveDate,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Pipeline configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Parse hourly rows and report problems
    Validate {
        /// Hourly rows file (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,

        /// Pipeline configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Configuration file to load and validate
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one row per line)
    Ndjson,
    /// JSON array of rows
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one day record per line)
    Ndjson,
    /// Compact JSON payload
    Json,
    /// Pretty-printed JSON payload
    JsonPretty,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
    Compact,
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    parse_calendar_date(s).map_err(|e| e.to_string())
}

fn init_logging(level: LogLevel, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("synheart_daily={}", level.as_filter())));

    let layer = match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_writer(io::stderr)
            .with_target(true)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(io::stderr)
            .with_target(false)
            .boxed(),
    };

    tracing_subscriber::registry().with(filter).with(layer).init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level, cli.log_format);

    match run(cli.command) {
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

fn run(command: Commands) -> Result<(), DailyCliError> {
    match command {
        Commands::Summarize {
            input,
            daily,
            manual,
            from,
            to,
            output,
            input_format,
            output_format,
            config,
        } => cmd_summarize(SummarizeArgs {
            input: &input,
            daily: daily.as_deref(),
            manual: manual.as_deref(),
            range: DateRange::new(from, to)?,
            output: &output,
            input_format,
            output_format,
            config: config.as_deref(),
        }),
        Commands::Day {
            input,
            date,
            input_format,
            config,
        } => cmd_day(&input, date, &input_format, config.as_deref()),
        Commands::Distribution {
            input,
            from,
            to,
            input_format,
            config,
        } => cmd_distribution(&input, DateRange::new(from, to)?, &input_format, config.as_deref()),
        Commands::Validate {
            input,
            input_format,
            json,
            config,
        } => cmd_validate(&input, &input_format, json, config.as_deref()),
        Commands::Config { config } => cmd_config(config.as_deref()),
    }
}

struct SummarizeArgs<'a> {
    input: &'a Path,
    daily: Option<&'a Path>,
    manual: Option<&'a Path>,
    range: DateRange,
    output: &'a Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    config: Option<&'a Path>,
}

fn cmd_summarize(args: SummarizeArgs<'_>) -> Result<(), DailyCliError> {
    let pipeline = DailyPipeline::new(load_config(args.config)?)?;

    let hourly: Vec<HourlyRow> = read_rows(args.input, &args.input_format)?;
    let daily: Vec<DailyFeedRow> = match args.daily {
        Some(path) => read_rows(path, &args.input_format)?,
        None => Vec::new(),
    };
    let manual: Vec<ManualEntry> = match args.manual {
        Some(path) => read_rows(path, &args.input_format)?,
        None => Vec::new(),
    };

    if hourly.is_empty() && daily.is_empty() && manual.is_empty() {
        return Err(DailyCliError::NoRows);
    }

    let source = InMemorySource::new(hourly, daily, manual);
    let summary = pipeline.summarize_source(&source, args.range)?;

    let output_data = format_output(&summary, &args.output_format)?;
    write_output(args.output, &output_data)
}

fn cmd_day(
    input: &Path,
    date: NaiveDate,
    input_format: &InputFormat,
    config: Option<&Path>,
) -> Result<(), DailyCliError> {
    let pipeline = DailyPipeline::new(load_config(config)?)?;
    let rows: Vec<HourlyRow> = read_rows(input, input_format)?;

    let query = pipeline.query_day(&rows, date);
    println!("{}", serde_json::to_string_pretty(&query)?);
    Ok(())
}

fn cmd_distribution(
    input: &Path,
    range: DateRange,
    input_format: &InputFormat,
    config: Option<&Path>,
) -> Result<(), DailyCliError> {
    let pipeline = DailyPipeline::new(load_config(config)?)?;
    let rows: Vec<HourlyRow> = read_rows(input, input_format)?;

    for point in pipeline.distribution_series(&rows, range) {
        println!("{}", serde_json::to_string(&point)?);
    }
    Ok(())
}

fn cmd_validate(
    input: &Path,
    input_format: &InputFormat,
    json: bool,
    config: Option<&Path>,
) -> Result<(), DailyCliError> {
    let config = load_config(config)?;
    let parser = ReadingParser::new(TimestampNormalizer::new(config.default_offset()?));
    let rows: Vec<HourlyRow> = read_rows(input, input_format)?;

    let mut diagnostics = Diagnostics::new();
    let readings = parser.parse_rows(&rows, &mut diagnostics);
    let counts = diagnostics.counts().clone();

    let report = ValidationReport {
        total_rows: rows.len(),
        readings: readings.len(),
        problems: counts.unparseable_timestamps
            + counts.malformed_payloads
            + counts.invalid_intervals
            + counts.unplaceable_rows,
        diagnostics: counts,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total rows:             {}", report.total_rows);
        println!("Readings:               {}", report.readings);
        println!("Unparseable timestamps: {}", report.diagnostics.unparseable_timestamps);
        println!("Malformed payloads:     {}", report.diagnostics.malformed_payloads);
        println!("Invalid intervals:      {}", report.diagnostics.invalid_intervals);
        println!("Unplaceable rows:       {}", report.diagnostics.unplaceable_rows);
    }

    if report.problems > 0 {
        return Err(DailyCliError::ValidationFailed(report.problems));
    }
    Ok(())
}

fn cmd_config(config: Option<&Path>) -> Result<(), DailyCliError> {
    let config = load_config(config)?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, ConfigError> {
    match path {
        Some(path) => PipelineConfig::load_from_file(path),
        None => Ok(PipelineConfig::default()),
    }
}

fn read_input(path: &Path) -> Result<String, io::Error> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        fs::read_to_string(path)
    }
}

fn read_rows<T: DeserializeOwned>(
    path: &Path,
    input_format: &InputFormat,
) -> Result<Vec<T>, DailyCliError> {
    let data = read_input(path)?;
    let rows = match input_format {
        InputFormat::Ndjson => parse_ndjson_rows(&data)?,
        InputFormat::Json => parse_json_rows(&data)?,
    };
    Ok(rows)
}

fn write_output(path: &Path, data: &str) -> Result<(), DailyCliError> {
    if path.to_string_lossy() == "-" {
        print!("{}", data);
    } else {
        fs::write(path, data)?;
    }
    Ok(())
}

fn format_output(summary: &DailySummary, format: &OutputFormat) -> Result<String, DailyCliError> {
    let encoder = SummaryEncoder::new();
    let output = match format {
        OutputFormat::Ndjson => encoder.encode_to_ndjson(summary)?,
        OutputFormat::Json => {
            let mut line = serde_json::to_string(&encoder.encode(summary))?;
            line.push('\n');
            line
        }
        OutputFormat::JsonPretty => {
            let mut pretty = encoder.encode_to_json(summary)?;
            pretty.push('\n');
            pretty
        }
    };
    Ok(output)
}

// Error types

#[derive(Debug)]
enum DailyCliError {
    Io(io::Error),
    Compute(ComputeError),
    Config(ConfigError),
    Json(serde_json::Error),
    NoRows,
    ValidationFailed(usize),
}

impl From<io::Error> for DailyCliError {
    fn from(e: io::Error) -> Self {
        DailyCliError::Io(e)
    }
}

impl From<ComputeError> for DailyCliError {
    fn from(e: ComputeError) -> Self {
        DailyCliError::Compute(e)
    }
}

impl From<ConfigError> for DailyCliError {
    fn from(e: ConfigError) -> Self {
        DailyCliError::Config(e)
    }
}

impl From<serde_json::Error> for DailyCliError {
    fn from(e: serde_json::Error) -> Self {
        DailyCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<DailyCliError> for CliError {
    fn from(e: DailyCliError) -> Self {
        match e {
            DailyCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            DailyCliError::Compute(ComputeError::InvalidRange { from, to }) => CliError {
                code: "INVALID_RANGE".to_string(),
                message: format!("{from} is after {to}"),
                hint: Some("Pass --from on or before --to".to_string()),
            },
            DailyCliError::Compute(ComputeError::Config(e)) | DailyCliError::Config(e) => {
                CliError {
                    code: "CONFIG_ERROR".to_string(),
                    message: e.to_string(),
                    hint: Some("Run 'daily config' to see the expected layout".to_string()),
                }
            }
            DailyCliError::Compute(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check --input-format and the row layout".to_string()),
            },
            DailyCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            DailyCliError::NoRows => CliError {
                code: "NO_ROWS".to_string(),
                message: "No rows found in input".to_string(),
                hint: Some("Ensure input files are not empty".to_string()),
            },
            DailyCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} problems found while parsing rows", count),
                hint: Some("Run 'daily validate --json' for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_rows: usize,
    readings: usize,
    problems: usize,
    diagnostics: DiagnosticCounts,
}
