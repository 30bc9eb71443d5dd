//! CLI entry point for the stop elevation collector.
//!
//! Provides subcommands for collecting elevations from the lookup API,
//! rebuilding a table from archived responses, and checking which source
//! coordinates still lack an elevation.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use stop_elevations::{
    archive::ResponseArchive,
    config::{ApiCredentials, PipelineConfig},
    fetch::{
        BasicClient, HttpClient,
        auth::{ApiKey, UrlParam},
    },
    integrity::missing_elevations,
    pipeline::{Pipeline, Profile},
    report::{RunReport, append_report},
    storage::{CoordinateSource, CsvStore, ResultSink, S3Sink},
};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "stop_elevations")]
#[command(about = "Collect elevations for transit stops and route shapes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct SinkArgs {
    /// Directory holding the CSV tables
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    /// Optional: S3 bucket to publish the result table to instead of the data dir
    #[arg(long)]
    s3_bucket: Option<String>,

    /// Key prefix for the S3 object
    #[arg(long, default_value = "elevations")]
    s3_prefix: String,

    /// Gzip the S3 object
    #[arg(long, default_value_t = false)]
    gzip: bool,

    /// Optional: CSV file to append the run report to
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect elevations from the lookup API and replace the result table
    Collect {
        /// What to collect: stops (stops + depots) or shapes
        #[arg(short, long, default_value = "stops")]
        profile: Profile,

        /// Elevation lookup endpoint (overrides ELEVATION_ENDPOINT)
        #[arg(long)]
        endpoint: Option<String>,

        /// Optional: directory to keep raw API responses in
        #[arg(long)]
        archive_dir: Option<PathBuf>,

        #[command(flatten)]
        sink: SinkArgs,
    },
    /// Rebuild the result table from archived responses, without calling the API
    Rebuild {
        #[arg(short, long, default_value = "stops")]
        profile: Profile,

        /// Directory of archived raw API responses
        #[arg(long)]
        archive_dir: PathBuf,

        #[command(flatten)]
        sink: SinkArgs,
    },
    /// List source coordinates that have no elevation in the result table
    Check {
        #[arg(short, long, default_value = "stops")]
        profile: Profile,

        /// Directory holding the CSV tables
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/stop_elevations.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("stop_elevations.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let mut config = PipelineConfig::from_env();

    match cli.command {
        Commands::Collect {
            profile,
            endpoint,
            archive_dir,
            sink,
        } => {
            if let Some(endpoint) = endpoint {
                config.endpoint = endpoint;
            }
            info!(
                endpoint = %config.endpoint,
                size_budget = config.size_budget,
                hard_ceiling = config.hard_ceiling,
                max_retries = config.max_retries,
                "Starting elevation collection"
            );

            let http = http_client(&config)?;
            let store = CsvStore::new(&sink.data_dir);
            let result_sink = result_sink(&sink).await;

            let mut pipeline = Pipeline::new(config, store, result_sink, http)?;
            if let Some(dir) = archive_dir {
                pipeline = pipeline.with_archive(ResponseArchive::open(dir)?);
            }

            let report = pipeline.run(profile).await?;
            finish(&sink, &report)?;
        }
        Commands::Rebuild {
            profile,
            archive_dir,
            sink,
        } => {
            let http = http_client(&config)?;
            let store = CsvStore::new(&sink.data_dir);
            let result_sink = result_sink(&sink).await;
            let archive = ResponseArchive::open(&archive_dir)?;

            let pipeline = Pipeline::new(config, store, result_sink, http)?;
            let report = pipeline.rebuild(profile, &archive).await?;
            finish(&sink, &report)?;
        }
        Commands::Check { profile, data_dir } => {
            let store = CsvStore::new(&data_dir);

            let mut sources = Vec::new();
            for table in profile.tables() {
                sources.extend(store.select_all(&table).await?);
            }
            let results = store
                .load_elevations(profile.destination())
                .with_context(|| format!("loading {} table", profile.destination()))?;

            let missing = missing_elevations(&sources, &results);
            if missing.is_empty() {
                info!(profile = %profile, coordinates = sources.len(), "No elevations missing");
            } else {
                warn!(profile = %profile, missing = missing.len(), "Coordinates without elevation");
                for id in &missing {
                    warn!(id = %id, "Missing elevation");
                }
            }
        }
    }

    Ok(())
}

/// Builds the elevation API transport, adding the API key from the
/// environment if one is configured.
fn http_client(config: &PipelineConfig) -> Result<Box<dyn HttpClient>> {
    let basic = BasicClient::new(config.request_timeout)?;

    let client: Box<dyn HttpClient> = match ApiCredentials::from_env() {
        ApiCredentials::None => Box::new(basic),
        ApiCredentials::Header { name, key } => Box::new(ApiKey::new(basic, &name, &key)?),
        ApiCredentials::QueryParam { name, key } => Box::new(UrlParam::new(basic, name, key)),
    };
    Ok(client)
}

async fn result_sink(args: &SinkArgs) -> Box<dyn ResultSink> {
    match &args.s3_bucket {
        Some(bucket) => {
            info!(bucket = %bucket, prefix = %args.s3_prefix, gzip = args.gzip, "S3 upload enabled");
            Box::new(S3Sink::from_env(bucket, &args.s3_prefix, args.gzip).await)
        }
        None => Box::new(CsvStore::new(&args.data_dir)),
    }
}

fn finish(args: &SinkArgs, report: &RunReport) -> Result<()> {
    if report.batches_dropped > 0 {
        warn!(
            dropped = report.batches_dropped,
            attempted = report.batches_attempted,
            "Some batches were dropped; their coordinates have no elevation"
        );
    }
    if let Some(path) = &args.report {
        append_report(path, report)
            .with_context(|| format!("appending run report to {}", path.display()))?;
    }
    info!(records = report.records_persisted, "Done");
    Ok(())
}
