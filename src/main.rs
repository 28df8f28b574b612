//! CLI entry point for the live metro pipeline.
//!
//! Provides subcommands for collecting telemetry snapshots and for
//! transforming them into the live view and the delay history.

use anyhow::Result;
use clap::{Parser, Subcommand};
use metro_live::arrival::ArrivalNormalizer;
use metro_live::channel::{Publisher, Subscriber};
use metro_live::config::Config;
use metro_live::store::{CsvTimetableSource, DelayExporter, SqliteStore};
use metro_live::telemetry::{BasicClient, TelemetrySource};
use metro_live::view::ViewHandle;
use metro_live::worker::{CollectorWorker, TransformWorker};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "metro_live")]
#[command(about = "Live metro telemetry pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the telemetry API and publish snapshots over the channel
    Collect {
        /// Seconds between poll cycles
        #[arg(short, long, default_value_t = 10)]
        interval: u64,
    },
    /// Consume snapshots, maintain the live view, aggregate at end of day
    Transform {
        /// Optional: S3 bucket name to upload delay history to (e.g., "my-bucket")
        #[arg(long)]
        s3_bucket: Option<String>,

        /// Optional: Gzip compress delay history before uploading to S3
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/metro_live.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("metro_live.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Collect { interval } => {
            run_collector(config, Duration::from_secs(interval)).await
        }
        Commands::Transform { s3_bucket, gzip } => run_transformer(config, s3_bucket, gzip).await,
    }
}

async fn connect_store(config: &Config) -> Result<SqliteStore> {
    let url = format!("sqlite:{}?mode=rwc", config.sqlite_path);
    SqliteStore::connect(&url).await
}

async fn run_collector(config: Config, interval: Duration) -> Result<()> {
    let store = Arc::new(connect_store(&config).await?);
    let client = BasicClient::new()?;
    let publisher = Publisher::bind(&config.channel_addr).await?;
    info!(addr = %config.channel_addr, "Snapshot channel listening");

    let source = TelemetrySource::new(client, config.api_base_url, config.api_key);
    CollectorWorker::new(
        source,
        publisher,
        store,
        config.window,
        config.arrival_lines,
        interval,
    )
    .run()
    .await
}

async fn run_transformer(config: Config, s3_bucket: Option<String>, gzip: bool) -> Result<()> {
    let store = Arc::new(connect_store(&config).await?);
    let timetable = Arc::new(CsvTimetableSource::new(&config.timetable_dir));
    let exporter = match s3_bucket {
        Some(bucket) if !bucket.is_empty() => {
            info!(bucket = %bucket, gzip, "Delay history export enabled");
            Some(DelayExporter::new(bucket, gzip).await)
        }
        _ => None,
    };

    let subscriber = Subscriber::new(config.channel_addr.clone());
    let holidays = config.holiday_calendar();
    let normalizer = ArrivalNormalizer::new(config.arrival_lines.clone());

    TransformWorker::new(
        subscriber,
        store.clone(),
        store,
        timetable,
        exporter,
        ViewHandle::new(),
        config.window,
        holidays,
        normalizer,
    )
    .run()
    .await
}
