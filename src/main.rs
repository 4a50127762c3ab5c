//! CLI entry point for the GTFS-RT monitor.
//!
//! Provides subcommands for downloading and validating the static schedule
//! and for inspecting the realtime sources against it.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use gtfs_rt_monitor::{
    config::MonitorConfig,
    error::ScheduleError,
    fetch::{BasicClient, HttpClient, auth::UrlParam},
    inspect::{PassWindow, run_pass},
    output::{append_summary, print_json, print_pretty, print_text, write_html, write_json},
    report::{DiscrepancyReport, html::render_html},
    schedule::{GtfsSchedule, download_schedule, load_schedule, validate},
    sources::{
        SourceAdapter, alerts::AlertsAdapter, onebusaway::OneBusAwayAdapter,
        streets::StreetsAdapter, trip_updates::TripUpdatesAdapter,
        vehicle_positions::VehiclePositionsAdapter,
    },
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "gtfs_rt_monitor")]
#[command(about = "Cross-checks realtime transit sources against the GTFS schedule", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the static GTFS zip
    DownloadGtfs {
        /// URL to fetch (defaults to GTFS_URL)
        #[arg(long)]
        url: Option<String>,

        /// Where to save the zip (defaults to GTFS_PATH)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check the static GTFS zip and write an HTML validation report
    ValidateGtfs {
        /// Path to the zip (defaults to GTFS_PATH)
        #[arg(value_name = "FILE")]
        path: Option<PathBuf>,

        /// Maximum problems listed per kind
        #[arg(long, default_value_t = validate::DEFAULT_LIMIT_PER_KIND)]
        limit: usize,
    },
    /// Run one pass over every configured source
    Inspect {
        /// How to log the report
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// Also write an HTML report to the reports directory
        #[arg(long, default_value_t = false)]
        html: bool,

        /// Write the report as JSON to this file
        #[arg(long)]
        json_out: Option<PathBuf>,

        /// CSV file to append per-source summaries to
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Download the static GTFS zip before the pass
        #[arg(long, default_value_t = false)]
        download: bool,
    },
    /// Run one pass over the Streets webservice only
    InspectStreets,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON log file rotated hourly
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/gtfs_rt_monitor.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gtfs_rt_monitor.log"));

    let file_appender = tracing_appender::rolling::hourly(log_dir, log_file_name);
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
    let config = MonitorConfig::from_env()?;
    let client: Arc<dyn HttpClient> = Arc::new(BasicClient::new(config.http_timeout)?);

    match cli.command {
        Commands::DownloadGtfs { url, output } => {
            let url = url.unwrap_or_else(|| config.gtfs_url.clone());
            let output = output.unwrap_or_else(|| config.gtfs_path.clone());
            download_schedule(client.as_ref(), &url, &output).await?;
        }
        Commands::ValidateGtfs { path, limit } => {
            let path = path.unwrap_or_else(|| config.gtfs_path.clone());
            validate_gtfs(&config, path, limit).await?;
        }
        Commands::Inspect {
            format,
            html,
            json_out,
            csv,
            download,
        } => {
            if download {
                download_schedule(client.as_ref(), &config.gtfs_url, &config.gtfs_path).await?;
            }
            let adapters = adapters(&config, &client)?;
            let alerts = config
                .alerts_url
                .as_ref()
                .map(|url| AlertsAdapter::new(Arc::clone(&client), url.clone()));

            let report = inspect(&config, &adapters, alerts.as_ref()).await;

            match format {
                Format::Text => print_text(&report)?,
                Format::Json => print_json(&report)?,
                Format::Pretty => print_pretty(&report),
            }
            if html {
                let path = config.reports_dir.join(format!(
                    "inspection_{}.html",
                    report.now.format("%Y-%m-%d %H.%M")
                ));
                write_html(&path, &render_html(&report))?;
                info!(path = %path.display(), "HTML report written");
            }
            if let Some(path) = json_out {
                write_json(&path, &report)?;
            }
            if let Some(path) = csv {
                append_summary(&path, &report)?;
            }
        }
        Commands::InspectStreets => {
            let Some(streets) = streets_adapter(&config, &client)? else {
                anyhow::bail!("STREETS_HOST_NAME must be set to inspect the Streets webservice");
            };
            let report = inspect(&config, &[streets], None).await;
            print_text(&report)?;
        }
    }

    Ok(())
}

/// Builds the adapters for every configured source.
fn adapters(
    config: &MonitorConfig,
    client: &Arc<dyn HttpClient>,
) -> Result<Vec<Arc<dyn SourceAdapter>>> {
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();

    if let Some(url) = &config.trip_updates_url {
        adapters.push(Arc::new(TripUpdatesAdapter::new(Arc::clone(client), url.clone())));
    }
    if let Some(url) = &config.vehicle_positions_url {
        adapters.push(Arc::new(VehiclePositionsAdapter::new(
            Arc::clone(client),
            url.clone(),
        )));
    }
    if let Some(url) = &config.oba_vehicles_url {
        let oba_client: Arc<dyn HttpClient> = match &config.oba_api_key {
            Some(key) => Arc::new(UrlParam::new(Arc::clone(client), "key", key.clone())),
            None => Arc::clone(client),
        };
        adapters.push(Arc::new(OneBusAwayAdapter::new(
            oba_client,
            url.clone(),
            config.oba_trip_id_prefix.clone(),
        )));
    }
    if let Some(streets) = streets_adapter(config, client)? {
        adapters.push(streets);
    }

    if adapters.is_empty() {
        warn!("No realtime sources configured");
    }
    Ok(adapters)
}

fn streets_adapter(
    config: &MonitorConfig,
    client: &Arc<dyn HttpClient>,
) -> Result<Option<Arc<dyn SourceAdapter>>> {
    let Some(streets) = &config.streets else {
        return Ok(None);
    };
    std::fs::create_dir_all(&config.reports_dir)
        .with_context(|| format!("creating {}", config.reports_dir.display()))?;
    let dump = config.reports_dir.join("streets_rt_out.xml");
    Ok(Some(Arc::new(StreetsAdapter::new(
        Arc::clone(client),
        streets.clone(),
        Some(dump),
    ))))
}

/// Loads the schedule and runs one pass; a schedule that fails to load
/// yields a report without a baseline.
async fn inspect(
    config: &MonitorConfig,
    adapters: &[Arc<dyn SourceAdapter>],
    alerts: Option<&AlertsAdapter>,
) -> DiscrepancyReport {
    let window = PassWindow {
        now: config.local_time(Utc::now()),
        back: config.window_back,
        fwd: config.window_fwd,
    };

    let path = config.gtfs_path.clone();
    let loaded = tokio::task::spawn_blocking(move || load_schedule(&path))
        .await
        .unwrap_or_else(|e| Err(ScheduleError::Parse(format!("schedule load task failed: {e}"))));

    match loaded {
        Ok(schedule) => run_pass(Ok(&schedule), window, adapters, alerts).await,
        Err(e) => run_pass::<GtfsSchedule>(Err(e), window, adapters, alerts).await,
    }
}

#[tracing::instrument(skip(config))]
async fn validate_gtfs(config: &MonitorConfig, path: PathBuf, limit: usize) -> Result<()> {
    let now = config.local_time(Utc::now());
    let report = tokio::task::spawn_blocking({
        let path = path.clone();
        move || {
            load_schedule(&path)
                .map(|schedule| validate::validate(&schedule, now.date(), limit))
        }
    })
    .await?
    .with_context(|| format!("loading {}", path.display()))?;

    let feed_name = path
        .file_name()
        .and_then(OsStr::to_str)
        .unwrap_or("google_transit.zip");
    let out = config.reports_dir.join(format!(
        "gtfs_validation_{}.html",
        now.format("%Y-%m-%d %H.%M")
    ));
    write_html(&out, &validate::render_html(&report, feed_name))?;

    info!(
        errors = report.count(validate::Severity::Error),
        warnings = report.count(validate::Severity::Warning),
        path = %out.display(),
        "GTFS validation complete"
    );
    Ok(())
}
