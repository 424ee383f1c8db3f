//! Neighborhood Monitor: binary entrypoint.
//! Loads config, runs the pipeline once, writes the dashboard and state.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use neighborhood_monitor::config::{resolve_config_path, MonitorConfig};
use neighborhood_monitor::ingest::build_adapters;
use neighborhood_monitor::metrics::MetricsFile;
use neighborhood_monitor::{run, FileStateStore, HtmlReport, RunOptions, SourceKind};

/// Fetch civic activity, keep what is in the neighborhood, flag what needs attention.
#[derive(Parser, Debug)]
#[command(name = "neighborhood-monitor")]
#[command(version)]
struct Args {
    /// Config file (default: $MONITOR_CONFIG_PATH, then config/monitor.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fetch and process, print a summary, write nothing
    #[arg(long)]
    dry_run: bool,

    /// Run a single source (stpaul_permits, granicus, legistar, ramsey_county, mndot).
    /// Other enabled sources keep their saved state
    #[arg(long, value_name = "NAME")]
    source: Option<SourceKind>,

    /// Skip the geographic filter; implies no state write
    #[arg(long)]
    no_filter: bool,

    /// Override the run date (YYYY-MM-DD, default today UTC)
    #[arg(long, value_name = "DATE")]
    run_date: Option<NaiveDate>,

    /// Write Prometheus metrics to this file after the run
    #[arg(long, value_name = "PATH")]
    metrics_file: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` with `--verbose`.
/// `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().compact().with_writer(std::io::stderr)))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env if present.
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing(args.verbose);

    match real_main(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "run failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn real_main(args: Args) -> Result<()> {
    // Configuration problems abort here, before anything is fetched or written.
    let config_path = resolve_config_path(args.config);
    let config = MonitorConfig::load_from(&config_path)?;
    let adapters = build_adapters(&config, args.source)?;
    if adapters.is_empty() {
        tracing::warn!("no sources enabled; the report will be empty");
    }

    let metrics = args.metrics_file.map(MetricsFile::install).transpose()?;

    let opts = RunOptions {
        run_date: args
            .run_date
            .unwrap_or_else(|| chrono::Utc::now().date_naive()),
        dry_run: args.dry_run,
        no_filter: args.no_filter,
    };
    let store = FileStateStore::new(&config.state.path);
    let renderer = HtmlReport::new(&config.report, &config.sources);

    let result = run(&config, &adapters, &store, &renderer, &opts).await;

    if let Some(m) = metrics.as_ref() {
        match m.write() {
            Ok(()) => tracing::info!(path = %m.path().display(), "metrics written"),
            Err(e) => tracing::warn!(
                path = %m.path().display(),
                error = %format!("{e:#}"),
                "metrics file not written"
            ),
        }
    }

    let outcome = result.context("monitor run")?;
    if opts.dry_run || opts.no_filter {
        println!("{outcome}");
    } else {
        tracing::info!(
            report = %renderer.output().display(),
            state = %store.path().display(),
            "done"
        );
    }
    Ok(())
}
