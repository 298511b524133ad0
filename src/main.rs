use std::{path::PathBuf, process::ExitCode};

use anyhow::Context;
use clap::{CommandFactory, Parser};
use ixpscan::{
    config::{Config, IxpList, LoggingConfig},
    metrics,
    pipeline::{IxpReport, Pipeline},
};
use tracing::{error, info};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Generate a per-IXP summary of the origin ASNs seen on its route servers.
#[derive(Parser)]
#[command(name = "ixpscan", version)]
struct Cli {
    /// Base URL of an Alice-LG looking glass to process
    #[arg(short = 'l', long = "lg", value_name = "ALICE_URL")]
    lg: Option<String>,

    /// Process every IXP listed in the IXP list, concurrently
    #[arg(short, long)]
    all: bool,

    /// Settings file
    #[arg(short, long, env = "IXPSCAN_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// YAML list of IXP base URLs used by --all
    #[arg(long, env = "IXPSCAN_IXPS", default_value = "config.yaml")]
    ixps: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    if cli.lg.is_none() && !cli.all {
        Cli::command().print_help()?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = Config::load(&cli.config)?;
    let _guard = init_logging(&config.logging)?;

    if config.metrics.enabled {
        metrics::start_exporter(&config.metrics.bind)
            .with_context(|| format!("starting metrics exporter on {}", config.metrics.bind))?;
        info!("serving metrics on {}", config.metrics.bind);
    }

    let pipeline = Pipeline::from_config(&config)?;
    let mut failed = 0;

    if let Some(lg) = &cli.lg {
        match pipeline.run_ixp(lg).await {
            Ok(result) => summarize(&result),
            Err(_) => failed += 1,
        }
    }

    if cli.all {
        let list = IxpList::load(&cli.ixps)?;
        info!("processing {} IXPs", list.ixps.len());
        for (ixp, result) in pipeline.run_all(&list.ixps).await {
            match result {
                Ok(result) => summarize(&result),
                Err(_) => {
                    error!(ixp = %ixp, "no report");
                    failed += 1;
                }
            }
        }
    }

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn summarize(result: &IxpReport) {
    info!(
        ixp = %result.ixp,
        rows = result.report.len(),
        link = result.link.as_deref().unwrap_or("none"),
        "report ready"
    );
}

/// stderr plus a daily log file; `RUST_LOG` decides what gets through.
fn init_logging(config: &LoggingConfig) -> anyhow::Result<WorkerGuard> {
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("ixpscan")
        .filename_suffix("log")
        .build(&config.directory)
        .with_context(|| format!("opening log directory {}", config.directory))?;
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    Ok(guard)
}
