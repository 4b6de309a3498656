mod config;

use clap::Parser;
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const METRICS_PREFIX: &str = "frontoffice";

#[derive(Parser)]
#[command(about = "Product front office gateway")]
struct Cli {
    #[arg(long)]
    config_file: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    let config = match config::Config::from_file(&cli.config_file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Could not load config: {}", e);
            process::exit(1);
        }
    };
    if let Err(e) = config.gateway.validate() {
        eprintln!("Invalid config: {}", e);
        process::exit(1);
    }

    let _sentry = config.sentry_dsn().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });
    init_logging(config.log_level(), config.sentry_dsn().is_some());

    if let Some(metrics_config) = &config.metrics {
        if let Err(e) = init_metrics(metrics_config) {
            tracing::error!(error = %e, "could not initialize metrics");
            process::exit(1);
        }
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "could not start runtime");
            process::exit(1);
        }
    };

    tracing::info!("Starting gateway");
    if let Err(e) = runtime.block_on(gateway::run(config.gateway)) {
        tracing::error!(error = %e, "gateway stopped");
        process::exit(1);
    }
}

/// `RUST_LOG` wins over the configured level when set.
fn init_logging(level: &str, with_sentry: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(with_sentry.then(sentry::integrations::tracing::layer))
        .init();
}

fn init_metrics(
    metrics_config: &config::MetricsConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let recorder = StatsdBuilder::from(
        metrics_config.statsd_host.as_str(),
        metrics_config.statsd_port,
    )
    .build(Some(METRICS_PREFIX))?;
    metrics::set_global_recorder(recorder).map_err(|_| "a metrics recorder is already set")?;

    shared::metrics_defs::describe_all(upstream::metrics_defs::ALL_METRICS);
    shared::metrics_defs::describe_all(gateway::metrics_defs::ALL_METRICS);
    Ok(())
}
