//! Asset twin entry point: CLI wiring, fleet construction, and publisher selection.

use std::process;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use asset_twin::cli::{BROKER_PORT_ENV, BrokerAddress, Cli};
use asset_twin::config::FleetConfig;
use asset_twin::devices::SeededRandom;
use asset_twin::error::SimError;
use asset_twin::io::CsvExport;
use asset_twin::publish::{MemoryPublisher, MqttPublisher, MqttSettings, Publisher};
use asset_twin::sim::fleet::FleetRegistry;
use asset_twin::sim::generator::TelemetryGenerator;
use asset_twin::sim::orchestrator::{Orchestrator, Phase, RunMode, RunSettings, RunSummary};

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

/// Loads the fleet from `--config`, `--preset`, or the Madrid default.
fn load_config(cli: &Cli) -> anyhow::Result<FleetConfig> {
    let mut cfg = if let Some(path) = &cli.config {
        FleetConfig::from_toml_file(path)
            .with_context(|| format!("loading fleet config {}", path.display()))?
    } else if let Some(name) = &cli.preset {
        FleetConfig::from_preset(name)?
    } else {
        FleetConfig::madrid()
    };
    if let Some(seed) = cli.seed {
        cfg.simulation.seed = Some(seed);
    }
    Ok(cfg)
}

/// Resolves when Ctrl+C is received.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "cannot listen for Ctrl+C; run until killed");
        std::future::pending::<()>().await;
    }
}

async fn drive<P: Publisher>(
    fleet: FleetRegistry,
    generator: TelemetryGenerator<SeededRandom>,
    publisher: P,
    settings: RunSettings,
    mode: RunMode,
) -> Result<RunSummary, SimError> {
    Orchestrator::new(fleet, generator, publisher, settings)
        .run(mode, shutdown_signal())
        .await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    info!(mode = %cli.mode, phase = ?Phase::Configuring, "orchestrator phase change");

    let cfg = match load_config(&cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    };
    let errors = cfg.validate();
    if !errors.is_empty() {
        eprintln!("Configuration errors:");
        for e in &errors {
            eprintln!("  - {e}");
        }
        process::exit(1);
    }

    let mut rng = SeededRandom::new(cfg.simulation.seed);
    let fleet = match FleetRegistry::from_config(&cfg, &mut rng) {
        Ok(fleet) => fleet,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };
    let generator = TelemetryGenerator::new(cfg.simulation.generator_params(), rng);
    let mut settings = cfg.simulation.run_settings();
    settings.max_live_ticks = cli.max_ticks;

    let outcome = if let Some(path) = &cli.telemetry_out {
        match CsvExport::create(path) {
            Ok(sink) => {
                info!(path = %path.display(), "writing telemetry to CSV");
                drive(fleet, generator, sink, settings, cli.mode).await
            }
            Err(e) => Err(SimError::Io(e)),
        }
    } else if cli.dry_run {
        info!("dry run: readings are logged, not published");
        drive(fleet, generator, MemoryPublisher::logging(), settings, cli.mode).await
    } else {
        let env_port = std::env::var(BROKER_PORT_ENV).ok();
        let address = BrokerAddress::resolve(
            cli.url.as_deref(),
            cli.port,
            env_port.as_deref(),
            &cfg.broker,
        );
        match MqttPublisher::connect(&MqttSettings::new(&cfg.broker, &address)).await {
            Ok(publisher) => drive(fleet, generator, publisher, settings, cli.mode).await,
            Err(e) => Err(e),
        }
    };

    match outcome {
        Ok(summary) => {
            info!(
                mode = %summary.mode,
                ticks = summary.ticks,
                published = summary.published,
                failed = summary.failed,
                "simulation finished"
            );
        }
        Err(e) => {
            error!(error = %e, "simulation failed");
            process::exit(1);
        }
    }
}
