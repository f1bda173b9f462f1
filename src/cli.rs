//! Command-line surface and broker address resolution.

use std::path::PathBuf;

use clap::Parser;
use tracing::warn;
use url::Url;

use crate::config::BrokerConfig;
use crate::sim::orchestrator::RunMode;

/// Environment variable consulted for the broker port when neither the
/// `--port` flag nor the URI supplies one.
pub const BROKER_PORT_ENV: &str = "MQTT_BROKER_PORT";

/// Energy asset digital twin: publishes simulated inverter and charger telemetry.
#[derive(Debug, Parser)]
#[command(name = "asset-twin", version, about, long_about = None)]
pub struct Cli {
    /// Broker host or connection URI (e.g. `tcp://localhost:1883`)
    #[arg(long, env = "MQTT_BROKER_URL")]
    pub url: Option<String>,

    /// Broker port; wins over the URI and MQTT_BROKER_PORT
    ///
    /// A port inside `--url` only applies when this flag is absent, so
    /// `--url tcp://host:1884 --port 1885` connects to 1885.
    #[arg(long)]
    pub port: Option<u16>,

    /// Run mode
    #[arg(long, value_enum, default_value_t = RunMode::Live)]
    pub mode: RunMode,

    /// Load the fleet from a TOML file
    #[arg(long, conflicts_with = "preset")]
    pub config: Option<PathBuf>,

    /// Use a built-in fleet preset (madrid, iberia)
    #[arg(long)]
    pub preset: Option<String>,

    /// Override the random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Stop live mode after this many ticks
    #[arg(long)]
    pub max_ticks: Option<u64>,

    /// Write readings to a CSV file instead of the broker
    #[arg(long, conflicts_with = "dry_run")]
    pub telemetry_out: Option<PathBuf>,

    /// Log readings instead of publishing them
    #[arg(long)]
    pub dry_run: bool,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Host and port the publisher connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    /// Resolves the broker address from the configuration surface.
    ///
    /// `url` is a bare host or a connection URI; a URI's scheme is dropped and
    /// its host and port extracted. The port comes from, in order: `port_flag`,
    /// the URI, `env_port`, then `defaults.port`. An unparseable URI or
    /// environment port is logged and ignored.
    pub fn resolve(
        url: Option<&str>,
        port_flag: Option<u16>,
        env_port: Option<&str>,
        defaults: &BrokerConfig,
    ) -> Self {
        let mut host = defaults.host.clone();
        let mut uri_port = None;

        match url.map(str::trim).filter(|u| !u.is_empty()) {
            Some(raw) if raw.contains("://") => match parse_uri(raw) {
                Ok((uri_host, port)) => {
                    host = uri_host;
                    uri_port = port;
                }
                Err(reason) => {
                    warn!(uri = raw, %reason, fallback = %host, "could not parse broker URI");
                }
            },
            Some(raw) => host = raw.to_string(),
            None => {}
        }

        let env_port = env_port.and_then(|raw| match raw.trim().parse::<u16>() {
            Ok(port) => Some(port),
            Err(err) => {
                warn!(value = raw, error = %err, "ignoring invalid {BROKER_PORT_ENV}");
                None
            }
        });

        let port = port_flag
            .or(uri_port)
            .or(env_port)
            .unwrap_or(defaults.port);
        Self { host, port }
    }
}

fn parse_uri(raw: &str) -> Result<(String, Option<u16>), String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    let host = url
        .host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
        .filter(|h| !h.is_empty())
        .ok_or_else(|| "URI has no host".to_string())?;
    Ok((host.to_string(), url.port()))
}
