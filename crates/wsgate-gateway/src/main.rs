//! # wsgate
//!
//! Gateway binary. In `local` mode it runs the WebSocket emulator until
//! ctrl-c; in `managed` mode it handles exactly one invocation read from
//! stdin and prints the route response.

#![deny(unsafe_code)]

mod echo;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::AsyncReadExt;
use wsgate_core::{EventNormalizer, GatewayError};
use wsgate_routes::{Dispatcher, RouteResponse, RouteTable, install_framework_routes};
use wsgate_server::shutdown::DEFAULT_DRAIN_TIMEOUT;
use wsgate_server::{EmulatorServer, ServerConfig};
use wsgate_settings::{GatewaySettings, TransportMode};

use crate::echo::EchoApplication;

/// WebSocket connection-event gateway.
#[derive(Parser, Debug)]
#[command(name = "wsgate", about = "WebSocket connection-event gateway")]
struct Cli {
    /// JSON settings file, deep-merged over the defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// `local` or `managed` (overrides settings).
    #[arg(long)]
    mode: Option<String>,

    /// Log level when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn load_settings(&self) -> Result<GatewaySettings> {
        let mut settings = match &self.config {
            Some(path) => wsgate_settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => wsgate_settings::load_settings().context("Invalid settings")?,
        };
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(mode) = &self.mode {
            settings.mode = wsgate_settings::loader::parse_mode(mode)
                .with_context(|| format!("Unknown mode '{mode}' (expected local or managed)"))?;
        }
        Ok(settings)
    }
}

fn dispatcher(settings: &GatewaySettings) -> Dispatcher {
    let mut table = RouteTable::new();
    let _params = install_framework_routes(&mut table, Arc::new(EchoApplication));
    Dispatcher::new(EventNormalizer::new(settings.route_key_field.clone()), table)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;

    match settings.mode {
        TransportMode::Local => run_local(&cli, &settings).await,
        TransportMode::Managed => run_managed(&cli, &settings).await,
    }
}

async fn run_local(cli: &Cli, settings: &GatewaySettings) -> Result<()> {
    wsgate_core::logging::init_subscriber(&cli.log_level);

    let metrics = wsgate_server::metrics::install_recorder();
    let server = EmulatorServer::new(ServerConfig::from_settings(settings), dispatcher(settings))
        .with_metrics(metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind emulator")?;
    tracing::info!(
        route_key_field = %settings.route_key_field,
        "wsgate emulator listening on ws://{addr}"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let drained = server
        .shutdown()
        .graceful_shutdown(vec![handle], Some(DEFAULT_DRAIN_TIMEOUT))
        .await;
    if !drained {
        tracing::warn!("emulator did not drain before timeout");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn run_managed(cli: &Cli, settings: &GatewaySettings) -> Result<()> {
    wsgate_core::logging::init_json_subscriber(&cli.log_level);

    let mut raw = String::new();
    let _ = tokio::io::stdin()
        .read_to_string(&mut raw)
        .await
        .context("Failed to read event from stdin")?;

    let result = wsgate_platform::invoke_json(
        &dispatcher(settings),
        settings,
        &raw,
        Some(settings.invocation.default_deadline()),
    )
    .await;
    let response = invocation_response(result)?;

    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}

/// An invocation whose event JSON cannot be decoded is answered with 400;
/// an unroutable event fails the process.
fn invocation_response(result: Result<RouteResponse, GatewayError>) -> Result<RouteResponse> {
    match result {
        Ok(response) => Ok(response),
        Err(err) if !err.is_fatal() => {
            tracing::warn!(error = %err, "malformed invocation event");
            Ok(RouteResponse::status(400))
        }
        Err(err) => Err(err).context("Invocation failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["wsgate"]);
        assert!(cli.config.is_none());
        assert!(cli.port.is_none());
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn cli_overrides_settings() {
        let cli = Cli::parse_from(["wsgate", "--host", "0.0.0.0", "--port", "9001", "--mode", "managed"]);
        let settings = cli.load_settings().unwrap();
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 9001);
        assert_eq!(settings.mode, TransportMode::Managed);
    }

    #[test]
    fn unknown_mode_is_error() {
        let cli = Cli::parse_from(["wsgate", "--mode", "cloud"]);
        let err = cli.load_settings().unwrap_err();
        assert!(err.to_string().contains("Unknown mode"));
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let cli = Cli::parse_from(["wsgate", "--config", "/nonexistent/wsgate.json"]);
        let settings = cli.load_settings().unwrap();
        assert_eq!(settings.route_key_field, GatewaySettings::default().route_key_field);
    }

    #[test]
    fn dispatcher_uses_configured_route_field() {
        let mut settings = GatewaySettings::default();
        settings.route_key_field = "action".into();
        let dispatcher = dispatcher(&settings);
        assert_eq!(dispatcher.normalizer().route_key_field(), "action");
        assert!(dispatcher.table().has_route("$default"));
    }

    #[test]
    fn undecodable_invocation_answers_400() {
        let response = invocation_response(Err(GatewayError::Decode("eof".into()))).unwrap();
        assert_eq!(response, RouteResponse::status(400));
    }

    #[test]
    fn unroutable_invocation_fails() {
        let err = invocation_response(Err(GatewayError::MissingConnectionId)).unwrap_err();
        assert!(err.to_string().contains("Invocation failed"));
    }

    #[test]
    fn routed_invocation_passes_through() {
        let response = invocation_response(Ok(RouteResponse::status(502))).unwrap();
        assert_eq!(response.status_code, 502);
    }
}
