//! Emulator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use wsgate_core::constants::DEFAULT_DEADLINE;
use wsgate_settings::GatewaySettings;

/// Configuration for the emulator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Per-connection frame queue depth, applied to each direction.
    pub outbound_queue: usize,
    /// Deadline hint handed to every dispatched event.
    pub default_deadline: Duration,
    /// How long a delivery waits for the socket write before giving up.
    pub send_timeout: Duration,
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &GatewaySettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_message_size: settings.server.max_message_size,
            outbound_queue: settings.server.outbound_queue.max(1),
            default_deadline: settings.invocation.default_deadline(),
            ..Self::default()
        }
    }

    /// `host:port` bind string.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_message_size: 16 * 1024 * 1024, // 16 MB
            outbound_queue: 256,
            default_deadline: DEFAULT_DEADLINE,
            send_timeout: Duration::from_secs(10),
        }
    }
}
