//! Settings types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use wsgate_core::constants::{DEFAULT_DEADLINE, DEFAULT_ROUTE_KEY_FIELD};

/// Which transport the process runs against. Chosen once at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Stateful local socket server (the emulator).
    #[default]
    Local,
    /// Stateless managed-platform invocations.
    Managed,
}

/// Top-level gateway settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    /// Payload field holding a message's route key.
    pub route_key_field: String,
    /// Transport selection.
    pub mode: TransportMode,
    /// Local emulator settings.
    pub server: ServerSettings,
    /// Invocation settings.
    pub invocation: InvocationSettings,
    /// Managed-platform settings.
    pub managed: ManagedSettings,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            route_key_field: DEFAULT_ROUTE_KEY_FIELD.to_string(),
            mode: TransportMode::default(),
            server: ServerSettings::default(),
            invocation: InvocationSettings::default(),
            managed: ManagedSettings::default(),
        }
    }
}

/// Local emulator network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Port serving both the socket endpoint and the control plane.
    pub port: u16,
    /// Max inbound frame size in bytes.
    pub max_message_size: usize,
    /// Per-connection outbound frame queue depth.
    pub outbound_queue: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7886,
            max_message_size: 16 * 1024 * 1024,
            outbound_queue: 256,
        }
    }
}

/// Invocation settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvocationSettings {
    /// Deadline hint used when the environment reports none, in milliseconds.
    pub default_deadline_ms: u64,
}

impl InvocationSettings {
    /// Default deadline as a [`Duration`].
    pub fn default_deadline(&self) -> Duration {
        Duration::from_millis(self.default_deadline_ms)
    }
}

impl Default for InvocationSettings {
    fn default() -> Self {
        Self {
            default_deadline_ms: DEFAULT_DEADLINE.as_millis() as u64,
        }
    }
}

/// Managed-platform settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagedSettings {
    /// Base URL of the out-of-band delivery endpoint. When unset it is
    /// derived from each event's `domainName` and `stage`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}
