//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`GatewaySettings::default()`]
//! 2. If a settings file is given and exists, deep-merge it over defaults
//! 3. Apply environment variable overrides (highest priority)

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{GatewaySettings, TransportMode};

/// Environment variable selecting the message route-key field.
pub const ROUTE_KEY_FIELD_ENV: &str = "MAPPING_KEY";

/// Load settings from defaults and environment only.
pub fn load_settings() -> Result<GatewaySettings> {
    let mut settings = GatewaySettings::default();
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Load settings from a JSON file with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<GatewaySettings> {
    let defaults = serde_json::to_value(GatewaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: GatewaySettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// Objects merge per key, arrays and scalars are replaced, and nulls in
/// `source` are skipped.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are warned about and ignored.
pub fn apply_env_overrides(settings: &mut GatewaySettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

fn apply_overrides(settings: &mut GatewaySettings, lookup: impl Fn(&str) -> Option<String>) {
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = string(ROUTE_KEY_FIELD_ENV) {
        settings.route_key_field = v;
    }
    if let Some(v) = string("WSGATE_MODE") {
        match parse_mode(&v) {
            Some(mode) => settings.mode = mode,
            None => tracing::warn!(key = "WSGATE_MODE", value = %v, "invalid transport mode, ignoring"),
        }
    }
    if let Some(v) = string("WSGATE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = string("WSGATE_PORT") {
        match parse_u16_range(&v, 0, u16::MAX) {
            Some(port) => settings.server.port = port,
            None => tracing::warn!(key = "WSGATE_PORT", value = %v, "invalid u16 env var, ignoring"),
        }
    }
    if let Some(v) = string("WSGATE_DEADLINE_MS") {
        match parse_u64_range(&v, 1, 900_000) {
            Some(ms) => settings.invocation.default_deadline_ms = ms,
            None => tracing::warn!(key = "WSGATE_DEADLINE_MS", value = %v, "invalid u64 env var, ignoring"),
        }
    }
    if let Some(v) = string("WSGATE_MANAGED_ENDPOINT") {
        settings.managed.endpoint = Some(v.trim_end_matches('/').to_owned());
    }
}

fn validate(settings: &GatewaySettings) -> Result<()> {
    if settings.route_key_field.is_empty() {
        return Err(SettingsError::InvalidValue(
            "routeKeyField must not be empty".into(),
        ));
    }
    if settings.server.outbound_queue == 0 {
        return Err(SettingsError::InvalidValue(
            "server.outboundQueue must be at least 1".into(),
        ));
    }
    Ok(())
}

/// Parse a transport mode name.
pub fn parse_mode(val: &str) -> Option<TransportMode> {
    match val.to_lowercase().as_str() {
        "local" => Some(TransportMode::Local),
        "managed" => Some(TransportMode::Managed),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
