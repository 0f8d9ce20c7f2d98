//! # wsgate-settings
//!
//! Configuration with layered sources, in priority order:
//! 1. **Compiled defaults**: [`GatewaySettings::default()`]
//! 2. **Settings file**: optional JSON file, deep-merged over defaults
//! 3. **Environment variables**: `MAPPING_KEY` and `WSGATE_*` overrides
//!
//! Settings are loaded once at startup and passed down explicitly.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path};
pub use types::{GatewaySettings, InvocationSettings, ManagedSettings, ServerSettings, TransportMode};
