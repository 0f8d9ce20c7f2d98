//! # wsgate-server
//!
//! Local transport emulator. Holds live WebSocket connections in a
//! [`ConnectionRegistry`](wsgate_core::ConnectionRegistry), feeds their
//! lifecycle and frames through the route dispatcher in the managed
//! platform's event shape, and serves the `/@connections/{id}` delivery
//! endpoint on the same port.

#![deny(unsafe_code)]

pub mod config;
pub mod control;
pub mod error;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod transport;
pub mod websocket;

pub use config::ServerConfig;
pub use error::ServerError;
pub use server::EmulatorServer;
pub use transport::{LocalContext, LocalTransport};
