//! WebSocket side of the emulator.

pub mod connection;
pub mod events;
pub mod handler;
pub mod session;
