//! # wsgate-platform
//!
//! Runs the route dispatcher under the managed, stateless platform: one
//! process invocation per connect, disconnect or message event, with
//! out-of-band delivery addressed by connection id.

#![deny(unsafe_code)]

pub mod context;
pub mod invocation;
pub mod transport;

pub use context::ManagedContext;
pub use invocation::{handle_invocation, invoke_json};
pub use transport::ManagedTransport;
