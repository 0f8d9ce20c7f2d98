//! # wsgate-core
//!
//! Foundation types shared by every wsgate crate.
//!
//! - **Connection ids**: [`ConnectionId`] newtype over the transport-assigned string
//! - **Transport events**: [`TransportEvent`], the managed-platform event shape
//!   that both transports speak
//! - **Normalization**: [`EventNormalizer`] turns a transport event into a
//!   [`NormalizedEvent`] with an exhaustively matchable [`EventKind`]
//! - **Registry**: [`ConnectionRegistry`], the process-local id → handle table
//! - **Delivery**: the [`Transport`] capability and [`DeliveryError`]
//! - **Errors**: [`GatewayError`] via `thiserror`
//! - **Logging**: subscriber setup and test log capture

#![deny(unsafe_code)]

pub mod constants;
pub mod context;
pub mod delivery;
pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod normalizer;
pub mod registry;

pub use context::InvocationContext;
pub use delivery::{DeliveryError, DeliveryResult, Transport, record_failure, send_json};
pub use errors::{GatewayError, Result};
pub use events::{EventKind, HeaderValue, MultiValue, NormalizedEvent, RequestContext, TransportEvent};
pub use ids::ConnectionId;
pub use normalizer::EventNormalizer;
pub use registry::ConnectionRegistry;
