//! # wsgate-routes
//!
//! Route selection for normalized connection events.
//!
//! - **Handler contract**: [`RouteHandler`], [`RouteArgs`], [`RouteResponse`]
//! - **Route table**: one handler per lifecycle kind or message route key
//! - **Dispatcher**: normalize, select, run under the event deadline,
//!   convert every failure into a status
//! - **Framework adapter**: [`Application`] collaborator wiring with
//!   per-connection [`ConnectionParams`]

#![deny(unsafe_code)]

pub mod dispatcher;
pub mod errors;
pub mod framework;
pub mod table;
pub mod types;

pub use dispatcher::Dispatcher;
pub use errors::{HandlerError, HandlerResult};
pub use framework::{Application, ConnectionParams, ParamsStore, install_framework_routes};
pub use table::{RouteHandler, RouteTable};
pub use types::{RouteArgs, RouteResponse};
