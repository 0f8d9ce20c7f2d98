//! Wire-level constants shared by both transports.

use std::time::Duration;

/// Route key used when a message names no registered route.
pub const DEFAULT_ROUTE: &str = "$default";

/// Route key carried by connect events.
pub const CONNECT_ROUTE: &str = "$connect";

/// Route key carried by disconnect events.
pub const DISCONNECT_ROUTE: &str = "$disconnect";

/// Payload field holding the route key unless configured otherwise.
pub const DEFAULT_ROUTE_KEY_FIELD: &str = "message";

/// Deadline hint used when the invocation environment reports none.
pub const DEFAULT_DEADLINE: Duration = Duration::from_millis(10_000);

/// `provider` tag stamped on connection params handed to applications.
pub const PROVIDER: &str = "wsgate";

/// Path prefix of the out-of-band delivery endpoint.
pub const CONNECTIONS_PATH: &str = "@connections";
