//! Log capture for tests.
//!
//! [`capture_logs`] swaps in a thread-local subscriber that keeps every
//! event in memory, so tests can assert that a failure was logged at the
//! right level with the right structured fields.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

/// One recorded event.
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    /// Event level.
    pub level: Level,
    /// Module path the event came from.
    pub target: String,
    /// The `message` field.
    pub message: String,
    /// Every other field, in recording order, rendered as text.
    pub fields: Vec<(String, String)>,
}

impl CapturedEvent {
    /// Rendered value of field `name`.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find_map(|(key, value)| (key == name).then_some(value.as_str()))
    }
}

/// Handle to the events recorded since [`capture_logs`].
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<CapturedEvent>>>);

impl CapturedLogs {
    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.0.lock().clone()
    }

    /// First event at `level` whose message contains `needle`.
    pub fn find(&self, level: Level, needle: &str) -> Option<CapturedEvent> {
        self.0
            .lock()
            .iter()
            .find(|e| e.level == level && e.message.contains(needle))
            .cloned()
    }

    /// Whether an event at `level` mentions `needle`.
    pub fn has_event(&self, level: Level, needle: &str) -> bool {
        self.find(level, needle).is_some()
    }
}

#[derive(Default)]
struct Recorder {
    message: String,
    fields: Vec<(String, String)>,
}

impl Recorder {
    fn put(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.push((field.name().to_owned(), value));
        }
    }
}

impl Visit for Recorder {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_owned());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{value:?}"));
    }
}

struct CaptureLayer(CapturedLogs);

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut recorder = Recorder::default();
        event.record(&mut recorder);
        let meta = event.metadata();
        self.0.0.lock().push(CapturedEvent {
            level: *meta.level(),
            target: meta.target().to_owned(),
            message: recorder.message,
            fields: recorder.fields,
        });
    }
}

/// Record every event emitted on this thread until the guard drops.
///
/// Under a current-thread `#[tokio::test]` runtime, spawned tasks run on
/// the same thread and are recorded too.
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let guard = tracing_subscriber::registry()
        .with(CaptureLayer(logs.clone()))
        .set_default();
    (logs, guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_level_and_message() {
        let (logs, _guard) = capture_logs();
        tracing::warn!("delivery failed");
        assert!(logs.has_event(Level::WARN, "delivery failed"));
        assert!(!logs.has_event(Level::ERROR, "delivery failed"));
    }

    #[test]
    fn records_display_and_str_fields() {
        let (logs, _guard) = capture_logs();
        let id = "abc123";
        tracing::info!(connection_id = %id, route = "find", status = 200, "dispatched");
        let event = logs.find(Level::INFO, "dispatched").unwrap();
        assert_eq!(event.field("connection_id"), Some("abc123"));
        assert_eq!(event.field("route"), Some("find"));
        assert_eq!(event.field("status"), Some("200"));
        assert_eq!(event.field("missing"), None);
    }

    #[test]
    fn guard_scopes_capture() {
        let (logs, guard) = capture_logs();
        drop(guard);
        tracing::error!("after guard");
        assert!(logs.events().is_empty());
    }
}
