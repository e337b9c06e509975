use std::fmt;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::broadcaster::Broadcaster;
use crate::record::{LogRecord, Severity};

/// `tracing` layer that feeds intercepted events into a [`Broadcaster`].
///
/// Register it once on the host's subscriber; whether it does anything is
/// governed by the broadcaster's hook state, which follows the client
/// count. While the hook is inactive the layer returns before visiting the
/// event, so dormant interception costs one atomic load per record.
pub struct BroadcastLayer {
    broadcaster: Broadcaster,
}

impl BroadcastLayer {
    pub fn new(broadcaster: Broadcaster) -> Self {
        Self { broadcaster }
    }
}

impl<S: Subscriber> Layer<S> for BroadcastLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();

        // The broadcaster's own diagnostics (accept errors, bind warnings,
        // drop notices) must never feed back into the queue: a drain that
        // logs would enqueue forever.
        if meta.target().starts_with("wirelog_broadcaster") {
            return;
        }
        if !self.broadcaster.hook_active() {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let record = LogRecord::new(
            Severity::from(*meta.level()),
            meta.file().unwrap_or(""),
            meta.line().unwrap_or(0),
            visitor.message,
        );
        self.broadcaster.handle_record(&record);
    }
}

/// Pulls the `message` field out of an event; everything else is ignored,
/// the wire format carries free text only.
#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}
