//! Downstream to upstream event path
//!
//! Adapters only ever hold an [`EventSink`]; the single receiver belongs to the
//! gateway and is drained on the scheduler task. The channel is unbounded so an
//! adapter pushing from inside `poll()` can never block the task that drains it.

use tokio::sync::mpsc;
use tracing::warn;

use super::value::PointValue;

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// Change detected by a poll
    ValueChanged { key: String, value: PointValue },
    /// Unsolicited report delivered by the downstream library
    Report { key: String, value: PointValue },
    /// Command termination message from a downstream adapter
    CommandTermination { message: String },
}

/// Cloneable sending half handed to every adapter
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

pub type EventReceiver = mpsc::UnboundedReceiver<GatewayEvent>;

impl EventSink {
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn value_changed(&self, key: impl Into<String>, value: PointValue) {
        self.send(GatewayEvent::ValueChanged {
            key: key.into(),
            value,
        });
    }

    pub fn report(&self, key: impl Into<String>, value: PointValue) {
        self.send(GatewayEvent::Report {
            key: key.into(),
            value,
        });
    }

    pub fn command_terminated(&self, message: impl Into<String>) {
        self.send(GatewayEvent::CommandTermination {
            message: message.into(),
        });
    }

    fn send(&self, event: GatewayEvent) {
        if let Err(e) = self.tx.send(event) {
            warn!("Event dropped, gateway receiver closed: {:?}", e.0);
        }
    }
}
