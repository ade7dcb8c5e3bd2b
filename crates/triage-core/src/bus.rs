//! In-process trigger-event bus.
//!
//! Ticket creation and user signup publish trigger events here; the daemon
//! consumes the receiving end and dispatches each event to its pipeline.
//! Publishing is best-effort: a closed channel is logged and swallowed so
//! the primary transaction (the creation itself) never fails on it.

use tokio::sync::mpsc;
use tracing::warn;

use crate::domain::TriggerEvent;

/// Sending half of the trigger-event channel. Cheap to clone.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<TriggerEvent>,
}

impl EventBus {
    /// Create a bus and the receiver the consumer loop will drain.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TriggerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Publish an event, best-effort. A send failure (consumer gone) is
    /// logged and ignored.
    pub fn publish(&self, event: TriggerEvent) {
        let name = event.name.clone();
        if self.tx.send(event).is_err() {
            warn!(event = %name, "trigger event dropped: no consumer (non-critical)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_state::{Ticket, UserId};

    #[tokio::test]
    async fn published_events_arrive_in_order() {
        let (bus, mut rx) = EventBus::new();
        let t1 = Ticket::new("a".into(), "d".into(), UserId::new());
        let t2 = Ticket::new("b".into(), "d".into(), UserId::new());

        bus.publish(TriggerEvent::ticket_created(&t1));
        bus.publish(TriggerEvent::ticket_created(&t2));

        assert_eq!(rx.recv().await.unwrap().ticket_id(), Some(t1.id));
        assert_eq!(rx.recv().await.unwrap().ticket_id(), Some(t2.id));
    }

    #[tokio::test]
    async fn publish_after_consumer_drop_is_swallowed() {
        let (bus, rx) = EventBus::new();
        drop(rx);
        // Must not panic.
        bus.publish(TriggerEvent::user_signed_up("a@triage.dev"));
    }
}
