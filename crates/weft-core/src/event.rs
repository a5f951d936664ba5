use crate::types::RunEvent;

/// Event bus using tokio broadcast channel.
/// All subscribers receive all run events (log entries, status changes,
/// streamed agent text, human-input requests, run summaries).
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<RunEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: RunEvent) {
        // No subscribers is fine: a headless run has nobody watching
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunId;

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        let run_id = RunId::new();

        bus.publish(RunEvent::RunStarted {
            run_id: run_id.clone(),
        });

        assert!(matches!(a.recv().await.unwrap(), RunEvent::RunStarted { .. }));
        assert!(matches!(b.recv().await.unwrap(), RunEvent::RunStarted { .. }));
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(RunEvent::RunStarted { run_id: RunId::new() });
    }
}
