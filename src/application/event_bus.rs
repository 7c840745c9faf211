//! Broadcast bus for pipeline events
//!
//! One sender, any number of subscribers. Publishing with nobody listening
//! is a no-op, so the pipeline never blocks on observers.

use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::events::PipelineEvent;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1000);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: PipelineEvent) {
        debug!(?event, "publishing pipeline event");
        // A send error only means no subscriber is attached right now.
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_in_publish_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(PipelineEvent::item_scraped("B0TESTASIN", "Widget"));
        bus.publish(PipelineEvent::item_listed("B0TESTASIN"));

        assert!(matches!(rx.recv().await.unwrap(), PipelineEvent::ItemScraped { .. }));
        assert!(matches!(rx.recv().await.unwrap(), PipelineEvent::ItemListed { .. }));
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(PipelineEvent::ScanProgress { progress: 10, found: 0 });
    }
}
