//! Single serialized dispatch point fed by every device listener

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::Router;
use crate::midi::MidiEvent;

/// Sending half handed to device listeners
pub type EventSender = mpsc::Sender<(String, MidiEvent)>;

/// Consumes `(device, event)` pairs one at a time and routes them
pub struct Dispatcher {
    router: Arc<Router>,
    rx: mpsc::Receiver<(String, MidiEvent)>,
}

impl Dispatcher {
    /// Create the queue between listeners and the router
    pub fn channel(router: Arc<Router>, capacity: usize) -> (EventSender, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { router, rx })
    }

    /// Route events until every sender is dropped
    ///
    /// Events already queued when the last sender goes away are still
    /// handled. Returns the number of events processed.
    pub async fn run(mut self) -> u64 {
        info!("Dispatcher started");
        let mut processed = 0u64;

        while let Some((device, event)) = self.rx.recv().await {
            let summary = self.router.handle(&device, &event).await;
            debug!(
                device = %device,
                matched = summary.matched,
                failed = summary.failed(),
                "Event dispatched"
            );
            processed += 1;
        }

        info!("Dispatcher stopped after {} event(s)", processed);
        processed
    }
}
