use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use weft_core::error::{Result, WeftError};
use weft_core::event::EventBus;
use weft_core::traits::HumanInput;
use weft_core::types::{InputRequest, RunEvent};

type Pending = HashMap<String, (InputRequest, oneshot::Sender<Option<String>>)>;

/// Parks human-input requests until a front-end answers them.
///
/// Each request is published as `InputRequested`; the input node stays
/// suspended until `respond` is called with the request id.
pub struct InputBroker {
    pending: Mutex<Pending>,
    event_bus: Arc<EventBus>,
}

impl InputBroker {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            event_bus,
        }
    }

    /// Answer a pending request. `None` declines it.
    /// Returns true if the request was found and resolved.
    pub async fn respond(&self, request_id: &str, answer: Option<String>) -> bool {
        let entry = self.pending.lock().await.remove(request_id);
        match entry {
            Some((req, tx)) => {
                self.event_bus.publish(RunEvent::InputResolved {
                    run_id: req.run_id,
                    request_id: request_id.to_string(),
                    provided: answer.is_some(),
                });
                // The waiting node may already be gone
                let _ = tx.send(answer);
                true
            }
            None => false,
        }
    }

    /// List all pending requests.
    pub async fn pending(&self) -> Vec<InputRequest> {
        self.pending
            .lock()
            .await
            .values()
            .map(|(req, _)| req.clone())
            .collect()
    }

    /// Find a pending request by prefix match on the ID.
    pub async fn find_by_prefix(&self, prefix: &str) -> Option<String> {
        self.pending
            .lock()
            .await
            .keys()
            .find(|key| key.starts_with(prefix))
            .cloned()
    }
}

impl HumanInput for InputBroker {
    fn request(&self, request: InputRequest) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move {
            let (tx, rx) = oneshot::channel();
            let id = request.id.clone();

            // Park before publishing so a fast responder always finds the entry
            self.pending.lock().await.insert(id.clone(), (request.clone(), tx));
            self.event_bus
                .publish(RunEvent::InputRequested { request });

            debug!(request_id = %id, "Waiting for human input");
            rx.await.map_err(|_| WeftError::InputDeclined(id))
        })
    }
}
