use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted by the task, pallet and exchange services.
///
/// Events are advisory: a failed send is logged and never fails the request
/// that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Task lifecycle events
    TaskCreated {
        operation_id: Uuid,
        kind: String,
    },
    TaskTaken {
        operation_id: Uuid,
        user_id: Uuid,
    },
    TaskClosed {
        operation_id: Uuid,
        kind: String,
    },
    ParentTaskClosed {
        parent_id: Uuid,
        last_child_id: Uuid,
    },

    // Pallet events
    PalletCreated(Uuid),
    PalletDivided {
        source_id: Uuid,
        new_id: Uuid,
        count: i32,
    },
    PalletArchived(Uuid),

    // Order fulfillment events
    OrderLineCollected {
        product_key: String,
    },
    OrderClosed(Uuid),

    // Exchange events
    GroupReadyToUnload {
        operation_ids: Vec<Uuid>,
    },
    UnloadingConfirmed(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, downgrading failure to a warning. Used by services on
    /// paths where the surrounding transaction already committed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            warn!(error = %e, ?event, "failed to publish event");
        }
    }
}

/// Creates a connected sender/receiver pair with the given buffer size.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

/// Handlers implementing this trait process events asynchronously.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

/// Drains the event channel, logging each event. The server spawns this as a
/// background task; tests usually let the receiver drop instead.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::GroupReadyToUnload { operation_ids } => {
                info!(count = operation_ids.len(), "operation group ready to unload");
            }
            Event::OrderClosed(order_id) => {
                info!(%order_id, "order fully collected and closed");
            }
            other => {
                info!(event = ?other, "event received");
            }
        }
    }

    info!("Event processing loop stopped");
}
