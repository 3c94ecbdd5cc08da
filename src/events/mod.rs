use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::AdjustmentReason;

// Domain events published after a mutation has been committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    VariantCreated {
        product_id: Uuid,
        variant_id: Uuid,
        sku: String,
    },
    VariantUpdated {
        product_id: Uuid,
        variant_id: Uuid,
        sku: String,
    },
    VariantDeleted {
        product_id: Uuid,
        variant_id: Uuid,
        sku: String,
    },
    ColorGroupSynced {
        product_id: Uuid,
        color: String,
        synced_count: usize,
    },
    InventoryAdjusted {
        variant_id: Uuid,
        sku: String,
        delta: i32,
        reason: AdjustmentReason,
        quantity_after: i32,
    },
    VariantsImported {
        created: usize,
        failed: usize,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with the receiving end of a bounded channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Publishes without waiting: a full or closed channel drops the event
    /// with a warning. Event delivery is never part of a mutation's outcome.
    pub async fn send_or_log(&self, event: Event) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(event = ?event, "event channel full, domain event dropped");
            }
            Err(TrySendError::Closed(event)) => {
                warn!(event = ?event, "event channel closed, domain event dropped");
            }
        }
    }
}

// Handlers implementing this trait process events asynchronously.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

/// Default handler: structured log line per event.
#[derive(Debug, Default)]
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle_event(&self, event: Event) -> Result<(), String> {
        match &event {
            Event::ColorGroupSynced {
                product_id,
                color,
                synced_count,
            } => info!(%product_id, %color, synced_count, "color group synced"),
            Event::InventoryAdjusted {
                variant_id,
                sku,
                delta,
                reason,
                quantity_after,
            } => info!(%variant_id, %sku, delta, %reason, quantity_after, "inventory adjusted"),
            other => info!(event = ?other, "domain event"),
        }
        Ok(())
    }
}

/// Drains the channel and dispatches every event to each handler.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, handlers: Vec<Arc<dyn EventHandler>>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        for handler in &handlers {
            if let Err(e) = handler.handle_event(event.clone()).await {
                warn!(error = %e, "event handler failed");
            }
        }
    }

    info!("Event processing loop stopped");
}
