use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::shared::models::TicketStatus;

/// Domain events emitted by the workflow engine. Live subscribers (SSE,
/// tests) and the notification dispatcher all consume the same channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TicketEvent {
    TicketCreated {
        ticket_id: Uuid,
        number: String,
        created_by: Uuid,
    },
    Assigned {
        ticket_id: Uuid,
        assigned_to: Uuid,
    },
    StatusChanged {
        ticket_id: Uuid,
        from: TicketStatus,
        to: TicketStatus,
    },
    MessagePosted {
        ticket_id: Uuid,
        message_id: Uuid,
        is_internal: bool,
    },
}

impl TicketEvent {
    /// Ticket the event concerns.
    pub fn ticket_id(&self) -> Uuid {
        match self {
            TicketEvent::TicketCreated { ticket_id, .. }
            | TicketEvent::Assigned { ticket_id, .. }
            | TicketEvent::StatusChanged { ticket_id, .. }
            | TicketEvent::MessagePosted { ticket_id, .. } => *ticket_id,
        }
    }

    /// Internal posts must never reach non-agent recipients.
    pub fn agents_only(&self) -> bool {
        matches!(
            self,
            TicketEvent::MessagePosted {
                is_internal: true,
                ..
            }
        )
    }
}

/// Delivery transport boundary. Mail, chat or push integrations implement
/// this; the engine only guarantees the event contract.
pub trait Notifier: Send + Sync {
    fn deliver(&self, event: &TicketEvent);
}

/// Default notifier: structured log lines only.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn deliver(&self, event: &TicketEvent) {
        tracing::info!(agents_only = event.agents_only(), event = ?event, "ticket event");
    }
}

/// Fan events out to the notifier until the engine side of the channel is
/// dropped. Lagged receivers skip ahead; delivery is eventual, not durable.
pub fn spawn_dispatcher(
    mut events: broadcast::Receiver<TicketEvent>,
    notifier: std::sync::Arc<dyn Notifier>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => notifier.deliver(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notification dispatcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
