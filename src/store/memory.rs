use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::shared::error::{WorkflowError, WorkflowResult};
use crate::shared::models::{Message, Principal, Role, Ticket};
use crate::store::{MessageStore, PrincipalStore, TicketMutation, TicketStore};

/// In-memory document store. One `RwLock` per collection; every ticket
/// mutation runs to completion under the write guard, which gives the
/// atomic read-modify-write the workflow engine requires.
#[derive(Default)]
pub struct MemoryStore {
    tickets: RwLock<HashMap<Uuid, Ticket>>,
    messages: RwLock<HashMap<Uuid, Vec<Message>>>,
    principals: RwLock<HashMap<Uuid, Principal>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(what: &str) -> WorkflowError {
    WorkflowError::StoreUnavailable(format!("{what} collection lock poisoned"))
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn insert(&self, ticket: Ticket) -> WorkflowResult<()> {
        let mut tickets = self.tickets.write().map_err(|_| poisoned("ticket"))?;
        if tickets.values().any(|t| t.number == ticket.number) {
            return Err(WorkflowError::Conflict(format!(
                "ticket number {} already taken",
                ticket.number
            )));
        }
        tickets.insert(ticket.id, ticket);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> WorkflowResult<Ticket> {
        let tickets = self.tickets.read().map_err(|_| poisoned("ticket"))?;
        tickets
            .get(&id)
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound(format!("ticket {id}")))
    }

    async fn all(&self) -> WorkflowResult<Vec<Ticket>> {
        let tickets = self.tickets.read().map_err(|_| poisoned("ticket"))?;
        Ok(tickets.values().cloned().collect())
    }

    async fn update(&self, id: Uuid, apply: TicketMutation) -> WorkflowResult<Ticket> {
        let mut tickets = self.tickets.write().map_err(|_| poisoned("ticket"))?;
        let ticket = tickets
            .get_mut(&id)
            .ok_or_else(|| WorkflowError::NotFound(format!("ticket {id}")))?;
        // Apply against a copy so a failed mutation leaves the record intact.
        let mut updated = ticket.clone();
        apply(&mut updated)?;
        *ticket = updated.clone();
        Ok(updated)
    }

    async fn number_exists(&self, number: &str) -> WorkflowResult<bool> {
        let tickets = self.tickets.read().map_err(|_| poisoned("ticket"))?;
        Ok(tickets.values().any(|t| t.number == number))
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert(&self, message: Message) -> WorkflowResult<()> {
        let mut messages = self.messages.write().map_err(|_| poisoned("message"))?;
        messages.entry(message.ticket_id).or_default().push(message);
        Ok(())
    }

    async fn for_ticket(&self, ticket_id: Uuid) -> WorkflowResult<Vec<Message>> {
        let messages = self.messages.read().map_err(|_| poisoned("message"))?;
        let mut out = messages.get(&ticket_id).cloned().unwrap_or_default();
        out.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(out)
    }
}

#[async_trait]
impl PrincipalStore for MemoryStore {
    async fn get(&self, id: Uuid) -> WorkflowResult<Option<Principal>> {
        let principals = self.principals.read().map_err(|_| poisoned("principal"))?;
        Ok(principals.get(&id).cloned())
    }

    async fn insert(&self, principal: Principal) -> WorkflowResult<()> {
        let mut principals = self.principals.write().map_err(|_| poisoned("principal"))?;
        principals.insert(principal.id, principal);
        Ok(())
    }

    async fn set_role(&self, id: Uuid, role: Role) -> WorkflowResult<Principal> {
        let mut principals = self.principals.write().map_err(|_| poisoned("principal"))?;
        let principal = principals
            .get_mut(&id)
            .ok_or_else(|| WorkflowError::NotFound(format!("principal {id}")))?;
        principal.role = role;
        Ok(principal.clone())
    }

    async fn all(&self) -> WorkflowResult<Vec<Principal>> {
        let principals = self.principals.read().map_err(|_| poisoned("principal"))?;
        Ok(principals.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{Priority, TicketStatus, TicketType};
    use chrono::{Duration, Utc};

    fn ticket(subject: &str) -> Ticket {
        let now = Utc::now();
        Ticket {
            id: Uuid::new_v4(),
            number: format!("ECPS-{:06}", rand::random::<u32>() % 1_000_000),
            ticket_type: TicketType::ItSupport,
            subject: subject.to_string(),
            description: "details".to_string(),
            category: "Hardware".to_string(),
            status: TicketStatus::Open,
            priority: Priority::Medium,
            created_by: Uuid::new_v4(),
            created_by_name: "Alice".to_string(),
            created_by_email: "alice@school.example".to_string(),
            assigned_to: None,
            assigned_to_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn message(ticket_id: Uuid, body: &str, offset_secs: i64) -> Message {
        Message {
            id: Uuid::new_v4(),
            ticket_id,
            sender_id: Uuid::new_v4(),
            sender_name: "Bob".to_string(),
            sender_role: Role::Agent,
            body: body.to_string(),
            is_internal: false,
            created_at: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[tokio::test]
    async fn failed_mutation_leaves_ticket_untouched() {
        let store = MemoryStore::new();
        let t = ticket("printer");
        let id = t.id;
        TicketStore::insert(&store, t).await.unwrap();

        let result = store
            .update(
                id,
                Box::new(|t| {
                    t.status = TicketStatus::Closed;
                    Err(WorkflowError::Validation("rejected".into()))
                }),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(
            TicketStore::get(&store, id).await.unwrap().status,
            TicketStatus::Open
        );
    }

    #[tokio::test]
    async fn messages_come_back_in_creation_order() {
        let store = MemoryStore::new();
        let ticket_id = Uuid::new_v4();
        for (body, offset) in [("third", 30), ("first", 10), ("second", 20)] {
            MessageStore::insert(&store, message(ticket_id, body, offset))
                .await
                .unwrap();
        }
        let bodies: Vec<String> = store
            .for_ticket(ticket_id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.body)
            .collect();
        assert_eq!(bodies, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn missing_ticket_is_not_found() {
        let store = MemoryStore::new();
        let err = TicketStore::get(&store, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));
    }
}
