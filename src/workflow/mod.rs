use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::identity::IdentityResolver;
use crate::notify::TicketEvent;
use crate::policy::{self, Action};
use crate::shared::error::{WorkflowError, WorkflowResult};
use crate::shared::models::{
    Message, Principal, Ticket, TicketDraft, TicketStats, TicketStatus, TicketType,
};
use crate::store::{MessageStore, TicketStore};

/// Attempts to find a free ticket number before the intent gives up.
const NUMBER_ATTEMPTS: usize = 16;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct WorkflowOptions {
    /// Prefix of the human-displayable ticket number.
    pub number_prefix: String,
    /// Reopen a closed ticket when its creator posts a public reply.
    pub reopen_on_reply: bool,
    /// Enforce the forward-only status graph instead of any-to-any moves.
    pub strict_transitions: bool,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            number_prefix: "ECPS".to_string(),
            reopen_on_reply: false,
            strict_transitions: false,
        }
    }
}

/// List filters. Visibility narrowing always happens before these apply, so
/// filter behavior can never leak the existence of a hidden ticket.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    #[serde(rename = "type")]
    pub ticket_type: Option<TicketType>,
    pub assigned_to: Option<Uuid>,
    pub search: Option<String>,
}

/// One transition intent: assignment and/or status change applied in a
/// single atomic step.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransitionRequest {
    pub assign_to: Option<Uuid>,
    pub status: Option<TicketStatus>,
}

/// Orchestrates authorized mutations over the ticket and message stores and
/// emits domain events. Every intent either fully applies or fails without
/// touching the record.
#[derive(Clone)]
pub struct WorkflowEngine {
    tickets: Arc<dyn TicketStore>,
    messages: Arc<dyn MessageStore>,
    identity: IdentityResolver,
    options: WorkflowOptions,
    events: broadcast::Sender<TicketEvent>,
}

impl WorkflowEngine {
    pub fn new(
        tickets: Arc<dyn TicketStore>,
        messages: Arc<dyn MessageStore>,
        identity: IdentityResolver,
        options: WorkflowOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            tickets,
            messages,
            identity,
            options,
            events,
        }
    }

    /// Register interest in the event stream. Dropping the receiver
    /// unregisters it; no engine-side state outlives the subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<TicketEvent> {
        self.events.subscribe()
    }

    /// Whether `actor` may receive `event` on a live subscription. The same
    /// visibility rules as reads apply: a subscriber never learns about a
    /// ticket that `get` or `list` would hide from them, and internal-note
    /// events stay with agent-capable roles.
    pub async fn event_visible(&self, actor: &Principal, event: &TicketEvent) -> bool {
        if event.agents_only() && !actor.role.is_agent() {
            return false;
        }
        match self.tickets.get(event.ticket_id()).await {
            Ok(ticket) => policy::can_view(actor, &ticket),
            Err(_) => false,
        }
    }

    pub fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    fn emit(&self, event: TicketEvent) {
        // Send only fails when nobody is subscribed, which is fine.
        let _ = self.events.send(event);
    }

    /// File a new ticket on behalf of `actor`. The creator snapshot and a
    /// fresh unique number are filled in here; status starts at `Open`.
    pub async fn file_ticket(
        &self,
        actor: &Principal,
        draft: TicketDraft,
    ) -> WorkflowResult<Ticket> {
        policy::authorize(actor, Action::CreateTicket, None)?;
        let subject = draft.subject.trim().to_string();
        if subject.is_empty() {
            return Err(WorkflowError::Validation("subject must not be empty".into()));
        }
        let description = draft.description.trim().to_string();
        if description.is_empty() {
            return Err(WorkflowError::Validation(
                "description must not be empty".into(),
            ));
        }

        for _ in 0..NUMBER_ATTEMPTS {
            let number = candidate_number(&self.options.number_prefix);
            if self.tickets.number_exists(&number).await? {
                continue;
            }
            let now = Utc::now();
            let ticket = Ticket {
                id: Uuid::new_v4(),
                number,
                ticket_type: draft.ticket_type,
                subject: subject.clone(),
                description: description.clone(),
                category: draft.category.trim().to_string(),
                status: TicketStatus::Open,
                priority: draft.priority,
                created_by: actor.id,
                created_by_name: actor.display_name.clone(),
                created_by_email: actor.email.clone(),
                assigned_to: None,
                assigned_to_name: None,
                created_at: now,
                updated_at: now,
            };
            match self.tickets.insert(ticket.clone()).await {
                Ok(()) => {
                    tracing::info!(ticket = %ticket.number, actor = %actor.id, "ticket filed");
                    self.emit(TicketEvent::TicketCreated {
                        ticket_id: ticket.id,
                        number: ticket.number.clone(),
                        created_by: actor.id,
                    });
                    return Ok(ticket);
                }
                // Lost the number to a concurrent create; try another.
                Err(WorkflowError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(WorkflowError::Conflict(
            "could not allocate a unique ticket number".into(),
        ))
    }

    /// Read a single ticket. A hidden ticket is reported as `Forbidden`,
    /// never as `NotFound`.
    pub async fn get_ticket(&self, actor: &Principal, id: Uuid) -> WorkflowResult<Ticket> {
        let ticket = self.tickets.get(id).await?;
        policy::authorize(actor, Action::ViewTicket, Some(&ticket))?;
        Ok(ticket)
    }

    /// List tickets visible to `actor`, newest first. The visible set is
    /// narrowed by policy before any filter applies.
    pub async fn list_tickets(
        &self,
        actor: &Principal,
        filter: &TicketFilter,
    ) -> WorkflowResult<Vec<Ticket>> {
        let mut tickets: Vec<Ticket> = self
            .tickets
            .all()
            .await?
            .into_iter()
            .filter(|t| policy::can_view(actor, t))
            .collect();

        if let Some(status) = filter.status {
            tickets.retain(|t| t.status == status);
        }
        if let Some(ticket_type) = filter.ticket_type {
            tickets.retain(|t| t.ticket_type == ticket_type);
        }
        if let Some(assigned_to) = filter.assigned_to {
            tickets.retain(|t| t.assigned_to == Some(assigned_to));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim) {
            if !search.is_empty() {
                let needle = search.to_lowercase();
                tickets.retain(|t| {
                    t.number.to_lowercase().contains(&needle)
                        || t.subject.to_lowercase().contains(&needle)
                        || t.description.to_lowercase().contains(&needle)
                        || t.created_by_name.to_lowercase().contains(&needle)
                });
            }
        }

        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tickets)
    }

    /// Dashboard counters over the actor-visible set.
    pub async fn stats(&self, actor: &Principal) -> WorkflowResult<TicketStats> {
        let tickets = self.list_tickets(actor, &TicketFilter::default()).await?;
        let mut stats = TicketStats {
            total: tickets.len() as i64,
            ..TicketStats::default()
        };
        for ticket in &tickets {
            match ticket.status {
                TicketStatus::Open => stats.open += 1,
                TicketStatus::InProgress => stats.in_progress += 1,
                TicketStatus::Pending => stats.pending += 1,
                TicketStatus::Resolved => stats.resolved += 1,
                TicketStatus::Closed => stats.closed += 1,
                TicketStatus::Urgent => stats.urgent += 1,
            }
        }
        Ok(stats)
    }

    /// Post a public reply or an internal note. Bumps the parent ticket's
    /// `updated_at`; messages are activity, not just content.
    ///
    /// The message lands before the activity bump: a failure in between
    /// leaves the reply in place with a stale `updated_at` and surfaces to
    /// the caller as retryable. A failed message insert changes nothing.
    pub async fn respond(
        &self,
        actor: &Principal,
        ticket_id: Uuid,
        body: &str,
        internal: bool,
    ) -> WorkflowResult<Message> {
        let ticket = self.tickets.get(ticket_id).await?;
        let action = if internal {
            Action::PostInternalNote
        } else {
            Action::PostReply
        };
        policy::authorize(actor, action, Some(&ticket))?;

        let body = body.trim();
        if body.is_empty() {
            return Err(WorkflowError::Validation(
                "message body must not be empty".into(),
            ));
        }

        let message = Message {
            id: Uuid::new_v4(),
            ticket_id,
            sender_id: actor.id,
            sender_name: actor.display_name.clone(),
            sender_role: actor.role,
            body: body.to_string(),
            is_internal: internal,
            created_at: Utc::now(),
        };
        self.messages.insert(message.clone()).await?;

        let reopen = !internal
            && self.options.reopen_on_reply
            && actor.id == ticket.created_by
            && ticket.status == TicketStatus::Closed;
        let from = ticket.status;
        self.tickets
            .update(
                ticket_id,
                Box::new(move |t| {
                    if reopen && t.status == TicketStatus::Closed {
                        t.status = TicketStatus::Open;
                    }
                    t.updated_at = Utc::now();
                    Ok(())
                }),
            )
            .await?;

        if reopen {
            tracing::info!(ticket = %ticket.number, actor = %actor.id, "reopened on creator reply");
            self.emit(TicketEvent::StatusChanged {
                ticket_id,
                from,
                to: TicketStatus::Open,
            });
        }
        self.emit(TicketEvent::MessagePosted {
            ticket_id,
            message_id: message.id,
            is_internal: internal,
        });
        Ok(message)
    }

    /// Ticket conversation, ascending by creation time. Internal notes are
    /// stripped here at the boundary for actors without the capability; no
    /// caller ever has to re-filter.
    pub async fn list_messages(
        &self,
        actor: &Principal,
        ticket_id: Uuid,
    ) -> WorkflowResult<Vec<Message>> {
        let ticket = self.tickets.get(ticket_id).await?;
        policy::authorize(actor, Action::ViewTicket, Some(&ticket))?;
        let mut messages = self.messages.for_ticket(ticket_id).await?;
        if policy::authorize(actor, Action::ViewInternalNotes, Some(&ticket)).is_err() {
            messages.retain(|m| !m.is_internal);
        }
        Ok(messages)
    }

    /// Apply assignment and/or status change as one atomic step, appending
    /// an internal audit message per change. Self-assignment of an
    /// unassigned ticket also pulls it into `In Progress`.
    ///
    /// The ticket update is the authoritative write and lands first; audit
    /// notes and events trail it. A failure after the update surfaces as
    /// retryable without undoing the transition.
    pub async fn transition(
        &self,
        actor: &Principal,
        ticket_id: Uuid,
        change: TransitionRequest,
    ) -> WorkflowResult<Ticket> {
        if change.assign_to.is_none() && change.status.is_none() {
            return Err(WorkflowError::Validation(
                "transition names neither an assignee nor a status".into(),
            ));
        }
        let ticket = self.tickets.get(ticket_id).await?;
        if change.assign_to.is_some() {
            policy::authorize(actor, Action::Assign, Some(&ticket))?;
        }
        if change.status.is_some() {
            policy::authorize(actor, Action::ChangeStatus, Some(&ticket))?;
        }

        let assignee = match change.assign_to {
            Some(agent_id) => {
                let agent = self.identity.get(agent_id).await?;
                if !agent.role.is_agent() {
                    return Err(WorkflowError::Validation(format!(
                        "{} cannot be assigned tickets",
                        agent.display_name
                    )));
                }
                Some(agent)
            }
            None => None,
        };

        // Self-assignment of an unassigned ticket starts work on it.
        let to_status = change.status.or_else(|| {
            let self_assign = assignee.as_ref().map(|a| a.id) == Some(actor.id);
            (self_assign && ticket.assigned_to.is_none()).then_some(TicketStatus::InProgress)
        });

        let from = ticket.status;
        let strict = self.options.strict_transitions;
        let snapshot = assignee.clone();
        let updated = self
            .tickets
            .update(
                ticket_id,
                Box::new(move |t| {
                    if let Some(agent) = &snapshot {
                        // Id and name snapshot always move together.
                        t.assigned_to = Some(agent.id);
                        t.assigned_to_name = Some(agent.display_name.clone());
                    }
                    if let Some(next) = to_status {
                        if strict && !transition_allowed(t.status, next) {
                            return Err(WorkflowError::Validation(format!(
                                "status cannot move from {} to {}",
                                t.status, next
                            )));
                        }
                        t.status = next;
                    }
                    t.updated_at = Utc::now();
                    Ok(())
                }),
            )
            .await?;

        if let Some(agent) = &assignee {
            self.append_audit(actor, ticket_id, format!("Ticket assigned to {}", agent.display_name))
                .await?;
            self.emit(TicketEvent::Assigned {
                ticket_id,
                assigned_to: agent.id,
            });
        }
        if let Some(to) = to_status {
            if to != from {
                self.append_audit(actor, ticket_id, format!("Status changed to {to}"))
                    .await?;
                self.emit(TicketEvent::StatusChanged {
                    ticket_id,
                    from,
                    to,
                });
            }
        }
        tracing::info!(
            ticket = %updated.number,
            actor = %actor.id,
            status = %updated.status,
            assigned = ?updated.assigned_to_name,
            "ticket transitioned"
        );
        Ok(updated)
    }

    /// "Assign to me" shortcut used by the agent queue.
    pub async fn assign_to_me(&self, actor: &Principal, ticket_id: Uuid) -> WorkflowResult<Ticket> {
        self.transition(
            actor,
            ticket_id,
            TransitionRequest {
                assign_to: Some(actor.id),
                status: None,
            },
        )
        .await
    }

    /// Synthetic internal message narrating a transition; the only durable
    /// audit trail this system keeps.
    async fn append_audit(
        &self,
        actor: &Principal,
        ticket_id: Uuid,
        body: String,
    ) -> WorkflowResult<()> {
        let message = Message {
            id: Uuid::new_v4(),
            ticket_id,
            sender_id: actor.id,
            sender_name: actor.display_name.clone(),
            sender_role: actor.role,
            body,
            is_internal: true,
            created_at: Utc::now(),
        };
        self.messages.insert(message).await
    }
}

fn candidate_number(prefix: &str) -> String {
    let suffix = rand::random::<u32>() % 1_000_000;
    format!("{prefix}-{suffix:06}")
}

/// Forward-only status graph, enforced only when `strict_transitions` is
/// on. Terminal states reopen through `Open`.
fn transition_allowed(from: TicketStatus, to: TicketStatus) -> bool {
    use TicketStatus::*;
    match (from, to) {
        (a, b) if a == b => true,
        (Open, _) => true,
        (InProgress, Pending | Urgent | Resolved | Closed) => true,
        (Pending, InProgress | Urgent | Resolved | Closed) => true,
        (Urgent, InProgress | Pending | Resolved | Closed) => true,
        (Resolved, Open | Closed) => true,
        (Closed, Open) => true,
        _ => false,
    }
}
