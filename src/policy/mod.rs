use crate::shared::error::{WorkflowError, WorkflowResult};
use crate::shared::models::{Principal, Role, Ticket};

/// Everything a caller can ask the workflow engine to do. One authorization
/// check per operation; no role string comparisons anywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateTicket,
    ViewTicket,
    ChangeStatus,
    Assign,
    PostReply,
    PostInternalNote,
    ViewInternalNotes,
    ChangeRole,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Action::CreateTicket => "create ticket",
            Action::ViewTicket => "view ticket",
            Action::ChangeStatus => "change status",
            Action::Assign => "assign ticket",
            Action::PostReply => "post reply",
            Action::PostInternalNote => "post internal note",
            Action::ViewInternalNotes => "view internal notes",
            Action::ChangeRole => "change role",
        };
        f.write_str(s)
    }
}

/// Whether `actor` may see `ticket` at all. Staff see only their own
/// tickets; specialized agents see their ticket type plus anything they
/// created or hold; agents and admins see everything.
pub fn can_view(actor: &Principal, ticket: &Ticket) -> bool {
    if ticket.created_by == actor.id {
        return true;
    }
    match actor.role.specialization() {
        Some(scope) => ticket.ticket_type == scope || ticket.assigned_to == Some(actor.id),
        None => actor.role.is_agent(),
    }
}

/// Pure decision function: never mutates state, never consults the store.
/// Denials carry the action name so the caller can report them verbatim.
pub fn authorize(
    actor: &Principal,
    action: Action,
    ticket: Option<&Ticket>,
) -> WorkflowResult<()> {
    let role = actor.role;
    let allowed = match action {
        // Any authenticated user may file a ticket, as themselves.
        Action::CreateTicket => true,
        Action::ViewTicket => ticket.map(|t| can_view(actor, t)).unwrap_or(false),
        Action::ChangeStatus | Action::Assign => {
            role.is_agent() && ticket.map(|t| can_view(actor, t)).unwrap_or(false)
        }
        Action::PostReply => match role {
            Role::Staff => ticket.map(|t| t.created_by == actor.id).unwrap_or(false),
            _ => role.is_agent() && ticket.map(|t| can_view(actor, t)).unwrap_or(false),
        },
        Action::PostInternalNote | Action::ViewInternalNotes => {
            role.is_agent() && ticket.map(|t| can_view(actor, t)).unwrap_or(false)
        }
        Action::ChangeRole => role.is_admin(),
    };
    if allowed {
        Ok(())
    } else {
        Err(WorkflowError::Forbidden(format!(
            "{role} may not {action}"
        )))
    }
}
