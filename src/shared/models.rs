use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed role set. Capability checks live in `crate::policy`; nothing else
/// is allowed to branch on raw role strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Staff,
    Agent,
    ItAgent,
    FacilityAgent,
    Admin,
}

impl Role {
    /// Agent-capable roles: everything that may triage tickets.
    pub fn is_agent(self) -> bool {
        matches!(
            self,
            Role::Agent | Role::ItAgent | Role::FacilityAgent | Role::Admin
        )
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }

    /// Ticket type a specialized agent is scoped to, if any.
    pub fn specialization(self) -> Option<TicketType> {
        match self {
            Role::ItAgent => Some(TicketType::ItSupport),
            Role::FacilityAgent => Some(TicketType::Facility),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Staff => "staff",
            Role::Agent => "agent",
            Role::ItAgent => "it-agent",
            Role::FacilityAgent => "facility-agent",
            Role::Admin => "admin",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketType {
    #[serde(rename = "IT Support")]
    ItSupport,
    Facility,
}

impl std::fmt::Display for TicketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketType::ItSupport => f.write_str("IT Support"),
            TicketType::Facility => f.write_str("Facility"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketStatus {
    Open,
    #[serde(rename = "In Progress")]
    InProgress,
    Pending,
    Resolved,
    Closed,
    Urgent,
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TicketStatus::Open => "Open",
            TicketStatus::InProgress => "In Progress",
            TicketStatus::Pending => "Pending",
            TicketStatus::Resolved => "Resolved",
            TicketStatus::Closed => "Closed",
            TicketStatus::Urgent => "Urgent",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Critical => "Critical",
        };
        f.write_str(s)
    }
}

/// An authenticated identity. Created on first sight with `Role::Staff`,
/// never deleted; only an admin role change mutates it afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub department: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    /// Human-displayable, unique, immutable (e.g. "ECPS-042117").
    pub number: String,
    pub ticket_type: TicketType,
    pub subject: String,
    pub description: String,
    pub category: String,
    pub status: TicketStatus,
    pub priority: Priority,
    pub created_by: Uuid,
    pub created_by_name: String,
    pub created_by_email: String,
    /// Set and cleared together with `assigned_to_name`; the name is a
    /// snapshot of the agent's display name at assignment time.
    pub assigned_to: Option<Uuid>,
    pub assigned_to_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied fields for a new ticket; everything else (number, status,
/// creator snapshot, timestamps) is filled in by the workflow engine.
#[derive(Debug, Clone, Deserialize)]
pub struct TicketDraft {
    #[serde(rename = "type")]
    pub ticket_type: TicketType,
    pub subject: String,
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_priority")]
    pub priority: Priority,
}

fn default_priority() -> Priority {
    Priority::Medium
}

/// One entry in a ticket's conversation. Append-only: never mutated or
/// deleted once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub sender_role: Role,
    pub body: String,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}

/// Dashboard counters over the actor-visible ticket set.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TicketStats {
    pub total: i64,
    pub open: i64,
    pub in_progress: i64,
    pub pending: i64,
    pub resolved: i64,
    pub closed: i64,
    pub urgent: i64,
}
