pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::shared::error::WorkflowResult;
use crate::shared::models::{Message, Principal, Role, Ticket};

pub use memory::MemoryStore;

// Atomicity is per document: each trait call either fully applies or fails
// without effect, but there are no transactions across collections. The
// workflow engine orders its cross-collection writes so an intent
// interrupted between calls degrades benignly (see the engine's `respond`
// and `transition` docs) and surfaces the failure as retryable.

/// Mutation applied to a ticket under the store's write guard. Returning an
/// error aborts the update without touching the record.
pub type TicketMutation = Box<dyn FnOnce(&mut Ticket) -> WorkflowResult<()> + Send>;

/// Ticket persistence boundary. Backed by a document store in production;
/// the in-memory implementation in `memory` is used for tests and
/// single-node deployments.
///
/// `update` is the only write path for existing tickets and must be a single
/// atomic read-modify-write: two concurrent updates may not interleave into
/// a half-applied record. `insert` fails with `Conflict` when the ticket
/// number is already taken, which keeps numbering collision-free under
/// concurrent creation. Tickets are never deleted.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn insert(&self, ticket: Ticket) -> WorkflowResult<()>;
    async fn get(&self, id: Uuid) -> WorkflowResult<Ticket>;
    async fn all(&self) -> WorkflowResult<Vec<Ticket>>;
    async fn update(&self, id: Uuid, apply: TicketMutation) -> WorkflowResult<Ticket>;
    async fn number_exists(&self, number: &str) -> WorkflowResult<bool>;
}

/// Append-only message log. Messages are never mutated or deleted;
/// `for_ticket` returns them ascending by `(created_at, id)`.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, message: Message) -> WorkflowResult<()>;
    async fn for_ticket(&self, ticket_id: Uuid) -> WorkflowResult<Vec<Message>>;
}

/// Principal records. Created once per identity, never deleted; the only
/// mutation is a role change.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    async fn get(&self, id: Uuid) -> WorkflowResult<Option<Principal>>;
    async fn insert(&self, principal: Principal) -> WorkflowResult<()>;
    async fn set_role(&self, id: Uuid, role: Role) -> WorkflowResult<Principal>;
    async fn all(&self) -> WorkflowResult<Vec<Principal>>;
}
