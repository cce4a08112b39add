//! School IT and facility ticketing workflow service.
//!
//! Users file tickets, agents triage and respond, admins manage roles. The
//! crate is the workflow engine behind those screens: role-based
//! authorization, ticket lifecycle, the append-only conversation log with
//! internal notes, and the domain event stream. Persistence sits behind
//! store traits; the auth provider hands us a signed bearer token.

pub mod api;
pub mod config;
pub mod identity;
pub mod notify;
pub mod policy;
pub mod shared;
pub mod store;
pub mod workflow;
