use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::policy::{self, Action};
use crate::shared::error::{WorkflowError, WorkflowResult};
use crate::shared::models::{Principal, Role};
use crate::store::PrincipalStore;

/// Claims the external auth provider signs into the bearer token. `sub` is
/// the provider's stable subject id and doubles as the principal id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthClaims {
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    pub exp: usize,
}

/// Maps authenticated principals to local records, creating a staff-role
/// record on first sight. Principals are never deleted.
#[derive(Clone)]
pub struct IdentityResolver {
    principals: Arc<dyn PrincipalStore>,
}

impl IdentityResolver {
    pub fn new(principals: Arc<dyn PrincipalStore>) -> Self {
        Self { principals }
    }

    /// Look up the principal for a verified token, creating it with the
    /// default role if this identity has never been seen.
    pub async fn resolve(&self, claims: &AuthClaims) -> WorkflowResult<Principal> {
        let id = Uuid::parse_str(&claims.sub).map_err(|_| {
            WorkflowError::Validation(format!("token subject {:?} is not a uuid", claims.sub))
        })?;
        if let Some(principal) = self.principals.get(id).await? {
            return Ok(principal);
        }
        let display_name = claims
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| {
                claims
                    .email
                    .split('@')
                    .next()
                    .unwrap_or(&claims.email)
                    .to_string()
            });
        let principal = Principal {
            id,
            email: claims.email.clone(),
            display_name,
            role: Role::Staff,
            department: None,
            created_at: Utc::now(),
        };
        self.principals.insert(principal.clone()).await?;
        tracing::info!(principal = %principal.id, email = %principal.email, "first sign-in, staff record created");
        Ok(principal)
    }

    pub async fn get(&self, id: Uuid) -> WorkflowResult<Principal> {
        self.principals
            .get(id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("principal {id}")))
    }

    /// Admin-only role change; the single mutation principals support.
    pub async fn change_role(
        &self,
        actor: &Principal,
        user_id: Uuid,
        role: Role,
    ) -> WorkflowResult<Principal> {
        policy::authorize(actor, Action::ChangeRole, None)?;
        let updated = self.principals.set_role(user_id, role).await?;
        tracing::info!(actor = %actor.id, principal = %updated.id, role = %role, "role changed");
        Ok(updated)
    }

    /// Agent-capable principals, for the assign dialog. Visible to agents
    /// and admins only.
    pub async fn list_agents(&self, actor: &Principal) -> WorkflowResult<Vec<Principal>> {
        if !actor.role.is_agent() {
            return Err(WorkflowError::Forbidden(format!(
                "{} may not list agents",
                actor.role
            )));
        }
        let mut agents: Vec<Principal> = self
            .principals
            .all()
            .await?
            .into_iter()
            .filter(|p| p.role.is_agent())
            .collect();
        agents.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(agents)
    }

    /// Full user directory, admin only.
    pub async fn list_users(&self, actor: &Principal) -> WorkflowResult<Vec<Principal>> {
        if !actor.role.is_admin() {
            return Err(WorkflowError::Forbidden(format!(
                "{} may not list users",
                actor.role
            )));
        }
        let mut users = self.principals.all().await?;
        users.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(users)
    }
}
