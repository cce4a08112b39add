use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::{self, Next},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, put},
    Extension, Json, Router,
};
use futures::{Stream, StreamExt};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::identity::AuthClaims;
use crate::shared::error::WorkflowError;
use crate::shared::models::{
    Message, Principal, Role, Ticket, TicketDraft, TicketStats, TicketStatus,
};
use crate::shared::state::AppState;
use crate::workflow::{TicketFilter, TransitionRequest};

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: TicketStatus,
}

#[derive(Debug, Deserialize)]
pub struct AssignTicketRequest {
    pub assignee_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub body: String,
    #[serde(default)]
    pub is_internal: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: Role,
}

/// Verifies the bearer token the auth provider issued and attaches the
/// resolved principal to the request. Everything under /api requires it.
pub async fn require_principal(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| (StatusCode::UNAUTHORIZED, "missing bearer token".to_string()))?;

    let key = DecodingKey::from_secret(state.config.auth.token_secret.as_bytes());
    let data = decode::<AuthClaims>(token, &key, &Validation::new(Algorithm::HS256))
        .map_err(|e| (StatusCode::UNAUTHORIZED, format!("invalid token: {e}")))?;

    let principal = state
        .engine
        .identity()
        .resolve(&data.claims)
        .await
        .map_err(|e| (StatusCode::UNAUTHORIZED, format!("identity rejected: {e}")))?;

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

async fn me(Extension(principal): Extension<Principal>) -> Json<Principal> {
    Json(principal)
}

async fn create_ticket(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(draft): Json<TicketDraft>,
) -> Result<impl IntoResponse, WorkflowError> {
    let ticket = state.engine.file_ticket(&principal, draft).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(filter): Query<TicketFilter>,
) -> Result<Json<Vec<Ticket>>, WorkflowError> {
    Ok(Json(state.engine.list_tickets(&principal, &filter).await?))
}

async fn ticket_stats(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<TicketStats>, WorkflowError> {
    Ok(Json(state.engine.stats(&principal).await?))
}

async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ticket>, WorkflowError> {
    Ok(Json(state.engine.get_ticket(&principal, id).await?))
}

async fn change_status(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangeStatusRequest>,
) -> Result<Json<Ticket>, WorkflowError> {
    let ticket = state
        .engine
        .transition(
            &principal,
            id,
            TransitionRequest {
                assign_to: None,
                status: Some(req.status),
            },
        )
        .await?;
    Ok(Json(ticket))
}

async fn assign_ticket(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignTicketRequest>,
) -> Result<Json<Ticket>, WorkflowError> {
    let ticket = state
        .engine
        .transition(
            &principal,
            id,
            TransitionRequest {
                assign_to: Some(req.assignee_id),
                status: None,
            },
        )
        .await?;
    Ok(Json(ticket))
}

async fn assign_to_me(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ticket>, WorkflowError> {
    Ok(Json(state.engine.assign_to_me(&principal, id).await?))
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Message>>, WorkflowError> {
    Ok(Json(state.engine.list_messages(&principal, id).await?))
}

async fn post_message(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(req): Json<PostMessageRequest>,
) -> Result<impl IntoResponse, WorkflowError> {
    let message = state
        .engine
        .respond(&principal, id, &req.body, req.is_internal)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Live event stream for ticket list refreshes. Events pass through the
/// same visibility boundary as reads before they hit the wire, so a
/// subscriber never learns about a ticket `list`/`get` would hide.
async fn ticket_events(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.engine.subscribe()).filter_map(move |item| {
        let state = state.clone();
        let principal = principal.clone();
        async move {
            match item {
                Ok(event) if state.engine.event_visible(&principal, &event).await => {
                    Event::default().json_data(&event).ok().map(Ok)
                }
                // Hidden event, or a lagged subscriber: skip, keep streaming.
                _ => None,
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn list_agents(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Principal>>, WorkflowError> {
    Ok(Json(state.engine.identity().list_agents(&principal).await?))
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Principal>>, WorkflowError> {
    Ok(Json(state.engine.identity().list_users(&principal).await?))
}

async fn change_role(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangeRoleRequest>,
) -> Result<Json<Principal>, WorkflowError> {
    let updated = state
        .engine
        .identity()
        .change_role(&principal, id, req.role)
        .await?;
    Ok(Json(updated))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/me", get(me))
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route("/api/tickets/stats", get(ticket_stats))
        .route("/api/tickets/events", get(ticket_events))
        .route("/api/tickets/:id", get(get_ticket))
        .route("/api/tickets/:id/status", put(change_status))
        .route("/api/tickets/:id/assign", put(assign_ticket))
        .route("/api/tickets/:id/assign/me", put(assign_to_me))
        .route(
            "/api/tickets/:id/messages",
            get(list_messages).post(post_message),
        )
        .route("/api/users", get(list_users))
        .route("/api/users/agents", get(list_agents))
        .route("/api/users/:id/role", put(change_role))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_principal,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
