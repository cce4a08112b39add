use axum::{response::IntoResponse, Json};

/// Error taxonomy shared by the policy, stores and the workflow engine.
/// Errors propagate unmodified to the caller; in particular `Forbidden` is
/// never downgraded to `NotFound`.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

impl WorkflowError {
    /// `Conflict` and `StoreUnavailable` are safe to retry; the caller must
    /// re-run the whole intent, never patch partial state.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkflowError::Conflict(_) | WorkflowError::StoreUnavailable(_)
        )
    }
}

impl IntoResponse for WorkflowError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let message = self.to_string();
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
