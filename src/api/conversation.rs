//! Conversation endpoints: run a turn, reset, greet, sweep

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;

use super::ApiState;
use crate::turn::{Greeting, TurnResult};

/// Build conversation router
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/loop_conversation", post(loop_conversation))
        .route("/reset_chat", post(reset_chat))
        .route("/greeting", get(greeting))
        .route("/maintenance/sweep", post(sweep))
        .with_state(state)
}

/// Run one turn; failures are reported with status 500
async fn loop_conversation(State(state): State<ApiState>) -> (StatusCode, Json<TurnResult>) {
    let result = state.orchestrator.lock().await.run_turn(&state.session).await;

    let status = if result.is_failure() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    (status, Json(result))
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub status: &'static str,
}

async fn reset_chat(State(state): State<ApiState>) -> Result<Json<ResetResponse>, ConversationError> {
    state.orchestrator.lock().await.reset(&state.session)?;
    Ok(Json(ResetResponse { status: "reset" }))
}

async fn greeting(State(state): State<ApiState>) -> Result<Json<Greeting>, ConversationError> {
    let greeting = state.orchestrator.lock().await.greeting().await?;
    Ok(Json(greeting))
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub removed: usize,
}

async fn sweep(State(state): State<ApiState>) -> Result<Json<SweepResponse>, ConversationError> {
    let removed = state.orchestrator.lock().await.sweep()?;
    Ok(Json(SweepResponse { removed }))
}

/// Any orchestrator error, reported as `{"error": "..."}` with status 500
#[derive(Debug)]
pub struct ConversationError(crate::Error);

impl From<crate::Error> for ConversationError {
    fn from(e: crate::Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ConversationError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
        }

        tracing::error!(error = %self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}
