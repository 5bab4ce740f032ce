use axum::{Json, extract::State, response::IntoResponse};

use super::AdminState;

pub(super) async fn resilience_report(State(state): State<AdminState>) -> impl IntoResponse {
    Json(state.resilience.report())
}
