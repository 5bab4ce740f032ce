use axum::{extract::State, response::Response};

use super::super::check_database;
use super::AdminState;

pub(super) async fn admin_health(State(state): State<AdminState>) -> Response {
    check_database(state.db.as_ref()).await
}
