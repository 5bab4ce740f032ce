mod admin;
pub mod error;
mod middleware;
mod public;

pub use admin::{AdminState, build_admin_router};
pub use public::{PublicState, build_public_router};

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sqlx::Error as SqlxError;

use crate::application::error::ErrorReport;
use crate::infra::db::PostgresRepositories;

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

/// Ping the database when one is configured; the in-memory adapter is
/// always healthy.
async fn check_database(db: Option<&Arc<PostgresRepositories>>) -> Response {
    match db {
        Some(db) => db_health_response(db.health_check().await),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
