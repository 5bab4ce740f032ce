use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::infra::http::error::ApiError;

use super::AdminState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct InvalidateQuery {
    pattern: Option<String>,
}

#[derive(Debug, Serialize)]
struct InvalidationResult {
    removed: usize,
}

pub(super) async fn cache_stats(State(state): State<AdminState>) -> impl IntoResponse {
    Json(state.cache.store().stats())
}

pub(super) async fn clear_cache(State(state): State<AdminState>) -> impl IntoResponse {
    let removed = state.cache.all();
    info!(
        target = "mediawatch::http::admin::cache",
        removed, "cache cleared by operator"
    );
    Json(InvalidationResult { removed })
}

/// Drop every entry whose key contains `pattern`. An empty pattern would
/// match everything and is rejected; use the clear endpoint instead.
pub(super) async fn invalidate_cache(
    State(state): State<AdminState>,
    Query(query): Query<InvalidateQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let pattern = query
        .pattern
        .as_deref()
        .map(str::trim)
        .filter(|pattern| !pattern.is_empty())
        .ok_or_else(|| {
            ApiError::bad_request(
                "Missing invalidation pattern",
                Some("pass ?pattern=<substring>".to_string()),
            )
        })?;

    let removed = state.cache.pattern(pattern);
    info!(
        target = "mediawatch::http::admin::cache",
        pattern, removed, "cache entries invalidated by operator"
    );
    Ok(Json(InvalidationResult { removed }))
}
