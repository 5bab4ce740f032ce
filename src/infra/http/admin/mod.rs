mod articles;
mod cache;
mod catalog;
mod health;
mod resilience;
mod state;

pub use state::AdminState;

use axum::{
    Router, middleware,
    routing::{delete, get, patch, post},
};

use super::middleware::{log_responses, set_request_context};

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route(
            "/api/admin/articles",
            get(articles::list_articles).post(articles::create_article),
        )
        .route(
            "/api/admin/articles/{id}",
            get(articles::get_article)
                .patch(articles::update_article)
                .delete(articles::delete_article),
        )
        .route("/api/admin/categories", post(catalog::create_category))
        .route(
            "/api/admin/categories/{id}",
            patch(catalog::update_category).delete(catalog::delete_category),
        )
        .route("/api/admin/downloads", post(catalog::create_download))
        .route(
            "/api/admin/downloads/{id}",
            delete(catalog::delete_download),
        )
        .route("/api/admin/cache/stats", get(cache::cache_stats))
        .route("/api/admin/cache/clear", post(cache::clear_cache))
        .route("/api/admin/cache/invalidate", post(cache::invalidate_cache))
        .route("/api/admin/resilience", get(resilience::resilience_report))
        .route("/health", get(health::admin_health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}
