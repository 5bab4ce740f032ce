use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;

use crate::{
    application::{
        admin::AdminCatalogService,
        articles::{ArticleListOptions, ArticleService},
        catalog::{CatalogService, DownloadListOptions},
    },
    domain::types::Language,
    infra::db::PostgresRepositories,
};

use super::{
    error::{ApiError, admin_to_api, article_to_api, catalog_to_api},
    middleware::{log_responses, set_request_context},
    check_database,
};

#[derive(Clone)]
pub struct PublicState {
    pub articles: Arc<ArticleService>,
    pub catalog: Arc<CatalogService>,
    /// Only the download counter is reachable from the public listener.
    pub downloads: Arc<AdminCatalogService>,
    pub db: Option<Arc<PostgresRepositories>>,
}

pub fn build_public_router(state: PublicState) -> Router {
    Router::new()
        .route("/api/articles", get(list_articles))
        .route("/api/articles/slug/{slug}", get(article_by_slug))
        .route("/api/articles/{id}", get(article_by_id))
        .route("/api/categories", get(list_categories))
        .route("/api/categories/{slug}", get(category_by_slug))
        .route("/api/downloads", get(list_downloads))
        .route("/api/downloads/{id}/hit", post(record_download))
        .route("/health", get(public_health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LanguageQuery {
    language: Option<Language>,
}

impl LanguageQuery {
    fn language(&self) -> Language {
        self.language.unwrap_or_default()
    }
}

async fn list_articles(
    State(state): State<PublicState>,
    Query(options): Query<ArticleListOptions>,
) -> Result<impl IntoResponse, ApiError> {
    let listing = state
        .articles
        .list(options.with_public_defaults())
        .await
        .map_err(article_to_api)?;
    Ok(Json(listing))
}

async fn article_by_id(
    State(state): State<PublicState>,
    Path(id): Path<String>,
    Query(query): Query<LanguageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let article = state
        .articles
        .by_id(&id, query.language())
        .await
        .map_err(article_to_api)?;
    Ok(Json(article))
}

async fn article_by_slug(
    State(state): State<PublicState>,
    Path(slug): Path<String>,
    Query(query): Query<LanguageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let article = state
        .articles
        .by_slug(&slug, query.language())
        .await
        .map_err(article_to_api)?;
    Ok(Json(article))
}

async fn list_categories(
    State(state): State<PublicState>,
    Query(query): Query<LanguageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let categories = state
        .catalog
        .categories(query.language())
        .await
        .map_err(catalog_to_api)?;
    Ok(Json(categories))
}

async fn category_by_slug(
    State(state): State<PublicState>,
    Path(slug): Path<String>,
    Query(query): Query<LanguageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let category = state
        .catalog
        .category_by_slug(&slug, query.language())
        .await
        .map_err(catalog_to_api)?;
    Ok(Json(category))
}

async fn list_downloads(
    State(state): State<PublicState>,
    Query(options): Query<DownloadListOptions>,
) -> Result<impl IntoResponse, ApiError> {
    let listing = state
        .catalog
        .downloads(options.with_public_defaults())
        .await
        .map_err(catalog_to_api)?;
    Ok(Json(listing))
}

async fn record_download(
    State(state): State<PublicState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, Response> {
    let download = state
        .downloads
        .record_download(id)
        .await
        .map_err(admin_to_api)?;
    Ok(Json(download))
}

async fn public_health(State(state): State<PublicState>) -> Response {
    check_database(state.db.as_ref()).await
}
