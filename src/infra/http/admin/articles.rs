use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::application::admin::{CreateArticleCommand, UpdateArticleCommand};
use crate::application::articles::AdminArticleQuery;
use crate::infra::http::error::{ApiError, admin_to_api, article_to_api};

use super::AdminState;

pub(super) async fn list_articles(
    State(state): State<AdminState>,
    Query(query): Query<AdminArticleQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state
        .articles
        .admin_list(query)
        .await
        .map_err(article_to_api)?;
    Ok(Json(page))
}

pub(super) async fn get_article(
    State(state): State<AdminState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, Response> {
    let article = state.article_writes.find(id).await.map_err(admin_to_api)?;
    Ok(Json(article))
}

pub(super) async fn create_article(
    State(state): State<AdminState>,
    Json(command): Json<CreateArticleCommand>,
) -> Result<impl IntoResponse, Response> {
    let article = state
        .article_writes
        .create(command)
        .await
        .map_err(admin_to_api)?;
    Ok((StatusCode::CREATED, Json(article)))
}

pub(super) async fn update_article(
    State(state): State<AdminState>,
    Path(id): Path<i64>,
    Json(command): Json<UpdateArticleCommand>,
) -> Result<impl IntoResponse, Response> {
    let article = state
        .article_writes
        .update(id, command)
        .await
        .map_err(admin_to_api)?;
    Ok(Json(article))
}

pub(super) async fn delete_article(
    State(state): State<AdminState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, Response> {
    state
        .article_writes
        .delete(id)
        .await
        .map_err(admin_to_api)?;
    Ok(StatusCode::NO_CONTENT)
}
