use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::application::admin::{
    CreateCategoryCommand, CreateDownloadCommand, UpdateCategoryCommand,
};
use crate::infra::http::error::admin_to_api;

use super::AdminState;

pub(super) async fn create_category(
    State(state): State<AdminState>,
    Json(command): Json<CreateCategoryCommand>,
) -> Result<impl IntoResponse, Response> {
    let category = state
        .catalog
        .create_category(command)
        .await
        .map_err(admin_to_api)?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub(super) async fn update_category(
    State(state): State<AdminState>,
    Path(id): Path<i64>,
    Json(command): Json<UpdateCategoryCommand>,
) -> Result<impl IntoResponse, Response> {
    let category = state
        .catalog
        .update_category(id, command)
        .await
        .map_err(admin_to_api)?;
    Ok(Json(category))
}

pub(super) async fn delete_category(
    State(state): State<AdminState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, Response> {
    state
        .catalog
        .delete_category(id)
        .await
        .map_err(admin_to_api)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn create_download(
    State(state): State<AdminState>,
    Json(command): Json<CreateDownloadCommand>,
) -> Result<impl IntoResponse, Response> {
    let download = state
        .catalog
        .create_download(command)
        .await
        .map_err(admin_to_api)?;
    Ok((StatusCode::CREATED, Json(download)))
}

pub(super) async fn delete_download(
    State(state): State<AdminState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, Response> {
    state
        .catalog
        .delete_download(id)
        .await
        .map_err(admin_to_api)?;
    Ok(StatusCode::NO_CONTENT)
}
