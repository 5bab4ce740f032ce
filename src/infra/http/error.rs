//! JSON error bodies and the mapping from service errors to HTTP statuses.

use std::time::Duration;

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::admin::AdminError;
use crate::application::articles::ArticleError;
use crate::application::catalog::CatalogError;
use crate::application::error::ErrorReport;
use crate::application::repos::RepoError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const NOT_FOUND: &str = "not_found";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const DUPLICATE: &str = "duplicate";
    pub const INVALID_ID: &str = "invalid_id";
    pub const INVALID_CURSOR: &str = "invalid_cursor";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const CONSTRAINT: &str = "constraint_violation";
    pub const INTEGRITY: &str = "integrity_error";
    pub const DB_TIMEOUT: &str = "db_timeout";
    pub const REPO: &str = "repo_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, None)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// 429 with `Retry-After` in whole seconds, rounded up.
    pub fn rate_limited(retry_after: Duration) -> Response {
        let secs = retry_after_secs(retry_after);
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: codes::RATE_LIMITED.to_string(),
                message: "Rate limit exceeded".to_string(),
                hint: Some(format!("Retry after {secs} seconds")),
            },
        };
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        ErrorReport::from_message(
            "infra::http::rate_limit",
            StatusCode::TOO_MANY_REQUESTS,
            format!("rate_limited: retry_after={secs}"),
        )
        .attach(&mut response);
        response
    }
}

fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let hint = self.hint.clone();
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message(
            "infra::http",
            self.status,
            format!("{}: {}", self.code, hint.as_deref().unwrap_or(self.message)),
        )
        .attach(&mut response);
        response
    }
}

pub fn repo_to_api(err: RepoError) -> ApiError {
    match err {
        RepoError::Duplicate { constraint } => ApiError::new(
            StatusCode::CONFLICT,
            codes::DUPLICATE,
            "Duplicate record",
            Some(constraint),
        ),
        RepoError::Pagination(p) => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_CURSOR,
            "Invalid cursor",
            Some(p.to_string()),
        ),
        RepoError::NotFound => ApiError::not_found("Resource not found"),
        RepoError::InvalidInput { message } => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid input",
            Some(message),
        ),
        RepoError::Integrity { message } => ApiError::new(
            StatusCode::CONFLICT,
            codes::INTEGRITY,
            "Integrity constraint violated",
            Some(message),
        ),
        RepoError::Timeout => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::DB_TIMEOUT,
            "Database timeout",
            None,
        ),
        RepoError::Persistence(message) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::REPO,
            "Persistence error",
            Some(message),
        ),
    }
}

pub fn article_to_api(err: ArticleError) -> ApiError {
    match err {
        ArticleError::InvalidId(raw) => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_ID,
            "Article id must be numeric",
            Some(raw),
        ),
        ArticleError::NotFound => ApiError::not_found("Article not found"),
        ArticleError::Repo(repo) => repo_to_api(repo),
    }
}

pub fn catalog_to_api(err: CatalogError) -> ApiError {
    match err {
        CatalogError::NotFound("category") => ApiError::not_found("Category not found"),
        CatalogError::NotFound(_) => ApiError::not_found("Resource not found"),
        CatalogError::Repo(repo) => repo_to_api(repo),
    }
}

pub fn admin_to_api(err: AdminError) -> Response {
    match err {
        AdminError::RateLimited { retry_after } => ApiError::rate_limited(retry_after),
        AdminError::ConstraintViolation(field) => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::CONSTRAINT,
            "Constraint violated",
            Some(field.to_string()),
        )
        .into_response(),
        AdminError::NotFound(entity) => ApiError::new(
            StatusCode::NOT_FOUND,
            codes::NOT_FOUND,
            "Resource not found",
            Some(format!("{entity} not found")),
        )
        .into_response(),
        AdminError::Repo(repo) => repo_to_api(repo).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_rounds_partial_seconds_up() {
        assert_eq!(retry_after_secs(Duration::from_millis(1500)), 2);
        assert_eq!(retry_after_secs(Duration::from_secs(3)), 3);
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
    }

    #[test]
    fn rate_limited_response_sets_retry_after_header() {
        let response = ApiError::rate_limited(Duration::from_millis(200));
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok()),
            Some("1")
        );
        assert!(response.extensions().get::<ErrorReport>().is_some());
    }

    #[test]
    fn invalid_article_id_maps_to_bad_request() {
        let err = article_to_api(ArticleError::InvalidId("abc".to_string()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn duplicate_slug_maps_to_conflict() {
        let err = repo_to_api(RepoError::Duplicate {
            constraint: "articles_slug_key".to_string(),
        });
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}
