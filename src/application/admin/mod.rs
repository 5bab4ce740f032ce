//! Application services for the administrative surface.
//!
//! Every write is admitted through the shared rate limiter and, once the
//! repository accepts it, invalidates the cache entries it affects.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::application::repos::RepoError;
use crate::domain::slug::{SlugAsyncError, SlugError, derive_slug, generate_unique_slug};
use crate::domain::types::ResilienceSource;
use crate::infra::resilience::{Priority, RateLimiter};

pub mod articles;
pub mod catalog;

pub use articles::{AdminArticleService, CreateArticleCommand, UpdateArticleCommand};
pub use catalog::{
    AdminCatalogService, CreateCategoryCommand, CreateDownloadCommand, UpdateCategoryCommand,
};

const ADMIN_RATE_KEY: &str = "admin";

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("{0}")]
    ConstraintViolation(&'static str),
    #[error("admin write rate exceeded, retry in {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl AdminError {
    /// Repository `NotFound` names the entity it was looking for.
    fn missing(entity: &'static str) -> impl FnOnce(RepoError) -> AdminError {
        move |err| match err {
            RepoError::NotFound => AdminError::NotFound(entity),
            other => AdminError::Repo(other),
        }
    }
}

/// Admission for admin writes, metered on the `storage` rule.
#[derive(Clone)]
pub struct WriteGate {
    limiter: Arc<RateLimiter>,
}

impl WriteGate {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }

    pub fn admit(&self) -> Result<(), AdminError> {
        let decision = self
            .limiter
            .check(ADMIN_RATE_KEY, ResilienceSource::Storage, Priority::High);
        if decision.allowed {
            return Ok(());
        }
        Err(AdminError::RateLimited {
            retry_after: decision.retry_after.unwrap_or_default(),
        })
    }
}

fn ensure_non_empty(value: &str, field: &'static str) -> Result<(), AdminError> {
    if value.trim().is_empty() {
        return Err(AdminError::ConstraintViolation(field));
    }
    Ok(())
}

fn trim_optional(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Normalize an editor-supplied slug.
fn explicit_slug(raw: &str) -> Result<String, AdminError> {
    derive_slug(raw).map_err(|_| AdminError::ConstraintViolation("slug"))
}

/// Pick a free slug derived from `source`; `is_free` is the repository check.
async fn unique_slug<F, Fut>(source: &str, field: &'static str, is_free: F) -> Result<String, AdminError>
where
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = Result<bool, RepoError>>,
{
    match generate_unique_slug(source, is_free).await {
        Ok(slug) => Ok(slug),
        Err(SlugAsyncError::Slug(err)) => match err {
            SlugError::EmptyInput | SlugError::Unrepresentable { .. } => {
                Err(AdminError::ConstraintViolation(field))
            }
            SlugError::Exhausted { .. } => Err(AdminError::ConstraintViolation("slug")),
        },
        Err(SlugAsyncError::Predicate(err)) => Err(AdminError::Repo(err)),
    }
}
