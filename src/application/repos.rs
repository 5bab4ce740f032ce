//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::application::pagination::{PageWindow, PaginationError};
use crate::domain::entities::{
    ArticleRecord, ArticleSummaryRecord, CategoryRecord, DownloadRecord,
};
use crate::domain::types::ArticleSort;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
    #[error(transparent)]
    Pagination(#[from] PaginationError),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Row predicates shared by the page query and the total-count query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ArticleQueryFilter {
    pub category_id: Option<i64>,
    pub featured: Option<bool>,
    pub published: Option<bool>,
    /// Case-insensitive match on slug and both titles.
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DownloadQueryFilter {
    pub category_id: Option<i64>,
    pub published: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct CreateArticleParams {
    pub slug: String,
    pub title_en: String,
    pub title_ar: String,
    pub excerpt_en: String,
    pub excerpt_ar: String,
    pub content_en: String,
    pub content_ar: String,
    pub meta_description_en: Option<String>,
    pub meta_description_ar: Option<String>,
    pub category_id: Option<i64>,
    pub image_url: Option<String>,
    pub published: bool,
    pub featured: bool,
    pub reading_time: Option<i32>,
    pub published_at: Option<OffsetDateTime>,
}

/// Fully-resolved article state to persist over an existing row.
#[derive(Debug, Clone)]
pub struct UpdateArticleParams {
    pub id: i64,
    pub slug: String,
    pub title_en: String,
    pub title_ar: String,
    pub excerpt_en: String,
    pub excerpt_ar: String,
    pub content_en: String,
    pub content_ar: String,
    pub meta_description_en: Option<String>,
    pub meta_description_ar: Option<String>,
    pub category_id: Option<i64>,
    pub image_url: Option<String>,
    pub published: bool,
    pub featured: bool,
    pub reading_time: Option<i32>,
    pub published_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct CreateCategoryParams {
    pub slug: String,
    pub name_en: String,
    pub name_ar: String,
    pub description_en: Option<String>,
    pub description_ar: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateCategoryParams {
    pub id: i64,
    pub slug: String,
    pub name_en: String,
    pub name_ar: String,
    pub description_en: Option<String>,
    pub description_ar: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateDownloadParams {
    pub title_en: String,
    pub title_ar: String,
    pub description_en: Option<String>,
    pub description_ar: Option<String>,
    pub file_url: String,
    pub category_id: Option<i64>,
    pub published: bool,
}

#[async_trait]
pub trait ArticlesRepo: Send + Sync {
    /// Rows in `sort` order inside `window`; bodies are not loaded.
    async fn list_articles(
        &self,
        filter: &ArticleQueryFilter,
        sort: ArticleSort,
        window: PageWindow,
    ) -> Result<Vec<ArticleSummaryRecord>, RepoError>;

    /// Rows matching `filter`, regardless of any cursor position.
    async fn count_articles(&self, filter: &ArticleQueryFilter) -> Result<u64, RepoError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<ArticleRecord>, RepoError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<ArticleRecord>, RepoError>;

    async fn slug_exists(&self, slug: &str, excluding: Option<i64>) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait ArticlesWriteRepo: Send + Sync {
    async fn create_article(&self, params: CreateArticleParams) -> Result<ArticleRecord, RepoError>;

    async fn update_article(&self, params: UpdateArticleParams) -> Result<ArticleRecord, RepoError>;

    async fn delete_article(&self, id: i64) -> Result<(), RepoError>;
}

#[async_trait]
pub trait CategoriesRepo: Send + Sync {
    async fn list_categories(&self) -> Result<Vec<CategoryRecord>, RepoError>;

    async fn find_category_by_id(&self, id: i64) -> Result<Option<CategoryRecord>, RepoError>;

    async fn find_category_by_slug(&self, slug: &str)
    -> Result<Option<CategoryRecord>, RepoError>;
}

#[async_trait]
pub trait CategoriesWriteRepo: Send + Sync {
    async fn create_category(
        &self,
        params: CreateCategoryParams,
    ) -> Result<CategoryRecord, RepoError>;

    async fn update_category(
        &self,
        params: UpdateCategoryParams,
    ) -> Result<CategoryRecord, RepoError>;

    async fn delete_category(&self, id: i64) -> Result<(), RepoError>;
}

#[async_trait]
pub trait DownloadsRepo: Send + Sync {
    async fn list_downloads(
        &self,
        filter: &DownloadQueryFilter,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<DownloadRecord>, RepoError>;

    async fn count_downloads(&self, filter: &DownloadQueryFilter) -> Result<u64, RepoError>;

    async fn find_download(&self, id: i64) -> Result<Option<DownloadRecord>, RepoError>;
}

#[async_trait]
pub trait DownloadsWriteRepo: Send + Sync {
    async fn create_download(
        &self,
        params: CreateDownloadParams,
    ) -> Result<DownloadRecord, RepoError>;

    async fn delete_download(&self, id: i64) -> Result<(), RepoError>;

    async fn increment_download_count(&self, id: i64) -> Result<DownloadRecord, RepoError>;
}
