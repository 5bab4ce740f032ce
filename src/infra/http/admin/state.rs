use std::sync::Arc;

use crate::application::admin::{AdminArticleService, AdminCatalogService};
use crate::application::articles::ArticleService;
use crate::cache::CacheInvalidation;
use crate::infra::{db::PostgresRepositories, resilience::ResilienceRegistry};

#[derive(Clone)]
pub struct AdminState {
    pub db: Option<Arc<PostgresRepositories>>,
    /// Read side of the article listing; admin queries bypass the cache.
    pub articles: Arc<ArticleService>,
    pub article_writes: Arc<AdminArticleService>,
    pub catalog: Arc<AdminCatalogService>,
    pub cache: CacheInvalidation,
    pub resilience: Arc<ResilienceRegistry>,
}
