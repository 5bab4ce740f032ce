//! Category and download queries.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::dto::{CategoryView, DownloadView, PaginationMeta};
use crate::application::pagination::clamp_limit;
use crate::application::repos::{CategoriesRepo, DownloadQueryFilter, DownloadsRepo, RepoError};
use crate::cache::ReadThrough;
use crate::cache::keys::{category_list_key, category_slug_key, download_list_key};
use crate::config::PaginationSettings;
use crate::domain::entities::CategoryRecord;
use crate::domain::types::Language;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadListOptions {
    pub category_id: Option<i64>,
    pub published: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u64>,
}

impl DownloadListOptions {
    pub fn with_public_defaults(mut self) -> Self {
        self.published.get_or_insert(true);
        self
    }

    /// Resolve the page window so equivalent requests share a cache key.
    pub fn normalized(mut self, pagination: &PaginationSettings) -> Self {
        self.limit = Some(clamp_limit(
            self.limit,
            pagination.default_limit,
            pagination.max_limit,
        ));
        self.offset.get_or_insert(0);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadListing {
    pub data: Vec<DownloadView>,
    pub pagination: PaginationMeta,
}

#[derive(Clone)]
pub struct CatalogService {
    categories: Arc<dyn CategoriesRepo>,
    downloads: Arc<dyn DownloadsRepo>,
    cache: ReadThrough,
    pagination: PaginationSettings,
}

impl CatalogService {
    pub fn new(
        categories: Arc<dyn CategoriesRepo>,
        downloads: Arc<dyn DownloadsRepo>,
        cache: ReadThrough,
        pagination: PaginationSettings,
    ) -> Self {
        Self {
            categories,
            downloads,
            cache,
            pagination,
        }
    }

    /// All categories, localized. Records are cached once for both languages.
    pub async fn categories(&self, language: Language) -> Result<Vec<CategoryView>, CatalogError> {
        let ttl = self.cache.config().category_ttl();
        let records: Vec<CategoryRecord> = self
            .cache
            .fetch(&category_list_key(), ttl, || async {
                self.categories
                    .list_categories()
                    .await
                    .map_err(CatalogError::from)
            })
            .await?;

        Ok(records
            .iter()
            .map(|record| CategoryView::from_record(record, language))
            .collect())
    }

    pub async fn category_by_slug(
        &self,
        slug: &str,
        language: Language,
    ) -> Result<CategoryView, CatalogError> {
        let ttl = self.cache.config().category_ttl();
        let record: CategoryRecord = self
            .cache
            .fetch(&category_slug_key(slug), ttl, || async {
                self.categories
                    .find_category_by_slug(slug)
                    .await?
                    .ok_or(CatalogError::NotFound("category"))
            })
            .await?;
        Ok(CategoryView::from_record(&record, language))
    }

    pub async fn downloads(&self, options: DownloadListOptions) -> Result<DownloadListing, CatalogError> {
        let options = options.normalized(&self.pagination);
        let key = download_list_key(&options);
        let ttl = self.cache.config().download_ttl();
        self.cache
            .fetch(&key, ttl, || self.load_downloads(&options))
            .await
    }

    async fn load_downloads(&self, options: &DownloadListOptions) -> Result<DownloadListing, CatalogError> {
        let limit = clamp_limit(
            options.limit,
            self.pagination.default_limit,
            self.pagination.max_limit,
        );
        let offset = options.offset.unwrap_or(0);
        let filter = DownloadQueryFilter {
            category_id: options.category_id,
            published: options.published,
        };

        let rows = self.downloads.list_downloads(&filter, limit, offset).await?;
        let total = self.downloads.count_downloads(&filter).await?;

        Ok(DownloadListing {
            data: rows.iter().map(DownloadView::from).collect(),
            pagination: PaginationMeta::from_offset(total, limit, offset),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repos::{CategoriesWriteRepo, CreateCategoryParams};
    use crate::cache::{CacheConfig, CacheStore};
    use crate::infra::memory::InMemoryRepositories;

    fn service(repos: &Arc<InMemoryRepositories>) -> CatalogService {
        let config = CacheConfig::default();
        CatalogService::new(
            repos.clone(),
            repos.clone(),
            ReadThrough::new(Arc::new(CacheStore::new(&config)), config),
            PaginationSettings::default(),
        )
    }

    #[tokio::test]
    async fn categories_are_localized_from_one_cached_entry() {
        let repos = Arc::new(InMemoryRepositories::new());
        repos
            .create_category(CreateCategoryParams {
                slug: "television".to_string(),
                name_en: "Television".to_string(),
                name_ar: "تلفزيون".to_string(),
                description_en: None,
                description_ar: None,
            })
            .await
            .expect("seed category");
        let service = service(&repos);

        let english = service.categories(Language::En).await.expect("en");
        let arabic = service.categories(Language::Ar).await.expect("ar");
        assert_eq!(english[0].name, "Television");
        assert_eq!(arabic[0].name, "تلفزيون");
        assert_eq!(service.cache.store().stats().hits, 1);
    }

    #[tokio::test]
    async fn clamped_download_pages_share_one_cache_entry() {
        let repos = Arc::new(InMemoryRepositories::new());
        let service = service(&repos);

        let oversized = DownloadListOptions {
            limit: Some(500),
            ..DownloadListOptions::default()
        }
        .with_public_defaults();
        let capped = DownloadListOptions {
            limit: Some(100),
            offset: Some(0),
            ..DownloadListOptions::default()
        }
        .with_public_defaults();

        let first = service.downloads(oversized).await.expect("downloads");
        let second = service.downloads(capped).await.expect("downloads");
        assert_eq!(first, second);
        assert_eq!(first.pagination.limit, 100);

        let stats = service.cache.store().stats();
        assert_eq!((stats.hits, stats.size), (1, 1));
    }

    #[tokio::test]
    async fn unknown_category_slug_is_not_found() {
        let repos = Arc::new(InMemoryRepositories::new());
        let err = service(&repos)
            .category_by_slug("radio", Language::En)
            .await
            .expect_err("missing");
        assert!(matches!(err, CatalogError::NotFound("category")));
    }
}
