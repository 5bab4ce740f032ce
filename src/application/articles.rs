//! Cache-aware article queries for the public and admin surfaces.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::dto::{ArticleAdminListItem, ArticleDetail, ArticleListItem, PaginationMeta};
use crate::application::pagination::{
    PageWindow, PaginationError, clamp_limit, finish_page, resolve_cursor,
};
use crate::application::repos::{ArticleQueryFilter, ArticlesRepo, RepoError};
use crate::cache::ReadThrough;
use crate::cache::keys::{article_detail_key, article_list_key, article_slug_key};
use crate::config::PaginationSettings;
use crate::domain::types::{ArticleSort, Language, SortField, SortOrder};

#[derive(Debug, Error)]
pub enum ArticleError {
    #[error("article id `{0}` is not a number")]
    InvalidId(String),
    #[error("article not found")]
    NotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<PaginationError> for ArticleError {
    fn from(err: PaginationError) -> Self {
        ArticleError::Repo(RepoError::from(err))
    }
}

/// Public listing parameters as received. Absent fields keep their defaults
/// and are part of the cache key as given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleListOptions {
    pub category_id: Option<i64>,
    pub featured: Option<bool>,
    pub published: Option<bool>,
    pub language: Option<Language>,
    pub limit: Option<u32>,
    pub offset: Option<u64>,
    pub sort_by: Option<SortField>,
    pub sort_order: Option<SortOrder>,
    pub cursor: Option<String>,
    pub paginated: Option<bool>,
}

impl ArticleListOptions {
    /// Readers only see published articles unless they ask otherwise.
    pub fn with_public_defaults(mut self) -> Self {
        self.published.get_or_insert(true);
        self
    }

    /// Fill in defaults, clamp the page size and zero the offset when a
    /// cursor is present. Requests that load the same page normalize to the
    /// same options, and so to the same cache key.
    pub fn normalized(mut self, pagination: &PaginationSettings) -> Self {
        self.language.get_or_insert_default();
        self.limit = Some(clamp_limit(
            self.limit,
            pagination.default_limit,
            pagination.max_limit,
        ));
        self.sort_by.get_or_insert_default();
        self.sort_order.get_or_insert_default();
        self.paginated.get_or_insert(false);
        self.cursor = self
            .cursor
            .map(|cursor| cursor.trim().to_string())
            .filter(|cursor| !cursor.is_empty());
        self.offset = match self.cursor {
            Some(_) => Some(0),
            None => Some(self.offset.unwrap_or(0)),
        };
        self
    }

    fn sort(&self) -> ArticleSort {
        ArticleSort::new(
            self.sort_by.unwrap_or_default(),
            self.sort_order.unwrap_or_default(),
        )
    }

    fn filter(&self) -> ArticleQueryFilter {
        ArticleQueryFilter {
            category_id: self.category_id,
            featured: self.featured,
            published: self.published,
            search: None,
        }
    }
}

/// Public listing body: a bare array for legacy clients, an envelope when
/// `paginated=true`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArticleListing {
    Flat(Vec<ArticleListItem>),
    Paged {
        data: Vec<ArticleListItem>,
        pagination: PaginationMeta,
    },
}

impl ArticleListing {
    pub fn items(&self) -> &[ArticleListItem] {
        match self {
            ArticleListing::Flat(items) => items,
            ArticleListing::Paged { data, .. } => data,
        }
    }

    pub fn pagination(&self) -> Option<&PaginationMeta> {
        match self {
            ArticleListing::Flat(_) => None,
            ArticleListing::Paged { pagination, .. } => Some(pagination),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminArticleQuery {
    pub category_id: Option<i64>,
    pub featured: Option<bool>,
    pub published: Option<bool>,
    pub search: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u64>,
    pub cursor: Option<String>,
    pub sort_by: Option<SortField>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminArticlePage {
    pub data: Vec<ArticleAdminListItem>,
    pub pagination: PaginationMeta,
}

#[derive(Clone)]
pub struct ArticleService {
    repo: Arc<dyn ArticlesRepo>,
    cache: ReadThrough,
    pagination: PaginationSettings,
}

impl ArticleService {
    pub fn new(
        repo: Arc<dyn ArticlesRepo>,
        cache: ReadThrough,
        pagination: PaginationSettings,
    ) -> Self {
        Self {
            repo,
            cache,
            pagination,
        }
    }

    pub async fn list(&self, options: ArticleListOptions) -> Result<ArticleListing, ArticleError> {
        let options = options.normalized(&self.pagination);
        let key = article_list_key(&options);
        let ttl = self.cache.config().default_ttl();
        self.cache
            .fetch(&key, ttl, || self.load_listing(&options))
            .await
    }

    pub async fn by_id(&self, raw_id: &str, language: Language) -> Result<ArticleDetail, ArticleError> {
        let id = raw_id
            .trim()
            .parse::<i64>()
            .map_err(|_| ArticleError::InvalidId(raw_id.to_string()))?;

        let key = article_detail_key(id, language);
        let ttl = self.cache.config().detail_ttl();
        self.cache
            .fetch(&key, ttl, || async {
                let record = self.repo.find_by_id(id).await?.ok_or(ArticleError::NotFound)?;
                Ok::<_, ArticleError>(ArticleDetail::from_record(&record, language))
            })
            .await
    }

    pub async fn by_slug(&self, slug: &str, language: Language) -> Result<ArticleDetail, ArticleError> {
        let key = article_slug_key(slug, language);
        let ttl = self.cache.config().detail_ttl();
        self.cache
            .fetch(&key, ttl, || async {
                let record = self
                    .repo
                    .find_by_slug(slug)
                    .await?
                    .ok_or(ArticleError::NotFound)?;
                Ok::<_, ArticleError>(ArticleDetail::from_record(&record, language))
            })
            .await
    }

    /// Editorial listing over drafts and published rows alike. Never cached.
    pub async fn admin_list(&self, query: AdminArticleQuery) -> Result<AdminArticlePage, ArticleError> {
        let sort = ArticleSort::new(
            query.sort_by.unwrap_or_default(),
            query.sort_order.unwrap_or_default(),
        );
        let limit = self.clamp(query.limit);
        let offset = query.offset.unwrap_or(0);
        let filter = ArticleQueryFilter {
            category_id: query.category_id,
            featured: query.featured,
            published: query.published,
            search: query
                .search
                .as_deref()
                .map(str::trim)
                .filter(|term| !term.is_empty())
                .map(str::to_string),
        };

        let seek = resolve_cursor(query.cursor.as_deref(), sort.field);
        let rows = self
            .repo
            .list_articles(&filter, sort, PageWindow::new(seek, offset, limit))
            .await?;
        let page = finish_page(rows, limit, sort)?;
        let total = self.repo.count_articles(&filter).await?;

        Ok(AdminArticlePage {
            data: page.items.iter().map(ArticleAdminListItem::from_summary).collect(),
            pagination: envelope(total, limit, offset, seek.is_some(), page.has_next, page.next_cursor),
        })
    }

    async fn load_listing(&self, options: &ArticleListOptions) -> Result<ArticleListing, ArticleError> {
        let language = options.language.unwrap_or_default();
        let sort = options.sort();
        let filter = options.filter();
        let limit = self.clamp(options.limit);
        let offset = options.offset.unwrap_or(0);

        let seek = resolve_cursor(options.cursor.as_deref(), sort.field);
        let rows = self
            .repo
            .list_articles(&filter, sort, PageWindow::new(seek, offset, limit))
            .await?;
        let page = finish_page(rows, limit, sort)?;
        let data: Vec<ArticleListItem> = page
            .items
            .iter()
            .map(|row| ArticleListItem::from_summary(row, language))
            .collect();

        if !options.paginated.unwrap_or(false) {
            return Ok(ArticleListing::Flat(data));
        }

        let total = self.repo.count_articles(&filter).await?;
        let pagination = envelope(total, limit, offset, seek.is_some(), page.has_next, page.next_cursor);
        Ok(ArticleListing::Paged { data, pagination })
    }

    fn clamp(&self, requested: Option<u32>) -> u32 {
        clamp_limit(
            requested,
            self.pagination.default_limit,
            self.pagination.max_limit,
        )
    }
}

/// Offset arithmetic unless the page was reached through a cursor. Offset
/// pages still hand out a cursor so clients can switch to seeking.
fn envelope(
    total: u64,
    limit: u32,
    offset: u64,
    seeked: bool,
    has_next: bool,
    next_cursor: Option<String>,
) -> PaginationMeta {
    if seeked {
        return PaginationMeta::for_cursor(total, limit, has_next, next_cursor, true);
    }
    PaginationMeta {
        next_cursor,
        ..PaginationMeta::from_offset(total, limit, offset)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::application::repos::{ArticlesWriteRepo, CreateArticleParams};
    use crate::cache::{CacheConfig, CacheStore};
    use crate::infra::memory::InMemoryRepositories;

    async fn service_with(count: usize) -> (ArticleService, Arc<InMemoryRepositories>) {
        let repos = Arc::new(InMemoryRepositories::new());
        for n in 1..=count {
            repos
                .create_article(CreateArticleParams {
                    slug: format!("brief-{n}"),
                    title_en: format!("Brief {n}"),
                    title_ar: format!("موجز {n}"),
                    excerpt_en: String::new(),
                    excerpt_ar: String::new(),
                    content_en: "morning press review".to_string(),
                    content_ar: String::new(),
                    meta_description_en: None,
                    meta_description_ar: None,
                    category_id: None,
                    image_url: None,
                    published: n % 2 == 1,
                    featured: false,
                    reading_time: Some(1),
                    published_at: Some(datetime!(2024-01-01 00:00 UTC) + time::Duration::hours(n as i64)),
                })
                .await
                .expect("seed article");
        }
        let config = CacheConfig::default();
        let cache = ReadThrough::new(Arc::new(CacheStore::new(&config)), config);
        (
            ArticleService::new(repos.clone(), cache, PaginationSettings::default()),
            repos,
        )
    }

    #[tokio::test]
    async fn non_numeric_id_is_rejected_before_lookup() {
        let (service, _) = service_with(1).await;
        let err = service.by_id("abc", Language::En).await.expect_err("invalid id");
        assert!(matches!(err, ArticleError::InvalidId(raw) if raw == "abc"));
    }

    #[tokio::test]
    async fn missing_article_is_not_cached() {
        let (service, _) = service_with(0).await;
        let err = service.by_id("42", Language::En).await.expect_err("missing");
        assert!(matches!(err, ArticleError::NotFound));
        assert!(!service.cache.store().has(&article_detail_key(42, Language::En)));
    }

    #[tokio::test]
    async fn legacy_listing_is_a_flat_array() {
        let (service, _) = service_with(3).await;
        let listing = service
            .list(ArticleListOptions::default().with_public_defaults())
            .await
            .expect("listing");
        assert!(listing.pagination().is_none());
        let ids: Vec<i64> = listing.items().iter().map(|item| item.id).collect();
        assert_eq!(ids, vec![3, 1]);

        let json = serde_json::to_value(&listing).expect("serialize");
        assert!(json.is_array());
    }

    #[tokio::test]
    async fn paginated_listing_carries_envelope() {
        let (service, _) = service_with(5).await;
        let listing = service
            .list(ArticleListOptions {
                limit: Some(2),
                paginated: Some(true),
                ..ArticleListOptions::default()
            })
            .await
            .expect("listing");
        let meta = listing.pagination().expect("envelope");
        assert_eq!(meta.total, 5);
        assert_eq!(meta.total_pages, 3);
        assert!(meta.has_next);
        assert!(meta.next_cursor.is_some());
        assert_eq!(listing.items().len(), 2);
    }

    #[test]
    fn normalization_resolves_defaults_and_clamps() {
        let settings = PaginationSettings::default();
        let implicit = ArticleListOptions::default().normalized(&settings);
        let explicit = ArticleListOptions {
            language: Some(Language::En),
            limit: Some(10),
            offset: Some(0),
            sort_by: Some(SortField::PublishedAt),
            sort_order: Some(SortOrder::Desc),
            paginated: Some(false),
            ..ArticleListOptions::default()
        }
        .normalized(&settings);
        assert_eq!(implicit, explicit);

        let oversized = ArticleListOptions {
            limit: Some(500),
            ..ArticleListOptions::default()
        }
        .normalized(&settings);
        assert_eq!(oversized.limit, Some(settings.max_limit));

        let seeking = ArticleListOptions {
            cursor: Some(" abc ".to_string()),
            offset: Some(40),
            ..ArticleListOptions::default()
        }
        .normalized(&settings);
        assert_eq!(seeking.cursor.as_deref(), Some("abc"));
        assert_eq!(seeking.offset, Some(0));

        let blank_cursor = ArticleListOptions {
            cursor: Some("  ".to_string()),
            offset: Some(20),
            ..ArticleListOptions::default()
        }
        .normalized(&settings);
        assert_eq!(blank_cursor.cursor, None);
        assert_eq!(blank_cursor.offset, Some(20));
    }

    #[tokio::test]
    async fn equivalent_listings_share_one_cache_entry() {
        let (service, _) = service_with(3).await;
        let implicit = ArticleListOptions::default().with_public_defaults();
        let explicit = ArticleListOptions {
            language: Some(Language::En),
            limit: Some(10),
            offset: Some(0),
            sort_by: Some(SortField::PublishedAt),
            sort_order: Some(SortOrder::Desc),
            paginated: Some(false),
            ..ArticleListOptions::default()
        }
        .with_public_defaults();

        let first = service.list(implicit).await.expect("listing");
        let second = service.list(explicit).await.expect("listing");
        assert_eq!(first, second);

        let stats = service.cache.store().stats();
        assert_eq!((stats.hits, stats.misses, stats.size), (1, 1, 1));
    }

    #[tokio::test]
    async fn admin_list_searches_titles_and_sees_drafts() {
        let (service, _) = service_with(12).await;
        let page = service
            .admin_list(AdminArticleQuery {
                search: Some("brief 1".to_string()),
                sort_by: Some(SortField::Id),
                sort_order: Some(SortOrder::Asc),
                ..AdminArticleQuery::default()
            })
            .await
            .expect("admin page");
        let ids: Vec<i64> = page.data.iter().map(|row| row.item.id).collect();
        assert_eq!(ids, vec![1, 10, 11, 12]);
        assert!(page.data.iter().any(|row| !row.published));
        assert!(service.cache.store().is_empty());
    }
}
