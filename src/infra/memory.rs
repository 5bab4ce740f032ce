//! Process-local repositories used when no database is configured and by tests.
//!
//! Rows live in ordered maps behind one mutex per table. Filtering, ordering
//! and seek semantics match the Postgres adapter so services behave the same
//! against either backend.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::pagination::PageWindow,
    application::repos::{
        ArticleQueryFilter, ArticlesRepo, ArticlesWriteRepo, CategoriesRepo, CategoriesWriteRepo,
        CreateArticleParams, CreateCategoryParams, CreateDownloadParams, DownloadQueryFilter,
        DownloadsRepo, DownloadsWriteRepo, RepoError, UpdateArticleParams, UpdateCategoryParams,
    },
    cache::lock::mutex_lock,
    domain::entities::{ArticleRecord, ArticleSummaryRecord, CategoryRecord, DownloadRecord},
    domain::types::{ArticleSort, SortOrder},
};

const SOURCE: &str = "mediawatch::infra::memory";

struct Table<T> {
    rows: BTreeMap<i64, T>,
    next_id: i64,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<T> Table<T> {
    fn allocate(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

#[derive(Default)]
pub struct InMemoryRepositories {
    articles: Mutex<Table<ArticleRecord>>,
    categories: Mutex<Table<CategoryRecord>>,
    downloads: Mutex<Table<DownloadRecord>>,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }
}

fn duplicate(constraint: &str) -> RepoError {
    RepoError::Duplicate {
        constraint: constraint.to_string(),
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

fn article_matches(record: &ArticleRecord, filter: &ArticleQueryFilter) -> bool {
    if filter
        .category_id
        .is_some_and(|category_id| record.category_id != Some(category_id))
    {
        return false;
    }
    if filter.featured.is_some_and(|featured| record.featured != featured) {
        return false;
    }
    if filter
        .published
        .is_some_and(|published| record.published != published)
    {
        return false;
    }
    match filter.search.as_deref() {
        Some(search) => {
            let needle = search.to_lowercase();
            contains_ignore_case(&record.slug, &needle)
                || contains_ignore_case(&record.title_en, &needle)
                || contains_ignore_case(&record.title_ar, &needle)
        }
        None => true,
    }
}

fn download_matches(record: &DownloadRecord, filter: &DownloadQueryFilter) -> bool {
    let category_ok = filter
        .category_id
        .is_none_or(|category_id| record.category_id == Some(category_id));
    let published_ok = filter
        .published
        .is_none_or(|published| record.published == published);
    category_ok && published_ok
}

fn clamp_offset(offset: u64) -> usize {
    usize::try_from(offset).unwrap_or(usize::MAX)
}

#[async_trait]
impl ArticlesRepo for InMemoryRepositories {
    async fn list_articles(
        &self,
        filter: &ArticleQueryFilter,
        sort: ArticleSort,
        window: PageWindow,
    ) -> Result<Vec<ArticleSummaryRecord>, RepoError> {
        let mut rows: Vec<ArticleSummaryRecord> = {
            let table = mutex_lock(&self.articles, SOURCE, "list_articles");
            table
                .rows
                .values()
                .filter(|record| article_matches(record, filter))
                .map(ArticleRecord::summary)
                .collect()
        };

        rows.sort_by(|a, b| {
            let ordering = a
                .sort_key(sort.field)
                .cmp(&b.sort_key(sort.field))
                .then(a.id.cmp(&b.id));
            match sort.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let skip = match window.seek {
            Some(_) => 0,
            None => clamp_offset(window.offset),
        };

        Ok(rows
            .into_iter()
            .filter(|row| {
                window
                    .seek
                    .is_none_or(|seek| seek.admits(row.sort_key(sort.field), row.id, sort.order))
            })
            .skip(skip)
            .take(window.fetch as usize)
            .collect())
    }

    async fn count_articles(&self, filter: &ArticleQueryFilter) -> Result<u64, RepoError> {
        let table = mutex_lock(&self.articles, SOURCE, "count_articles");
        Ok(table
            .rows
            .values()
            .filter(|record| article_matches(record, filter))
            .count() as u64)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<ArticleRecord>, RepoError> {
        let table = mutex_lock(&self.articles, SOURCE, "find_by_id");
        Ok(table.rows.get(&id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<ArticleRecord>, RepoError> {
        let table = mutex_lock(&self.articles, SOURCE, "find_by_slug");
        Ok(table.rows.values().find(|record| record.slug == slug).cloned())
    }

    async fn slug_exists(&self, slug: &str, excluding: Option<i64>) -> Result<bool, RepoError> {
        let table = mutex_lock(&self.articles, SOURCE, "slug_exists");
        Ok(table
            .rows
            .values()
            .any(|record| record.slug == slug && Some(record.id) != excluding))
    }
}

#[async_trait]
impl ArticlesWriteRepo for InMemoryRepositories {
    async fn create_article(&self, params: CreateArticleParams) -> Result<ArticleRecord, RepoError> {
        let mut table = mutex_lock(&self.articles, SOURCE, "create_article");
        if table.rows.values().any(|record| record.slug == params.slug) {
            return Err(duplicate("articles_slug_key"));
        }

        let now = OffsetDateTime::now_utc();
        let id = table.allocate();
        let record = ArticleRecord {
            id,
            slug: params.slug,
            title_en: params.title_en,
            title_ar: params.title_ar,
            excerpt_en: params.excerpt_en,
            excerpt_ar: params.excerpt_ar,
            content_en: params.content_en,
            content_ar: params.content_ar,
            meta_description_en: params.meta_description_en,
            meta_description_ar: params.meta_description_ar,
            category_id: params.category_id,
            image_url: params.image_url,
            published: params.published,
            featured: params.featured,
            reading_time: params.reading_time,
            published_at: params.published_at,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(id, record.clone());
        Ok(record)
    }

    async fn update_article(&self, params: UpdateArticleParams) -> Result<ArticleRecord, RepoError> {
        let mut table = mutex_lock(&self.articles, SOURCE, "update_article");
        if table
            .rows
            .values()
            .any(|record| record.slug == params.slug && record.id != params.id)
        {
            return Err(duplicate("articles_slug_key"));
        }

        let record = table.rows.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        record.slug = params.slug;
        record.title_en = params.title_en;
        record.title_ar = params.title_ar;
        record.excerpt_en = params.excerpt_en;
        record.excerpt_ar = params.excerpt_ar;
        record.content_en = params.content_en;
        record.content_ar = params.content_ar;
        record.meta_description_en = params.meta_description_en;
        record.meta_description_ar = params.meta_description_ar;
        record.category_id = params.category_id;
        record.image_url = params.image_url;
        record.published = params.published;
        record.featured = params.featured;
        record.reading_time = params.reading_time;
        record.published_at = params.published_at;
        record.updated_at = OffsetDateTime::now_utc();
        Ok(record.clone())
    }

    async fn delete_article(&self, id: i64) -> Result<(), RepoError> {
        let mut table = mutex_lock(&self.articles, SOURCE, "delete_article");
        table.rows.remove(&id).map(|_| ()).ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl CategoriesRepo for InMemoryRepositories {
    async fn list_categories(&self) -> Result<Vec<CategoryRecord>, RepoError> {
        let table = mutex_lock(&self.categories, SOURCE, "list_categories");
        let mut rows: Vec<CategoryRecord> = table.rows.values().cloned().collect();
        rows.sort_by(|a, b| {
            a.name_en
                .to_lowercase()
                .cmp(&b.name_en.to_lowercase())
                .then(a.id.cmp(&b.id))
        });
        Ok(rows)
    }

    async fn find_category_by_id(&self, id: i64) -> Result<Option<CategoryRecord>, RepoError> {
        let table = mutex_lock(&self.categories, SOURCE, "find_category_by_id");
        Ok(table.rows.get(&id).cloned())
    }

    async fn find_category_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<CategoryRecord>, RepoError> {
        let table = mutex_lock(&self.categories, SOURCE, "find_category_by_slug");
        Ok(table.rows.values().find(|record| record.slug == slug).cloned())
    }
}

#[async_trait]
impl CategoriesWriteRepo for InMemoryRepositories {
    async fn create_category(
        &self,
        params: CreateCategoryParams,
    ) -> Result<CategoryRecord, RepoError> {
        let mut table = mutex_lock(&self.categories, SOURCE, "create_category");
        if table.rows.values().any(|record| record.slug == params.slug) {
            return Err(duplicate("categories_slug_key"));
        }

        let id = table.allocate();
        let record = CategoryRecord {
            id,
            slug: params.slug,
            name_en: params.name_en,
            name_ar: params.name_ar,
            description_en: params.description_en,
            description_ar: params.description_ar,
            created_at: OffsetDateTime::now_utc(),
        };
        table.rows.insert(id, record.clone());
        Ok(record)
    }

    async fn update_category(
        &self,
        params: UpdateCategoryParams,
    ) -> Result<CategoryRecord, RepoError> {
        let mut table = mutex_lock(&self.categories, SOURCE, "update_category");
        if table
            .rows
            .values()
            .any(|record| record.slug == params.slug && record.id != params.id)
        {
            return Err(duplicate("categories_slug_key"));
        }

        let record = table.rows.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        record.slug = params.slug;
        record.name_en = params.name_en;
        record.name_ar = params.name_ar;
        record.description_en = params.description_en;
        record.description_ar = params.description_ar;
        Ok(record.clone())
    }

    async fn delete_category(&self, id: i64) -> Result<(), RepoError> {
        {
            let mut table = mutex_lock(&self.categories, SOURCE, "delete_category");
            if table.rows.remove(&id).is_none() {
                return Err(RepoError::NotFound);
            }
        }

        // Referencing rows keep existing without a category.
        {
            let mut articles = mutex_lock(&self.articles, SOURCE, "delete_category");
            for record in articles.rows.values_mut() {
                if record.category_id == Some(id) {
                    record.category_id = None;
                }
            }
        }
        let mut downloads = mutex_lock(&self.downloads, SOURCE, "delete_category");
        for record in downloads.rows.values_mut() {
            if record.category_id == Some(id) {
                record.category_id = None;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DownloadsRepo for InMemoryRepositories {
    async fn list_downloads(
        &self,
        filter: &DownloadQueryFilter,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<DownloadRecord>, RepoError> {
        let table = mutex_lock(&self.downloads, SOURCE, "list_downloads");
        let mut rows: Vec<DownloadRecord> = table
            .rows
            .values()
            .filter(|record| download_matches(record, filter))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(rows
            .into_iter()
            .skip(clamp_offset(offset))
            .take(limit as usize)
            .collect())
    }

    async fn count_downloads(&self, filter: &DownloadQueryFilter) -> Result<u64, RepoError> {
        let table = mutex_lock(&self.downloads, SOURCE, "count_downloads");
        Ok(table
            .rows
            .values()
            .filter(|record| download_matches(record, filter))
            .count() as u64)
    }

    async fn find_download(&self, id: i64) -> Result<Option<DownloadRecord>, RepoError> {
        let table = mutex_lock(&self.downloads, SOURCE, "find_download");
        Ok(table.rows.get(&id).cloned())
    }
}

#[async_trait]
impl DownloadsWriteRepo for InMemoryRepositories {
    async fn create_download(
        &self,
        params: CreateDownloadParams,
    ) -> Result<DownloadRecord, RepoError> {
        let mut table = mutex_lock(&self.downloads, SOURCE, "create_download");
        let id = table.allocate();
        let record = DownloadRecord {
            id,
            title_en: params.title_en,
            title_ar: params.title_ar,
            description_en: params.description_en,
            description_ar: params.description_ar,
            file_url: params.file_url,
            category_id: params.category_id,
            published: params.published,
            download_count: 0,
            created_at: OffsetDateTime::now_utc(),
        };
        table.rows.insert(id, record.clone());
        Ok(record)
    }

    async fn delete_download(&self, id: i64) -> Result<(), RepoError> {
        let mut table = mutex_lock(&self.downloads, SOURCE, "delete_download");
        table.rows.remove(&id).map(|_| ()).ok_or(RepoError::NotFound)
    }

    async fn increment_download_count(&self, id: i64) -> Result<DownloadRecord, RepoError> {
        let mut table = mutex_lock(&self.downloads, SOURCE, "increment_download_count");
        let record = table.rows.get_mut(&id).ok_or(RepoError::NotFound)?;
        record.download_count += 1;
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::application::pagination::finish_page;
    use crate::domain::types::SortField;

    fn article(slug: &str, published_at: OffsetDateTime) -> CreateArticleParams {
        CreateArticleParams {
            slug: slug.to_string(),
            title_en: slug.to_uppercase(),
            title_ar: String::new(),
            excerpt_en: String::new(),
            excerpt_ar: String::new(),
            content_en: String::new(),
            content_ar: String::new(),
            meta_description_en: None,
            meta_description_ar: None,
            category_id: None,
            image_url: None,
            published: true,
            featured: false,
            reading_time: None,
            published_at: Some(published_at),
        }
    }

    #[tokio::test]
    async fn equal_timestamps_are_ordered_by_id() {
        let repos = InMemoryRepositories::new();
        let at = datetime!(2024-03-01 08:00 UTC);
        for slug in ["a", "b", "c"] {
            repos.create_article(article(slug, at)).await.expect("seed");
        }

        let sort = ArticleSort::new(SortField::PublishedAt, SortOrder::Desc);
        let first = repos
            .list_articles(&ArticleQueryFilter::default(), sort, PageWindow::new(None, 0, 2))
            .await
            .expect("first page");
        let first = finish_page(first, 2, sort).expect("page");
        assert_eq!(first.items.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 2]);

        let cursor = first.next_cursor.expect("cursor");
        let seek = crate::application::pagination::resolve_cursor(Some(&cursor), sort.field);
        let rest = repos
            .list_articles(&ArticleQueryFilter::default(), sort, PageWindow::new(seek, 0, 2))
            .await
            .expect("second page");
        assert_eq!(rest.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1]);
    }

    #[tokio::test]
    async fn duplicate_slug_is_rejected() {
        let repos = InMemoryRepositories::new();
        let at = datetime!(2024-03-01 08:00 UTC);
        repos.create_article(article("same", at)).await.expect("seed");
        let err = repos
            .create_article(article("same", at))
            .await
            .expect_err("duplicate");
        assert!(matches!(err, RepoError::Duplicate { constraint } if constraint == "articles_slug_key"));
    }

    #[tokio::test]
    async fn deleting_a_category_detaches_its_downloads() {
        let repos = InMemoryRepositories::new();
        let category = repos
            .create_category(CreateCategoryParams {
                slug: "press".to_string(),
                name_en: "Press".to_string(),
                name_ar: "صحافة".to_string(),
                description_en: None,
                description_ar: None,
            })
            .await
            .expect("category");
        let download = repos
            .create_download(CreateDownloadParams {
                title_en: "Weekly digest".to_string(),
                title_ar: "الملخص الأسبوعي".to_string(),
                description_en: None,
                description_ar: None,
                file_url: "/files/digest.pdf".to_string(),
                category_id: Some(category.id),
                published: true,
            })
            .await
            .expect("download");

        repos.delete_category(category.id).await.expect("delete");
        let reloaded = repos
            .find_download(download.id)
            .await
            .expect("lookup")
            .expect("still present");
        assert_eq!(reloaded.category_id, None);
        assert!(matches!(
            repos.delete_category(category.id).await,
            Err(RepoError::NotFound)
        ));
    }
}
