use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    application::pagination::PageWindow,
    application::repos::{
        ArticleQueryFilter, ArticlesRepo, ArticlesWriteRepo, CreateArticleParams, RepoError,
        UpdateArticleParams,
    },
    domain::entities::{ArticleRecord, ArticleSummaryRecord, SortKey},
    domain::types::{ArticleSort, SortField, SortOrder},
};

use super::{PostgresRepositories, map_sqlx_error};

/// Publication order; drafts without a publication time fall back to
/// creation time so every row has a key.
const PUBLISHED_KEY_EXPR: &str = "COALESCE(published_at, created_at)";

const SUMMARY_COLUMNS: &str = "id, slug, title_en, title_ar, excerpt_en, excerpt_ar, category_id, \
     image_url, published, featured, reading_time, published_at, created_at, updated_at";

const DETAIL_COLUMNS: &str = "id, slug, title_en, title_ar, excerpt_en, excerpt_ar, content_en, \
     content_ar, meta_description_en, meta_description_ar, category_id, image_url, published, \
     featured, reading_time, published_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ArticleSummaryRow {
    id: i64,
    slug: String,
    title_en: String,
    title_ar: String,
    excerpt_en: String,
    excerpt_ar: String,
    category_id: Option<i64>,
    image_url: Option<String>,
    published: bool,
    featured: bool,
    reading_time: Option<i32>,
    published_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ArticleSummaryRow> for ArticleSummaryRecord {
    fn from(row: ArticleSummaryRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            title_en: row.title_en,
            title_ar: row.title_ar,
            excerpt_en: row.excerpt_en,
            excerpt_ar: row.excerpt_ar,
            category_id: row.category_id,
            image_url: row.image_url,
            published: row.published,
            featured: row.featured,
            reading_time: row.reading_time,
            published_at: row.published_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ArticleRow {
    id: i64,
    slug: String,
    title_en: String,
    title_ar: String,
    excerpt_en: String,
    excerpt_ar: String,
    content_en: String,
    content_ar: String,
    meta_description_en: Option<String>,
    meta_description_ar: Option<String>,
    category_id: Option<i64>,
    image_url: Option<String>,
    published: bool,
    featured: bool,
    reading_time: Option<i32>,
    published_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ArticleRow> for ArticleRecord {
    fn from(row: ArticleRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            title_en: row.title_en,
            title_ar: row.title_ar,
            excerpt_en: row.excerpt_en,
            excerpt_ar: row.excerpt_ar,
            content_en: row.content_en,
            content_ar: row.content_ar,
            meta_description_en: row.meta_description_en,
            meta_description_ar: row.meta_description_ar,
            category_id: row.category_id,
            image_url: row.image_url,
            published: row.published,
            featured: row.featured,
            reading_time: row.reading_time,
            published_at: row.published_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl PostgresRepositories {
    fn sort_expr(field: SortField) -> &'static str {
        match field {
            SortField::PublishedAt => PUBLISHED_KEY_EXPR,
            SortField::CreatedAt => "created_at",
            SortField::Id => "id",
        }
    }

    fn apply_article_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q ArticleQueryFilter) {
        if let Some(category_id) = filter.category_id {
            qb.push(" AND category_id = ");
            qb.push_bind(category_id);
        }

        if let Some(featured) = filter.featured {
            qb.push(" AND featured = ");
            qb.push_bind(featured);
        }

        if let Some(published) = filter.published {
            qb.push(" AND published = ");
            qb.push_bind(published);
        }

        if let Some(search) = filter.search.as_ref() {
            let pattern = format!("%{search}%");
            qb.push(" AND (slug ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR title_en ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR title_ar ILIKE ");
            qb.push_bind(pattern);
            qb.push(")");
        }
    }

    /// `(key, id) < (cursor key, cursor id)` for descending listings, `>` for
    /// ascending ones. Sorting by id compares the id alone.
    fn apply_seek(qb: &mut QueryBuilder<'_, Postgres>, sort: ArticleSort, window: &PageWindow) {
        let Some(seek) = window.seek else {
            return;
        };
        let comparator = match sort.order {
            SortOrder::Desc => " < ",
            SortOrder::Asc => " > ",
        };

        match (sort.field, seek.key) {
            (SortField::Id, _) | (_, SortKey::Id(_)) => {
                qb.push(" AND id");
                qb.push(comparator);
                qb.push_bind(seek.id);
            }
            (field, SortKey::Time(at)) => {
                qb.push(" AND (");
                qb.push(Self::sort_expr(field));
                qb.push(", id)");
                qb.push(comparator);
                qb.push("(");
                qb.push_bind(at);
                qb.push(", ");
                qb.push_bind(seek.id);
                qb.push(")");
            }
        }
    }
}

#[async_trait]
impl ArticlesRepo for PostgresRepositories {
    async fn list_articles(
        &self,
        filter: &ArticleQueryFilter,
        sort: ArticleSort,
        window: PageWindow,
    ) -> Result<Vec<ArticleSummaryRecord>, RepoError> {
        let mut qb = QueryBuilder::new(format!("SELECT {SUMMARY_COLUMNS} FROM articles WHERE 1=1 "));
        Self::apply_article_filter(&mut qb, filter);
        Self::apply_seek(&mut qb, sort, &window);

        let direction = sort.order.as_sql();
        qb.push(" ORDER BY ");
        qb.push(Self::sort_expr(sort.field));
        qb.push(format!(" {direction}, id {direction} "));
        qb.push(" LIMIT ");
        qb.push_bind(i64::from(window.fetch));
        if window.seek.is_none() && window.offset > 0 {
            qb.push(" OFFSET ");
            qb.push_bind(Self::convert_offset(window.offset));
        }

        let rows = qb
            .build_query_as::<ArticleSummaryRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ArticleSummaryRecord::from).collect())
    }

    async fn count_articles(&self, filter: &ArticleQueryFilter) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM articles WHERE 1=1 ");
        Self::apply_article_filter(&mut qb, filter);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<ArticleRecord>, RepoError> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {DETAIL_COLUMNS} FROM articles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ArticleRecord::from))
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<ArticleRecord>, RepoError> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {DETAIL_COLUMNS} FROM articles WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ArticleRecord::from))
    }

    async fn slug_exists(&self, slug: &str, excluding: Option<i64>) -> Result<bool, RepoError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM articles WHERE slug = $1 AND ($2::BIGINT IS NULL OR id <> $2))",
        )
        .bind(slug)
        .bind(excluding)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl ArticlesWriteRepo for PostgresRepositories {
    async fn create_article(&self, params: CreateArticleParams) -> Result<ArticleRecord, RepoError> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            "INSERT INTO articles (slug, title_en, title_ar, excerpt_en, excerpt_ar, content_en, \
                 content_ar, meta_description_en, meta_description_ar, category_id, image_url, \
                 published, featured, reading_time, published_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             RETURNING {DETAIL_COLUMNS}"
        ))
        .bind(params.slug)
        .bind(params.title_en)
        .bind(params.title_ar)
        .bind(params.excerpt_en)
        .bind(params.excerpt_ar)
        .bind(params.content_en)
        .bind(params.content_ar)
        .bind(params.meta_description_en)
        .bind(params.meta_description_ar)
        .bind(params.category_id)
        .bind(params.image_url)
        .bind(params.published)
        .bind(params.featured)
        .bind(params.reading_time)
        .bind(params.published_at)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(ArticleRecord::from(row))
    }

    async fn update_article(&self, params: UpdateArticleParams) -> Result<ArticleRecord, RepoError> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            "UPDATE articles SET slug = $2, title_en = $3, title_ar = $4, excerpt_en = $5, \
                 excerpt_ar = $6, content_en = $7, content_ar = $8, meta_description_en = $9, \
                 meta_description_ar = $10, category_id = $11, image_url = $12, published = $13, \
                 featured = $14, reading_time = $15, published_at = $16, updated_at = now() \
             WHERE id = $1 \
             RETURNING {DETAIL_COLUMNS}"
        ))
        .bind(params.id)
        .bind(params.slug)
        .bind(params.title_en)
        .bind(params.title_ar)
        .bind(params.excerpt_en)
        .bind(params.excerpt_ar)
        .bind(params.content_en)
        .bind(params.content_ar)
        .bind(params.meta_description_en)
        .bind(params.meta_description_ar)
        .bind(params.category_id)
        .bind(params.image_url)
        .bind(params.published)
        .bind(params.featured)
        .bind(params.reading_time)
        .bind(params.published_at)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(ArticleRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_article(&self, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM articles WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
