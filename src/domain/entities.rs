//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;

use crate::domain::types::{Language, SortField};

/// Full article row, bodies included. Only detail lookups load this shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleRecord {
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
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl ArticleRecord {
    pub fn content(&self, language: Language) -> &str {
        match language {
            Language::Ar if !self.content_ar.trim().is_empty() => &self.content_ar,
            _ => &self.content_en,
        }
    }

    pub fn summary(&self) -> ArticleSummaryRecord {
        ArticleSummaryRecord {
            id: self.id,
            slug: self.slug.clone(),
            title_en: self.title_en.clone(),
            title_ar: self.title_ar.clone(),
            excerpt_en: self.excerpt_en.clone(),
            excerpt_ar: self.excerpt_ar.clone(),
            category_id: self.category_id,
            image_url: self.image_url.clone(),
            published: self.published,
            featured: self.featured,
            reading_time: self.reading_time,
            published_at: self.published_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Article row as returned by list queries: no bodies, no meta descriptions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleSummaryRecord {
    pub id: i64,
    pub slug: String,
    pub title_en: String,
    pub title_ar: String,
    pub excerpt_en: String,
    pub excerpt_ar: String,
    pub category_id: Option<i64>,
    pub image_url: Option<String>,
    pub published: bool,
    pub featured: bool,
    pub reading_time: Option<i32>,
    pub published_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Value of the column a listing is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortKey {
    Time(OffsetDateTime),
    Id(i64),
}

impl ArticleSummaryRecord {
    /// Sort key for `field`. Unpublished rows order by creation time when
    /// sorted by publication time.
    pub fn sort_key(&self, field: SortField) -> SortKey {
        match field {
            SortField::PublishedAt => SortKey::Time(self.published_at.unwrap_or(self.created_at)),
            SortField::CreatedAt => SortKey::Time(self.created_at),
            SortField::Id => SortKey::Id(self.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryRecord {
    pub id: i64,
    pub slug: String,
    pub name_en: String,
    pub name_ar: String,
    pub description_en: Option<String>,
    pub description_ar: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadRecord {
    pub id: i64,
    pub title_en: String,
    pub title_ar: String,
    pub description_en: Option<String>,
    pub description_ar: Option<String>,
    pub file_url: String,
    pub category_id: Option<i64>,
    pub published: bool,
    pub download_count: i64,
    pub created_at: OffsetDateTime,
}
