//! Response shapes and the transforms from persisted records.
//!
//! Views nest: a list item is a subset of a detail view, which is a subset of
//! the admin view. Lists never carry article bodies.

use serde::Serialize;
use time::OffsetDateTime;

use crate::domain::articles::reading_time_minutes;
use crate::domain::entities::{ArticleRecord, ArticleSummaryRecord, CategoryRecord, DownloadRecord};
use crate::domain::types::Language;

fn localized<'a>(language: Language, en: &'a str, ar: &'a str) -> &'a str {
    match language {
        Language::Ar if !ar.trim().is_empty() => ar,
        _ => en,
    }
}

fn stored_reading_time(value: Option<i32>) -> Option<u32> {
    value.and_then(|minutes| u32::try_from(minutes).ok())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleListItem {
    pub id: i64,
    pub slug: String,
    /// Title in the requested language, English when no translation exists.
    pub title: String,
    pub excerpt: String,
    pub title_en: String,
    pub title_ar: String,
    pub excerpt_en: String,
    pub excerpt_ar: String,
    pub category_id: Option<i64>,
    pub featured: bool,
    pub image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    pub reading_time: Option<u32>,
}

impl ArticleListItem {
    pub fn from_summary(record: &ArticleSummaryRecord, language: Language) -> Self {
        Self {
            id: record.id,
            slug: record.slug.clone(),
            title: localized(language, &record.title_en, &record.title_ar).to_string(),
            excerpt: localized(language, &record.excerpt_en, &record.excerpt_ar).to_string(),
            title_en: record.title_en.clone(),
            title_ar: record.title_ar.clone(),
            excerpt_en: record.excerpt_en.clone(),
            excerpt_ar: record.excerpt_ar.clone(),
            category_id: record.category_id,
            featured: record.featured,
            image_url: record.image_url.clone(),
            published_at: record.published_at,
            reading_time: stored_reading_time(record.reading_time),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleDetail {
    #[serde(flatten)]
    pub summary: ArticleListItem,
    pub content: String,
    pub content_en: String,
    pub content_ar: String,
    pub meta_description_en: Option<String>,
    pub meta_description_ar: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ArticleDetail {
    /// Detail view; reading time is derived from the served body when the
    /// stored value is missing.
    pub fn from_record(record: &ArticleRecord, language: Language) -> Self {
        let content = record.content(language);
        let mut summary = ArticleListItem::from_summary(&record.summary(), language);
        summary.reading_time = Some(
            summary
                .reading_time
                .unwrap_or_else(|| reading_time_minutes(content)),
        );

        Self {
            summary,
            content: content.to_string(),
            content_en: record.content_en.clone(),
            content_ar: record.content_ar.clone(),
            meta_description_en: record.meta_description_en.clone(),
            meta_description_ar: record.meta_description_ar.clone(),
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleAdmin {
    #[serde(flatten)]
    pub detail: ArticleDetail,
    pub published: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl ArticleAdmin {
    pub fn from_record(record: &ArticleRecord) -> Self {
        Self {
            detail: ArticleDetail::from_record(record, Language::En),
            published: record.published,
            created_at: record.created_at,
        }
    }
}

/// Admin listing row: list item plus editorial state, still without bodies.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleAdminListItem {
    #[serde(flatten)]
    pub item: ArticleListItem,
    pub published: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ArticleAdminListItem {
    pub fn from_summary(record: &ArticleSummaryRecord) -> Self {
        Self {
            item: ArticleListItem::from_summary(record, Language::En),
            published: record.published,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryView {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub name_en: String,
    pub name_ar: String,
    pub description_en: Option<String>,
    pub description_ar: Option<String>,
}

impl CategoryView {
    pub fn from_record(record: &CategoryRecord, language: Language) -> Self {
        Self {
            id: record.id,
            slug: record.slug.clone(),
            name: localized(language, &record.name_en, &record.name_ar).to_string(),
            name_en: record.name_en.clone(),
            name_ar: record.name_ar.clone(),
            description_en: record.description_en.clone(),
            description_ar: record.description_ar.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadView {
    pub id: i64,
    pub title_en: String,
    pub title_ar: String,
    pub description_en: Option<String>,
    pub description_ar: Option<String>,
    pub file_url: String,
    pub category_id: Option<i64>,
    pub download_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&DownloadRecord> for DownloadView {
    fn from(record: &DownloadRecord) -> Self {
        Self {
            id: record.id,
            title_en: record.title_en.clone(),
            title_ar: record.title_ar.clone(),
            description_en: record.description_en.clone(),
            description_ar: record.description_ar.clone(),
            file_url: record.file_url.clone(),
            category_id: record.category_id,
            download_count: record.download_count,
            created_at: record.created_at,
        }
    }
}

/// Envelope metadata for paginated listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub total: u64,
    pub limit: u32,
    pub offset: u64,
    pub has_next: bool,
    pub has_prev: bool,
    pub total_pages: u64,
    pub current_page: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl PaginationMeta {
    pub fn from_offset(total: u64, limit: u32, offset: u64) -> Self {
        let limit = limit.max(1);
        let step = u64::from(limit);
        let total_pages = total.div_ceil(step);
        let mut current_page = offset / step + 1;
        if total > 0 {
            current_page = current_page.min(total_pages);
        }

        Self {
            total,
            limit,
            offset,
            has_next: offset.saturating_add(step) < total,
            has_prev: offset > 0,
            total_pages,
            current_page,
            next_cursor: None,
        }
    }

    /// Cursor listings know whether more rows follow but not their position,
    /// so `has_prev` only reflects whether a cursor was supplied.
    pub fn for_cursor(
        total: u64,
        limit: u32,
        has_next: bool,
        next_cursor: Option<String>,
        had_cursor: bool,
    ) -> Self {
        let limit = limit.max(1);
        Self {
            total,
            limit,
            offset: 0,
            has_next,
            has_prev: had_cursor,
            total_pages: total.div_ceil(u64::from(limit)),
            current_page: 1,
            next_cursor,
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn record() -> ArticleRecord {
        ArticleRecord {
            id: 7,
            slug: "weekly-digest".to_string(),
            title_en: "Weekly digest".to_string(),
            title_ar: "الملخص الأسبوعي".to_string(),
            excerpt_en: "Top stories".to_string(),
            excerpt_ar: String::new(),
            content_en: vec!["word"; 450].join(" "),
            content_ar: String::new(),
            meta_description_en: Some("meta".to_string()),
            meta_description_ar: None,
            category_id: Some(2),
            image_url: None,
            published: true,
            featured: false,
            reading_time: None,
            published_at: Some(datetime!(2024-04-01 09:00 UTC)),
            created_at: datetime!(2024-03-30 09:00 UTC),
            updated_at: datetime!(2024-04-02 09:00 UTC),
        }
    }

    #[test]
    fn offset_envelope_arithmetic() {
        let meta = PaginationMeta::from_offset(53, 20, 40);
        assert!(!meta.has_next);
        assert!(meta.has_prev);
        assert_eq!(meta.total_pages, 3);
        assert_eq!(meta.current_page, 3);
    }

    #[test]
    fn current_page_is_clamped_past_the_end() {
        let meta = PaginationMeta::from_offset(5, 10, 100);
        assert_eq!(meta.total_pages, 1);
        assert_eq!(meta.current_page, 1);
        assert!(!meta.has_next);
    }

    #[test]
    fn empty_listing_has_no_pages() {
        let meta = PaginationMeta::from_offset(0, 10, 0);
        assert_eq!(meta.total_pages, 0);
        assert_eq!(meta.current_page, 1);
        assert!(!meta.has_next);
        assert!(!meta.has_prev);
    }

    #[test]
    fn detail_derives_missing_reading_time_from_served_body() {
        let detail = ArticleDetail::from_record(&record(), Language::Ar);
        assert_eq!(detail.summary.reading_time, Some(3));
        assert_eq!(detail.summary.title, "الملخص الأسبوعي");
        // Arabic excerpt is blank, English is served instead.
        assert_eq!(detail.summary.excerpt, "Top stories");
        assert_eq!(detail.content, detail.content_en);
    }

    #[test]
    fn stored_reading_time_wins() {
        let mut record = record();
        record.reading_time = Some(9);
        let detail = ArticleDetail::from_record(&record, Language::En);
        assert_eq!(detail.summary.reading_time, Some(9));
    }

    #[test]
    fn list_items_never_serialize_bodies() {
        let item = ArticleListItem::from_summary(&record().summary(), Language::En);
        let json = serde_json::to_value(&item).expect("serialize");
        assert!(json.get("contentEn").is_none());
        assert!(json.get("content").is_none());
        assert_eq!(json["publishedAt"], "2024-04-01T09:00:00Z");
    }

    #[test]
    fn admin_view_extends_detail() {
        let json = serde_json::to_value(ArticleAdmin::from_record(&record())).expect("serialize");
        assert_eq!(json["published"], true);
        assert_eq!(json["slug"], "weekly-digest");
        assert!(json.get("contentEn").is_some());
        assert!(json.get("createdAt").is_some());
    }
}
