use std::sync::Arc;

use serde::Deserialize;
use time::OffsetDateTime;
use tracing::info;

use crate::application::admin::{
    AdminError, WriteGate, ensure_non_empty, explicit_slug, trim_optional, unique_slug,
};
use crate::application::dto::ArticleAdmin;
use crate::application::repos::{
    ArticlesRepo, ArticlesWriteRepo, CreateArticleParams, UpdateArticleParams,
};
use crate::cache::CacheInvalidation;
use crate::domain::articles::{reading_time_minutes, resolve_published_at};
use crate::domain::entities::ArticleRecord;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateArticleCommand {
    /// Derived from `title_en` when absent.
    pub slug: Option<String>,
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
    /// Computed from `content_en` when absent.
    pub reading_time: Option<u32>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
}

/// Partial update; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateArticleCommand {
    pub slug: Option<String>,
    pub title_en: Option<String>,
    pub title_ar: Option<String>,
    pub excerpt_en: Option<String>,
    pub excerpt_ar: Option<String>,
    pub content_en: Option<String>,
    pub content_ar: Option<String>,
    pub meta_description_en: Option<String>,
    pub meta_description_ar: Option<String>,
    pub category_id: Option<i64>,
    pub image_url: Option<String>,
    pub published: Option<bool>,
    pub featured: Option<bool>,
    pub reading_time: Option<u32>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
}

#[derive(Clone)]
pub struct AdminArticleService {
    reader: Arc<dyn ArticlesRepo>,
    writer: Arc<dyn ArticlesWriteRepo>,
    gate: WriteGate,
    invalidation: CacheInvalidation,
}

impl AdminArticleService {
    pub fn new(
        reader: Arc<dyn ArticlesRepo>,
        writer: Arc<dyn ArticlesWriteRepo>,
        gate: WriteGate,
        invalidation: CacheInvalidation,
    ) -> Self {
        Self {
            reader,
            writer,
            gate,
            invalidation,
        }
    }

    pub async fn find(&self, id: i64) -> Result<ArticleAdmin, AdminError> {
        let record = self
            .reader
            .find_by_id(id)
            .await?
            .ok_or(AdminError::NotFound("article"))?;
        Ok(ArticleAdmin::from_record(&record))
    }

    pub async fn create(&self, command: CreateArticleCommand) -> Result<ArticleAdmin, AdminError> {
        self.gate.admit()?;
        ensure_non_empty(&command.title_en, "titleEn")?;
        ensure_non_empty(&command.content_en, "contentEn")?;

        let slug = match command.slug.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => {
                let slug = explicit_slug(raw)?;
                if self.reader.slug_exists(&slug, None).await? {
                    return Err(AdminError::ConstraintViolation("slug"));
                }
                slug
            }
            None => self.derive_unique_slug(&command.title_en).await?,
        };

        let reading_time = command
            .reading_time
            .unwrap_or_else(|| reading_time_minutes(&command.content_en));
        let published_at = resolve_published_at(
            false,
            command.published,
            None,
            command.published_at,
            OffsetDateTime::now_utc(),
        );

        let params = CreateArticleParams {
            slug,
            title_en: command.title_en.trim().to_string(),
            title_ar: command.title_ar.trim().to_string(),
            excerpt_en: command.excerpt_en,
            excerpt_ar: command.excerpt_ar,
            content_en: command.content_en,
            content_ar: command.content_ar,
            meta_description_en: trim_optional(command.meta_description_en),
            meta_description_ar: trim_optional(command.meta_description_ar),
            category_id: command.category_id,
            image_url: trim_optional(command.image_url),
            published: command.published,
            featured: command.featured,
            reading_time: Some(minutes_column(reading_time)),
            published_at,
        };

        let record = self.writer.create_article(params).await?;
        self.after_write(&record, "created");
        Ok(ArticleAdmin::from_record(&record))
    }

    pub async fn update(
        &self,
        id: i64,
        command: UpdateArticleCommand,
    ) -> Result<ArticleAdmin, AdminError> {
        self.gate.admit()?;
        let existing = self
            .reader
            .find_by_id(id)
            .await?
            .ok_or(AdminError::NotFound("article"))?;

        let slug = match command.slug.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => {
                let slug = explicit_slug(raw)?;
                if slug != existing.slug && self.reader.slug_exists(&slug, Some(id)).await? {
                    return Err(AdminError::ConstraintViolation("slug"));
                }
                slug
            }
            None => existing.slug.clone(),
        };

        let title_en = match command.title_en {
            Some(title) => {
                ensure_non_empty(&title, "titleEn")?;
                title.trim().to_string()
            }
            None => existing.title_en.clone(),
        };
        let content_changed = command
            .content_en
            .as_ref()
            .is_some_and(|content| *content != existing.content_en);
        let content_en = match command.content_en {
            Some(content) => {
                ensure_non_empty(&content, "contentEn")?;
                content
            }
            None => existing.content_en.clone(),
        };

        let reading_time = match command.reading_time {
            Some(minutes) => Some(minutes_column(minutes)),
            None if content_changed => Some(minutes_column(reading_time_minutes(&content_en))),
            None => existing.reading_time,
        };

        let published = command.published.unwrap_or(existing.published);
        let published_at = resolve_published_at(
            existing.published,
            published,
            existing.published_at,
            command.published_at,
            OffsetDateTime::now_utc(),
        );

        let params = UpdateArticleParams {
            id,
            slug,
            title_en,
            title_ar: command
                .title_ar
                .map(|title| title.trim().to_string())
                .unwrap_or(existing.title_ar),
            excerpt_en: command.excerpt_en.unwrap_or(existing.excerpt_en),
            excerpt_ar: command.excerpt_ar.unwrap_or(existing.excerpt_ar),
            content_en,
            content_ar: command.content_ar.unwrap_or(existing.content_ar),
            meta_description_en: command
                .meta_description_en
                .map_or(existing.meta_description_en, |value| trim_optional(Some(value))),
            meta_description_ar: command
                .meta_description_ar
                .map_or(existing.meta_description_ar, |value| trim_optional(Some(value))),
            category_id: command.category_id.or(existing.category_id),
            image_url: command
                .image_url
                .map_or(existing.image_url, |value| trim_optional(Some(value))),
            published,
            featured: command.featured.unwrap_or(existing.featured),
            reading_time,
            published_at,
        };

        let record = self
            .writer
            .update_article(params)
            .await
            .map_err(AdminError::missing("article"))?;
        self.after_write(&record, "updated");
        Ok(ArticleAdmin::from_record(&record))
    }

    pub async fn delete(&self, id: i64) -> Result<(), AdminError> {
        self.gate.admit()?;
        self.writer
            .delete_article(id)
            .await
            .map_err(AdminError::missing("article"))?;
        let invalidated = self.invalidation.articles();
        info!(
            target = "mediawatch::admin::articles",
            article_id = id,
            invalidated,
            "article deleted"
        );
        Ok(())
    }

    async fn derive_unique_slug(&self, title: &str) -> Result<String, AdminError> {
        let reader = self.reader.clone();
        unique_slug(title, "titleEn", move |candidate| {
            let reader = reader.clone();
            async move {
                reader
                    .slug_exists(&candidate, None)
                    .await
                    .map(|taken| !taken)
            }
        })
        .await
    }

    fn after_write(&self, record: &ArticleRecord, action: &'static str) {
        let invalidated = self.invalidation.articles();
        info!(
            target = "mediawatch::admin::articles",
            article_id = record.id,
            slug = %record.slug,
            action,
            invalidated,
            "article written"
        );
    }
}

fn minutes_column(minutes: u32) -> i32 {
    i32::try_from(minutes).unwrap_or(i32::MAX)
}
