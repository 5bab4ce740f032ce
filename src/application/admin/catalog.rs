use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::application::admin::{
    AdminError, WriteGate, ensure_non_empty, explicit_slug, trim_optional, unique_slug,
};
use crate::application::dto::{CategoryView, DownloadView};
use crate::application::repos::{
    CategoriesRepo, CategoriesWriteRepo, CreateCategoryParams, CreateDownloadParams,
    DownloadsWriteRepo, UpdateCategoryParams,
};
use crate::cache::CacheInvalidation;
use crate::domain::types::Language;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateCategoryCommand {
    pub slug: Option<String>,
    pub name_en: String,
    pub name_ar: String,
    pub description_en: Option<String>,
    pub description_ar: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateCategoryCommand {
    pub slug: Option<String>,
    pub name_en: Option<String>,
    pub name_ar: Option<String>,
    pub description_en: Option<String>,
    pub description_ar: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDownloadCommand {
    pub title_en: String,
    #[serde(default)]
    pub title_ar: String,
    #[serde(default)]
    pub description_en: Option<String>,
    #[serde(default)]
    pub description_ar: Option<String>,
    pub file_url: String,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default = "published_by_default")]
    pub published: bool,
}

fn published_by_default() -> bool {
    true
}

/// Category and download writes. Category changes also drop article
/// listings, which filter by category.
#[derive(Clone)]
pub struct AdminCatalogService {
    categories: Arc<dyn CategoriesRepo>,
    category_writer: Arc<dyn CategoriesWriteRepo>,
    download_writer: Arc<dyn DownloadsWriteRepo>,
    gate: WriteGate,
    invalidation: CacheInvalidation,
}

impl AdminCatalogService {
    pub fn new(
        categories: Arc<dyn CategoriesRepo>,
        category_writer: Arc<dyn CategoriesWriteRepo>,
        download_writer: Arc<dyn DownloadsWriteRepo>,
        gate: WriteGate,
        invalidation: CacheInvalidation,
    ) -> Self {
        Self {
            categories,
            category_writer,
            download_writer,
            gate,
            invalidation,
        }
    }

    pub async fn create_category(
        &self,
        command: CreateCategoryCommand,
    ) -> Result<CategoryView, AdminError> {
        self.gate.admit()?;
        ensure_non_empty(&command.name_en, "nameEn")?;

        let slug = match command.slug.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => {
                let slug = explicit_slug(raw)?;
                if self.categories.find_category_by_slug(&slug).await?.is_some() {
                    return Err(AdminError::ConstraintViolation("slug"));
                }
                slug
            }
            None => {
                let reader = self.categories.clone();
                unique_slug(&command.name_en, "nameEn", move |candidate| {
                    let reader = reader.clone();
                    async move {
                        reader
                            .find_category_by_slug(&candidate)
                            .await
                            .map(|existing| existing.is_none())
                    }
                })
                .await?
            }
        };

        let record = self
            .category_writer
            .create_category(CreateCategoryParams {
                slug,
                name_en: command.name_en.trim().to_string(),
                name_ar: command.name_ar.trim().to_string(),
                description_en: trim_optional(command.description_en),
                description_ar: trim_optional(command.description_ar),
            })
            .await?;

        let invalidated = self.invalidation.categories();
        info!(
            target = "mediawatch::admin::catalog",
            category_id = record.id,
            slug = %record.slug,
            invalidated,
            "category created"
        );
        Ok(CategoryView::from_record(&record, Language::En))
    }

    pub async fn update_category(
        &self,
        id: i64,
        command: UpdateCategoryCommand,
    ) -> Result<CategoryView, AdminError> {
        self.gate.admit()?;
        let existing = self
            .categories
            .find_category_by_id(id)
            .await?
            .ok_or(AdminError::NotFound("category"))?;

        let slug = match command.slug.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => {
                let slug = explicit_slug(raw)?;
                let taken = self
                    .categories
                    .find_category_by_slug(&slug)
                    .await?
                    .is_some_and(|other| other.id != id);
                if taken {
                    return Err(AdminError::ConstraintViolation("slug"));
                }
                slug
            }
            None => existing.slug.clone(),
        };

        let name_en = match command.name_en {
            Some(name) => {
                ensure_non_empty(&name, "nameEn")?;
                name.trim().to_string()
            }
            None => existing.name_en,
        };

        let record = self
            .category_writer
            .update_category(UpdateCategoryParams {
                id,
                slug,
                name_en,
                name_ar: command
                    .name_ar
                    .map(|name| name.trim().to_string())
                    .unwrap_or(existing.name_ar),
                description_en: command
                    .description_en
                    .map_or(existing.description_en, |value| trim_optional(Some(value))),
                description_ar: command
                    .description_ar
                    .map_or(existing.description_ar, |value| trim_optional(Some(value))),
            })
            .await
            .map_err(AdminError::missing("category"))?;

        let invalidated = self.invalidation.categories();
        info!(
            target = "mediawatch::admin::catalog",
            category_id = id,
            invalidated,
            "category updated"
        );
        Ok(CategoryView::from_record(&record, Language::En))
    }

    pub async fn delete_category(&self, id: i64) -> Result<(), AdminError> {
        self.gate.admit()?;
        self.category_writer
            .delete_category(id)
            .await
            .map_err(AdminError::missing("category"))?;
        let invalidated = self.invalidation.categories();
        info!(
            target = "mediawatch::admin::catalog",
            category_id = id,
            invalidated,
            "category deleted"
        );
        Ok(())
    }

    pub async fn create_download(
        &self,
        command: CreateDownloadCommand,
    ) -> Result<DownloadView, AdminError> {
        self.gate.admit()?;
        ensure_non_empty(&command.title_en, "titleEn")?;
        ensure_non_empty(&command.file_url, "fileUrl")?;

        let record = self
            .download_writer
            .create_download(CreateDownloadParams {
                title_en: command.title_en.trim().to_string(),
                title_ar: command.title_ar.trim().to_string(),
                description_en: trim_optional(command.description_en),
                description_ar: trim_optional(command.description_ar),
                file_url: command.file_url.trim().to_string(),
                category_id: command.category_id,
                published: command.published,
            })
            .await?;

        let invalidated = self.invalidation.downloads();
        info!(
            target = "mediawatch::admin::catalog",
            download_id = record.id,
            invalidated,
            "download created"
        );
        Ok(DownloadView::from(&record))
    }

    pub async fn delete_download(&self, id: i64) -> Result<(), AdminError> {
        self.gate.admit()?;
        self.download_writer
            .delete_download(id)
            .await
            .map_err(AdminError::missing("download"))?;
        self.invalidation.downloads();
        Ok(())
    }

    /// Count one download of `id`. Reader-triggered, so it bypasses the
    /// admin write gate and leaves cached listings alone; their counts catch
    /// up when the entries expire.
    pub async fn record_download(&self, id: i64) -> Result<DownloadView, AdminError> {
        let record = self
            .download_writer
            .increment_download_count(id)
            .await
            .map_err(AdminError::missing("download"))?;
        Ok(DownloadView::from(&record))
    }
}
