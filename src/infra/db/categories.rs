use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{
        CategoriesRepo, CategoriesWriteRepo, CreateCategoryParams, RepoError,
        UpdateCategoryParams,
    },
    domain::entities::CategoryRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const CATEGORY_COLUMNS: &str =
    "id, slug, name_en, name_ar, description_en, description_ar, created_at";

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: i64,
    slug: String,
    name_en: String,
    name_ar: String,
    description_en: Option<String>,
    description_ar: Option<String>,
    created_at: OffsetDateTime,
}

impl From<CategoryRow> for CategoryRecord {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            name_en: row.name_en,
            name_ar: row.name_ar,
            description_en: row.description_en,
            description_ar: row.description_ar,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl CategoriesRepo for PostgresRepositories {
    async fn list_categories(&self) -> Result<Vec<CategoryRecord>, RepoError> {
        let rows = sqlx::query_as::<_, CategoryRow>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY LOWER(name_en), id"
        ))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CategoryRecord::from).collect())
    }

    async fn find_category_by_id(&self, id: i64) -> Result<Option<CategoryRecord>, RepoError> {
        let row = sqlx::query_as::<_, CategoryRow>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(CategoryRecord::from))
    }

    async fn find_category_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<CategoryRecord>, RepoError> {
        let row = sqlx::query_as::<_, CategoryRow>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(CategoryRecord::from))
    }
}

#[async_trait]
impl CategoriesWriteRepo for PostgresRepositories {
    async fn create_category(
        &self,
        params: CreateCategoryParams,
    ) -> Result<CategoryRecord, RepoError> {
        let row = sqlx::query_as::<_, CategoryRow>(&format!(
            "INSERT INTO categories (slug, name_en, name_ar, description_en, description_ar) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {CATEGORY_COLUMNS}"
        ))
        .bind(params.slug)
        .bind(params.name_en)
        .bind(params.name_ar)
        .bind(params.description_en)
        .bind(params.description_ar)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(CategoryRecord::from(row))
    }

    async fn update_category(
        &self,
        params: UpdateCategoryParams,
    ) -> Result<CategoryRecord, RepoError> {
        let row = sqlx::query_as::<_, CategoryRow>(&format!(
            "UPDATE categories SET slug = $2, name_en = $3, name_ar = $4, description_en = $5, \
                 description_ar = $6 \
             WHERE id = $1 \
             RETURNING {CATEGORY_COLUMNS}"
        ))
        .bind(params.id)
        .bind(params.slug)
        .bind(params.name_en)
        .bind(params.name_ar)
        .bind(params.description_en)
        .bind(params.description_ar)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(CategoryRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_category(&self, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
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
