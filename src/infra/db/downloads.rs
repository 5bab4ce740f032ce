use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    application::repos::{
        CreateDownloadParams, DownloadQueryFilter, DownloadsRepo, DownloadsWriteRepo, RepoError,
    },
    domain::entities::DownloadRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const DOWNLOAD_COLUMNS: &str = "id, title_en, title_ar, description_en, description_ar, file_url, \
     category_id, published, download_count, created_at";

#[derive(sqlx::FromRow)]
struct DownloadRow {
    id: i64,
    title_en: String,
    title_ar: String,
    description_en: Option<String>,
    description_ar: Option<String>,
    file_url: String,
    category_id: Option<i64>,
    published: bool,
    download_count: i64,
    created_at: OffsetDateTime,
}

impl From<DownloadRow> for DownloadRecord {
    fn from(row: DownloadRow) -> Self {
        Self {
            id: row.id,
            title_en: row.title_en,
            title_ar: row.title_ar,
            description_en: row.description_en,
            description_ar: row.description_ar,
            file_url: row.file_url,
            category_id: row.category_id,
            published: row.published,
            download_count: row.download_count,
            created_at: row.created_at,
        }
    }
}

impl PostgresRepositories {
    fn apply_download_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &DownloadQueryFilter) {
        if let Some(category_id) = filter.category_id {
            qb.push(" AND category_id = ");
            qb.push_bind(category_id);
        }

        if let Some(published) = filter.published {
            qb.push(" AND published = ");
            qb.push_bind(published);
        }
    }
}

#[async_trait]
impl DownloadsRepo for PostgresRepositories {
    async fn list_downloads(
        &self,
        filter: &DownloadQueryFilter,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<DownloadRecord>, RepoError> {
        let mut qb = QueryBuilder::new(format!("SELECT {DOWNLOAD_COLUMNS} FROM downloads WHERE 1=1 "));
        Self::apply_download_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        qb.push_bind(i64::from(limit));
        qb.push(" OFFSET ");
        qb.push_bind(Self::convert_offset(offset));

        let rows = qb
            .build_query_as::<DownloadRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(DownloadRecord::from).collect())
    }

    async fn count_downloads(&self, filter: &DownloadQueryFilter) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM downloads WHERE 1=1 ");
        Self::apply_download_filter(&mut qb, filter);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn find_download(&self, id: i64) -> Result<Option<DownloadRecord>, RepoError> {
        let row = sqlx::query_as::<_, DownloadRow>(&format!(
            "SELECT {DOWNLOAD_COLUMNS} FROM downloads WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(DownloadRecord::from))
    }
}

#[async_trait]
impl DownloadsWriteRepo for PostgresRepositories {
    async fn create_download(
        &self,
        params: CreateDownloadParams,
    ) -> Result<DownloadRecord, RepoError> {
        let row = sqlx::query_as::<_, DownloadRow>(&format!(
            "INSERT INTO downloads (title_en, title_ar, description_en, description_ar, file_url, \
                 category_id, published) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {DOWNLOAD_COLUMNS}"
        ))
        .bind(params.title_en)
        .bind(params.title_ar)
        .bind(params.description_en)
        .bind(params.description_ar)
        .bind(params.file_url)
        .bind(params.category_id)
        .bind(params.published)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(DownloadRecord::from(row))
    }

    async fn delete_download(&self, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM downloads WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn increment_download_count(&self, id: i64) -> Result<DownloadRecord, RepoError> {
        let row = sqlx::query_as::<_, DownloadRow>(&format!(
            "UPDATE downloads SET download_count = download_count + 1 \
             WHERE id = $1 \
             RETURNING {DOWNLOAD_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(DownloadRecord::from).ok_or(RepoError::NotFound)
    }
}
