//! Cursor pagination over article listings.
//!
//! A cursor is the sort key and id of the last row a client has seen, wrapped
//! in a versioned JSON envelope and base64-encoded. Rows are totally ordered by
//! `(sort key, id)`, which keeps pages free of gaps and duplicates even when
//! many rows share a timestamp.

use base64::{
    Engine as _,
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::warn;

use crate::domain::entities::{ArticleSummaryRecord, SortKey};
use crate::domain::types::{ArticleSort, SortField, SortOrder};

pub const CURSOR_VERSION: u8 = 1;
pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaginationError {
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("cursor version {0} is not supported")]
    UnsupportedVersion(u8),
    #[error("cursor was issued for `{found}` ordering, request sorts by `{expected}`")]
    SortMismatch {
        expected: SortField,
        found: SortField,
    },
    #[error("sort key cannot be encoded: {0}")]
    Encode(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct ArticleCursorPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    v: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    field: Option<SortField>,
    id: i64,
    value: serde_json::Value,
}

/// Opaque resume token for article listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleCursor {
    field: SortField,
    id: i64,
    value: String,
}

impl ArticleCursor {
    /// Cursor positioned on `record` for a listing sorted by `field`.
    pub fn after(record: &ArticleSummaryRecord, field: SortField) -> Result<Self, PaginationError> {
        let value = match record.sort_key(field) {
            SortKey::Time(at) => at
                .format(&Rfc3339)
                .map_err(|err| PaginationError::Encode(err.to_string()))?,
            SortKey::Id(id) => id.to_string(),
        };
        Ok(Self {
            field,
            id: record.id,
            value,
        })
    }

    pub fn field(&self) -> SortField {
        self.field
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn encode(&self) -> String {
        let payload = ArticleCursorPayload {
            v: Some(CURSOR_VERSION),
            field: Some(self.field),
            id: self.id,
            value: serde_json::Value::String(self.value.clone()),
        };
        let serialized = serde_json::to_vec(&payload)
            .expect("serializing article cursor payload should succeed");
        URL_SAFE_NO_PAD.encode(serialized)
    }

    /// Decode a cursor issued for a listing sorted by `expected`.
    ///
    /// Unversioned `{id, value}` payloads from older clients are accepted and
    /// assumed to match the requested ordering.
    pub fn decode(raw: &str, expected: SortField) -> Result<Self, PaginationError> {
        let bytes = decode_base64(raw.trim())?;
        let payload: ArticleCursorPayload = serde_json::from_slice(&bytes)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;

        if let Some(version) = payload.v.filter(|version| *version != CURSOR_VERSION) {
            return Err(PaginationError::UnsupportedVersion(version));
        }

        let field = payload.field.unwrap_or(expected);
        if field != expected {
            return Err(PaginationError::SortMismatch {
                expected,
                found: field,
            });
        }

        let value = match payload.value {
            serde_json::Value::String(value) => value,
            serde_json::Value::Number(number) => number.to_string(),
            other => {
                return Err(PaginationError::InvalidCursor(format!(
                    "unexpected cursor value `{other}`"
                )));
            }
        };

        Ok(Self {
            field,
            id: payload.id,
            value,
        })
    }

    /// Parse the stored value back into a comparable seek position.
    pub fn seek(&self) -> Result<ArticleSeek, PaginationError> {
        let key = match self.field {
            SortField::PublishedAt | SortField::CreatedAt => {
                let at = OffsetDateTime::parse(&self.value, &Rfc3339)
                    .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
                SortKey::Time(at)
            }
            SortField::Id => {
                let id = self
                    .value
                    .parse::<i64>()
                    .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
                SortKey::Id(id)
            }
        };
        Ok(ArticleSeek { key, id: self.id })
    }
}

fn decode_base64(raw: &str) -> Result<Vec<u8>, PaginationError> {
    let mut last_error = None;
    for engine in [&URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD] {
        match engine.decode(raw) {
            Ok(bytes) => return Ok(bytes),
            Err(err) => last_error = Some(err),
        }
    }
    Err(PaginationError::InvalidCursor(
        last_error
            .map(|err| err.to_string())
            .unwrap_or_else(|| "empty cursor".to_string()),
    ))
}

/// Decoded seek position: rows strictly after `(key, id)` in listing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArticleSeek {
    pub key: SortKey,
    pub id: i64,
}

impl ArticleSeek {
    /// Whether a row with `(key, id)` lies strictly after this position.
    pub fn admits(&self, key: SortKey, id: i64, order: SortOrder) -> bool {
        match order {
            SortOrder::Desc => key < self.key || (key == self.key && id < self.id),
            SortOrder::Asc => key > self.key || (key == self.key && id > self.id),
        }
    }
}

/// Decode an optional raw cursor, dropping it with a warning when malformed.
pub fn resolve_cursor(raw: Option<&str>, field: SortField) -> Option<ArticleSeek> {
    let raw = raw.map(str::trim).filter(|value| !value.is_empty())?;
    match ArticleCursor::decode(raw, field).and_then(|cursor| cursor.seek()) {
        Ok(seek) => Some(seek),
        Err(err) => {
            warn!(
                target = "mediawatch::pagination",
                error = %err,
                "ignoring unusable cursor, serving first page"
            );
            None
        }
    }
}

/// Row window a repository should fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub seek: Option<ArticleSeek>,
    /// Ignored when `seek` is present.
    pub offset: u64,
    /// Rows to fetch; callers ask for one more than they return.
    pub fetch: u32,
}

impl PageWindow {
    pub fn new(seek: Option<ArticleSeek>, offset: u64, limit: u32) -> Self {
        Self {
            seek,
            offset: if seek.is_some() { 0 } else { offset },
            fetch: limit.saturating_add(1),
        }
    }
}

/// Clamp a requested page size into the supported range.
pub fn clamp_limit(requested: Option<u32>, default: u32, max: u32) -> u32 {
    requested.unwrap_or(default).clamp(1, max.max(1))
}

/// Cursor-aware page result.
#[derive(Debug, Clone, Serialize)]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
    pub has_next: bool,
}

impl<T> CursorPage<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<String>, has_next: bool) -> Self {
        Self {
            items,
            next_cursor,
            has_next,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> CursorPage<U> {
        CursorPage {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
            has_next: self.has_next,
        }
    }
}

/// Turn an over-fetched row set (`limit + 1` requested) into a page.
///
/// The extra row only signals that more data exists; the next cursor points at
/// the last row actually returned.
pub fn finish_page(
    mut rows: Vec<ArticleSummaryRecord>,
    limit: u32,
    sort: ArticleSort,
) -> Result<CursorPage<ArticleSummaryRecord>, PaginationError> {
    let limit = limit as usize;
    let has_next = rows.len() > limit;
    rows.truncate(limit);

    let next_cursor = match rows.last() {
        Some(last) if has_next => Some(ArticleCursor::after(last, sort.field)?.encode()),
        _ => None,
    };

    Ok(CursorPage::new(rows, next_cursor, has_next))
}
