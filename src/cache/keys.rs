//! Cache key builders.
//!
//! Keys are plain strings prefixed with the entity they derive from, so that
//! substring invalidation (`"articles"`, `"categories"`, `"downloads"`) reaches
//! every dependent entry. List keys join their option fields in a fixed order;
//! callers computing an equivalent key must keep that order for hits to occur.
//! The services normalize listing options before keying, so absent fields only
//! show up as `_` for filters the caller left open.

use std::fmt::Display;

use crate::application::articles::ArticleListOptions;
use crate::application::catalog::DownloadListOptions;
use crate::domain::types::Language;

pub const ARTICLES_PREFIX: &str = "articles";
pub const CATEGORIES_PREFIX: &str = "categories";
pub const DOWNLOADS_PREFIX: &str = "downloads";

const FIELD_SEPARATOR: char = '|';
const ABSENT: &str = "_";

fn field<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| ABSENT.to_string(), |value| value.to_string())
}

/// `articles:list:` + category, featured, published, language, limit, offset,
/// sort_by, sort_order, cursor, paginated.
pub fn article_list_key(options: &ArticleListOptions) -> String {
    let fields = [
        field(options.category_id),
        field(options.featured),
        field(options.published),
        field(options.language),
        field(options.limit),
        field(options.offset),
        field(options.sort_by),
        field(options.sort_order),
        field(options.cursor.as_deref()),
        field(options.paginated),
    ];
    format!(
        "{ARTICLES_PREFIX}:list:{}",
        fields.join(&FIELD_SEPARATOR.to_string())
    )
}

pub fn article_detail_key(id: i64, language: Language) -> String {
    format!("{ARTICLES_PREFIX}:detail:{id}:{language}")
}

pub fn article_slug_key(slug: &str, language: Language) -> String {
    format!("{ARTICLES_PREFIX}:slug:{slug}:{language}")
}

pub fn category_list_key() -> String {
    format!("{CATEGORIES_PREFIX}:list")
}

pub fn category_slug_key(slug: &str) -> String {
    format!("{CATEGORIES_PREFIX}:slug:{slug}")
}

/// `downloads:list:` + category, published, limit, offset.
pub fn download_list_key(options: &DownloadListOptions) -> String {
    let fields = [
        field(options.category_id),
        field(options.published),
        field(options.limit),
        field(options.offset),
    ];
    format!(
        "{DOWNLOADS_PREFIX}:list:{}",
        fields.join(&FIELD_SEPARATOR.to_string())
    )
}

#[cfg(test)]
mod tests {
    use crate::domain::types::{SortField, SortOrder};

    use super::*;

    #[test]
    fn absent_fields_render_as_placeholders() {
        let key = article_list_key(&ArticleListOptions::default());
        assert_eq!(key, "articles:list:_|_|_|_|_|_|_|_|_|_");
    }

    #[test]
    fn list_key_uses_documented_field_order() {
        let options = ArticleListOptions {
            category_id: Some(3),
            featured: Some(true),
            published: Some(true),
            language: Some(Language::Ar),
            limit: Some(20),
            offset: Some(40),
            sort_by: Some(SortField::CreatedAt),
            sort_order: Some(SortOrder::Asc),
            cursor: None,
            paginated: Some(true),
        };
        assert_eq!(
            article_list_key(&options),
            "articles:list:3|true|true|ar|20|40|createdAt|asc|_|true"
        );
    }

    #[test]
    fn every_key_carries_its_entity_prefix() {
        assert!(article_detail_key(1, Language::En).contains(ARTICLES_PREFIX));
        assert!(article_slug_key("gulf-press", Language::Ar).contains(ARTICLES_PREFIX));
        assert!(category_list_key().contains(CATEGORIES_PREFIX));
        assert!(category_slug_key("tv").contains(CATEGORIES_PREFIX));
        assert!(download_list_key(&DownloadListOptions::default()).contains(DOWNLOADS_PREFIX));
    }

    #[test]
    fn languages_do_not_share_detail_keys() {
        assert_ne!(
            article_detail_key(5, Language::En),
            article_detail_key(5, Language::Ar)
        );
    }
}
