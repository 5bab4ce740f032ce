//! Shared domain enumerations used across query, cache and transport layers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Content language served to readers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ar,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ar => "ar",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column an article listing is ordered by. `id` always breaks ties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    PublishedAt,
    CreatedAt,
    Id,
}

impl SortField {
    pub fn as_str(self) -> &'static str {
        match self {
            SortField::PublishedAt => "publishedAt",
            SortField::CreatedAt => "createdAt",
            SortField::Id => "id",
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Combined ordering of a listing: sort column plus direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArticleSort {
    pub field: SortField,
    pub order: SortOrder,
}

impl ArticleSort {
    pub fn new(field: SortField, order: SortOrder) -> Self {
        Self { field, order }
    }
}

/// External or internal dependency class that carries its own rate-limit rule
/// and, for external services, its own circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResilienceSource {
    News,
    Llm,
    Storage,
    Default,
}

impl ResilienceSource {
    pub const ALL: [ResilienceSource; 4] = [
        ResilienceSource::News,
        ResilienceSource::Llm,
        ResilienceSource::Storage,
        ResilienceSource::Default,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResilienceSource::News => "news",
            ResilienceSource::Llm => "llm",
            ResilienceSource::Storage => "storage",
            ResilienceSource::Default => "default",
        }
    }
}

impl fmt::Display for ResilienceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResilienceSource {
    type Err = String;

    /// Unknown names fall into the generic bucket rather than failing.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value.trim().to_ascii_lowercase().as_str() {
            "news" => ResilienceSource::News,
            "llm" => ResilienceSource::Llm,
            "storage" => ResilienceSource::Storage,
            _ => ResilienceSource::Default,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_field_uses_camel_case_on_the_wire() {
        let json = serde_json::to_string(&SortField::PublishedAt).expect("serialize");
        assert_eq!(json, "\"publishedAt\"");
        let parsed: SortField = serde_json::from_str("\"createdAt\"").expect("deserialize");
        assert_eq!(parsed, SortField::CreatedAt);
    }

    #[test]
    fn unknown_source_falls_back_to_default_bucket() {
        assert_eq!(
            "rss-mirror".parse::<ResilienceSource>(),
            Ok(ResilienceSource::Default)
        );
        assert_eq!("LLM".parse::<ResilienceSource>(), Ok(ResilienceSource::Llm));
    }
}
