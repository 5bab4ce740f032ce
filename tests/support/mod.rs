#![allow(dead_code)]

use std::sync::Arc;

use mediawatch::application::admin::{AdminArticleService, AdminCatalogService, WriteGate};
use mediawatch::application::articles::ArticleService;
use mediawatch::application::catalog::CatalogService;
use mediawatch::application::repos::{ArticlesWriteRepo, CreateArticleParams};
use mediawatch::cache::{CacheConfig, CacheInvalidation, CacheStore, ReadThrough};
use mediawatch::config::PaginationSettings;
use mediawatch::infra::memory::InMemoryRepositories;
use mediawatch::infra::resilience::{RateLimitRules, RateLimiter, ResilienceRegistry};
use time::OffsetDateTime;
use time::macros::datetime;

pub struct Services {
    pub repos: Arc<InMemoryRepositories>,
    pub cache: Arc<CacheStore>,
    pub invalidation: CacheInvalidation,
    pub articles: Arc<ArticleService>,
    pub catalog: Arc<CatalogService>,
    pub article_writes: Arc<AdminArticleService>,
    pub catalog_writes: Arc<AdminCatalogService>,
    pub resilience: Arc<ResilienceRegistry>,
}

pub fn services() -> Services {
    services_with(RateLimitRules::default())
}

pub fn services_with(rules: RateLimitRules) -> Services {
    let repos = Arc::new(InMemoryRepositories::new());
    let config = CacheConfig::default();
    let cache = Arc::new(CacheStore::new(&config));
    let read_through = ReadThrough::new(cache.clone(), config);
    let invalidation = CacheInvalidation::new(cache.clone());
    let limiter = Arc::new(RateLimiter::new(rules));
    let resilience = Arc::new(ResilienceRegistry::new(
        limiter.clone(),
        Default::default(),
        Default::default(),
    ));
    let gate = WriteGate::new(limiter);
    let pagination = PaginationSettings::default();

    Services {
        articles: Arc::new(ArticleService::new(
            repos.clone(),
            read_through.clone(),
            pagination,
        )),
        catalog: Arc::new(CatalogService::new(
            repos.clone(),
            repos.clone(),
            read_through,
            pagination,
        )),
        article_writes: Arc::new(AdminArticleService::new(
            repos.clone(),
            repos.clone(),
            gate.clone(),
            invalidation.clone(),
        )),
        catalog_writes: Arc::new(AdminCatalogService::new(
            repos.clone(),
            repos.clone(),
            repos.clone(),
            gate,
            invalidation.clone(),
        )),
        repos,
        cache,
        invalidation,
        resilience,
    }
}

pub fn article(n: i64, published_at: OffsetDateTime) -> CreateArticleParams {
    CreateArticleParams {
        slug: format!("press-review-{n}"),
        title_en: format!("Press review {n}"),
        title_ar: format!("مراجعة صحفية {n}"),
        excerpt_en: format!("Highlights from edition {n}"),
        excerpt_ar: String::new(),
        content_en: "Coverage across print and broadcast outlets.".to_string(),
        content_ar: String::new(),
        meta_description_en: None,
        meta_description_ar: None,
        category_id: None,
        image_url: None,
        published: true,
        featured: false,
        reading_time: Some(1),
        published_at: Some(published_at),
    }
}

/// Seed `count` published articles, one hour apart, so id order matches
/// publication order.
pub async fn seed_articles(repos: &InMemoryRepositories, count: i64) {
    let start = datetime!(2024-05-01 06:00 UTC);
    for n in 1..=count {
        repos
            .create_article(article(n, start + time::Duration::hours(n)))
            .await
            .expect("seed article");
    }
}
