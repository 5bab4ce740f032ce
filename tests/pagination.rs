mod support;

use mediawatch::application::articles::{ArticleListOptions, ArticleListing};
use mediawatch::application::repos::ArticlesWriteRepo;
use mediawatch::domain::types::{SortField, SortOrder};
use time::macros::datetime;

use support::{article, seed_articles, services};

fn paged(limit: u32, cursor: Option<String>) -> ArticleListOptions {
    ArticleListOptions {
        limit: Some(limit),
        cursor,
        paginated: Some(true),
        ..ArticleListOptions::default()
    }
    .with_public_defaults()
}

fn ids(listing: &ArticleListing) -> Vec<i64> {
    listing.items().iter().map(|item| item.id).collect()
}

#[tokio::test]
async fn cursor_walk_covers_every_article_once() {
    let services = services();
    seed_articles(&services.repos, 25).await;

    let first = services.articles.list(paged(10, None)).await.expect("page 1");
    assert_eq!(ids(&first), (16..=25).rev().collect::<Vec<_>>());
    let meta = first.pagination().expect("envelope");
    assert_eq!(meta.total, 25);
    assert_eq!(meta.total_pages, 3);
    assert!(meta.has_next);
    assert!(!meta.has_prev);

    let second = services
        .articles
        .list(paged(10, meta.next_cursor.clone()))
        .await
        .expect("page 2");
    assert_eq!(ids(&second), (6..=15).rev().collect::<Vec<_>>());
    let meta = second.pagination().expect("envelope");
    assert!(meta.has_next);
    assert!(meta.has_prev);

    let third = services
        .articles
        .list(paged(10, meta.next_cursor.clone()))
        .await
        .expect("page 3");
    assert_eq!(ids(&third), (1..=5).rev().collect::<Vec<_>>());
    let meta = third.pagination().expect("envelope");
    assert!(!meta.has_next);
    assert!(meta.next_cursor.is_none());
}

#[tokio::test]
async fn inserts_between_pages_do_not_shift_the_walk() {
    let services = services();
    seed_articles(&services.repos, 6).await;

    let first = services.articles.list(paged(3, None)).await.expect("page 1");
    assert_eq!(ids(&first), vec![6, 5, 4]);

    // Newer than everything already listed; offset paging would repeat row 4.
    services
        .repos
        .create_article(article(7, datetime!(2024-06-01 00:00 UTC)))
        .await
        .expect("late article");
    services.invalidation.articles();

    let cursor = first.pagination().and_then(|meta| meta.next_cursor.clone());
    let second = services.articles.list(paged(3, cursor)).await.expect("page 2");
    assert_eq!(ids(&second), vec![3, 2, 1]);
}

#[tokio::test]
async fn identical_timestamps_are_split_by_id() {
    let services = services();
    let at = datetime!(2024-05-02 09:30 UTC);
    for n in 1..=4 {
        services
            .repos
            .create_article(article(n, at))
            .await
            .expect("seed");
    }

    let first = services.articles.list(paged(2, None)).await.expect("page 1");
    assert_eq!(ids(&first), vec![4, 3]);
    let cursor = first.pagination().and_then(|meta| meta.next_cursor.clone());
    let second = services.articles.list(paged(2, cursor)).await.expect("page 2");
    assert_eq!(ids(&second), vec![2, 1]);
}

#[tokio::test]
async fn malformed_cursor_serves_the_first_page() {
    let services = services();
    seed_articles(&services.repos, 3).await;

    let listing = services
        .articles
        .list(paged(2, Some("not-a-cursor!".to_string())))
        .await
        .expect("lenient listing");
    assert_eq!(ids(&listing), vec![3, 2]);
}

#[tokio::test]
async fn ascending_id_order_walks_forward() {
    let services = services();
    seed_articles(&services.repos, 5).await;

    let options = |cursor| ArticleListOptions {
        limit: Some(2),
        sort_by: Some(SortField::Id),
        sort_order: Some(SortOrder::Asc),
        cursor,
        paginated: Some(true),
        ..ArticleListOptions::default()
    };

    let first = services.articles.list(options(None)).await.expect("page 1");
    assert_eq!(ids(&first), vec![1, 2]);
    let cursor = first.pagination().and_then(|meta| meta.next_cursor.clone());
    let second = services.articles.list(options(cursor)).await.expect("page 2");
    assert_eq!(ids(&second), vec![3, 4]);
}

#[tokio::test]
async fn oversized_limit_is_clamped() {
    let services = services();
    seed_articles(&services.repos, 3).await;

    let listing = services.articles.list(paged(5_000, None)).await.expect("listing");
    assert_eq!(listing.pagination().map(|meta| meta.limit), Some(100));
}
