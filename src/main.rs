use std::{process, sync::Arc};

use mediawatch::{
    application::{
        admin::{AdminArticleService, AdminCatalogService, WriteGate},
        articles::ArticleService,
        catalog::CatalogService,
        error::AppError,
        repos::{
            ArticlesRepo, ArticlesWriteRepo, CategoriesRepo, CategoriesWriteRepo, DownloadsRepo,
            DownloadsWriteRepo,
        },
    },
    cache::{CacheConfig, CacheInvalidation, CacheStore, ReadThrough},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, AdminState, PublicState},
        memory::InMemoryRepositories,
        resilience::ResilienceRegistry,
        telemetry,
    },
};
use tokio::{sync::watch, try_join};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    info!(target = "mediawatch::migrate", "migrations applied");
    Ok(())
}

/// Repository handles shared by every service, backed by one adapter.
struct Repositories {
    articles: Arc<dyn ArticlesRepo>,
    article_writes: Arc<dyn ArticlesWriteRepo>,
    categories: Arc<dyn CategoriesRepo>,
    category_writes: Arc<dyn CategoriesWriteRepo>,
    downloads: Arc<dyn DownloadsRepo>,
    download_writes: Arc<dyn DownloadsWriteRepo>,
    db: Option<Arc<PostgresRepositories>>,
}

impl Repositories {
    fn from_adapter<R>(adapter: Arc<R>, db: Option<Arc<PostgresRepositories>>) -> Self
    where
        R: ArticlesRepo
            + ArticlesWriteRepo
            + CategoriesRepo
            + CategoriesWriteRepo
            + DownloadsRepo
            + DownloadsWriteRepo
            + 'static,
    {
        Self {
            articles: adapter.clone(),
            article_writes: adapter.clone(),
            categories: adapter.clone(),
            category_writes: adapter.clone(),
            downloads: adapter.clone(),
            download_writes: adapter,
            db,
        }
    }
}

async fn init_repositories(settings: &config::Settings) -> Result<Repositories, AppError> {
    let Some(database_url) = settings.database.url.as_ref() else {
        warn!(
            target = "mediawatch::bootstrap",
            "no database url configured; serving from in-memory storage, data is lost on exit"
        );
        return Ok(Repositories::from_adapter(
            Arc::new(InMemoryRepositories::new()),
            None,
        ));
    };

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let repositories = Arc::new(PostgresRepositories::new(pool));
    Ok(Repositories::from_adapter(
        repositories.clone(),
        Some(repositories),
    ))
}

struct ApplicationContext {
    public_state: PublicState,
    admin_state: AdminState,
    cache: Arc<CacheStore>,
    resilience: Arc<ResilienceRegistry>,
}

fn build_application_context(
    repositories: Repositories,
    settings: &config::Settings,
) -> ApplicationContext {
    let cache_config = CacheConfig::from(&settings.cache);
    let cache = Arc::new(CacheStore::new(&cache_config));
    let read_through = ReadThrough::new(cache.clone(), cache_config);
    let invalidation = CacheInvalidation::new(cache.clone());

    let resilience = Arc::new(ResilienceRegistry::from_settings(
        &settings.rate_limit,
        &settings.circuit_breaker,
    ));
    let gate = WriteGate::new(resilience.limiter().clone());

    let articles = Arc::new(ArticleService::new(
        repositories.articles.clone(),
        read_through.clone(),
        settings.pagination,
    ));
    let catalog = Arc::new(CatalogService::new(
        repositories.categories.clone(),
        repositories.downloads.clone(),
        read_through,
        settings.pagination,
    ));
    let article_writes = Arc::new(AdminArticleService::new(
        repositories.articles.clone(),
        repositories.article_writes.clone(),
        gate.clone(),
        invalidation.clone(),
    ));
    let catalog_writes = Arc::new(AdminCatalogService::new(
        repositories.categories.clone(),
        repositories.category_writes.clone(),
        repositories.download_writes.clone(),
        gate,
        invalidation.clone(),
    ));

    let public_state = PublicState {
        articles: articles.clone(),
        catalog,
        downloads: catalog_writes.clone(),
        db: repositories.db.clone(),
    };

    let admin_state = AdminState {
        db: repositories.db,
        articles,
        article_writes,
        catalog: catalog_writes,
        cache: invalidation,
        resilience: resilience.clone(),
    };

    ApplicationContext {
        public_state,
        admin_state,
        cache,
        resilience,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings);

    app.cache.start();
    app.resilience.limiter().start();

    let result = serve_http(&settings, app.public_state, app.admin_state).await;

    app.cache.stop();
    app.resilience.limiter().stop();

    result
}

async fn serve_http(
    settings: &config::Settings,
    public_state: PublicState,
    admin_state: AdminState,
) -> Result<(), AppError> {
    let public_router = http::build_public_router(public_state);
    let admin_router = http::build_admin_router(admin_state);

    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "mediawatch::bootstrap",
        public = %settings.server.public_addr,
        admin = %settings.server.admin_addr,
        "listening"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let public_server = axum::serve(public_listener, public_router.into_make_service())
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx.clone()));
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service())
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx));

    let servers = async { try_join!(public_server, admin_server).map(|_| ()) };
    tokio::pin!(servers);

    tokio::select! {
        result = &mut servers => {
            return result.map_err(|err| AppError::unexpected(format!("server error: {err}")));
        }
        _ = shutdown_signal() => {
            info!(target = "mediawatch::bootstrap", "shutdown requested, draining connections");
            let _ = shutdown_tx.send(true);
        }
    }

    match tokio::time::timeout(settings.server.graceful_shutdown, servers).await {
        Ok(result) => result.map_err(|err| AppError::unexpected(format!("server error: {err}"))),
        Err(_) => {
            warn!(
                target = "mediawatch::bootstrap",
                timeout_secs = settings.server.graceful_shutdown.as_secs(),
                "graceful shutdown timed out, dropping remaining connections"
            );
            Ok(())
        }
    }
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target = "mediawatch::bootstrap", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(target = "mediawatch::bootstrap", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
