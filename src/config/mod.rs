//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "mediawatch";
const ENV_PREFIX: &str = "MEDIAWATCH";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_ADMIN_HOST: &str = "127.0.0.1";
const DEFAULT_PUBLIC_PORT: u16 = 3000;
const DEFAULT_ADMIN_PORT: u16 = 3001;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_CACHE_MAX_ENTRIES: usize = 1000;
const DEFAULT_CACHE_SWEEP_SECS: u64 = 60;
const DEFAULT_CACHE_DETAIL_TTL_SECS: u64 = 600;
const DEFAULT_CACHE_CATEGORY_TTL_SECS: u64 = 3600;
const DEFAULT_CACHE_DOWNLOAD_TTL_SECS: u64 = 600;
const DEFAULT_NEWS_WINDOW_SECS: u64 = 24 * 60 * 60;
const DEFAULT_NEWS_MAX_REQUESTS: u64 = 100;
const DEFAULT_LLM_WINDOW_SECS: u64 = 60;
const DEFAULT_LLM_MAX_REQUESTS: u64 = 50;
const DEFAULT_STORAGE_WINDOW_SECS: u64 = 60;
const DEFAULT_STORAGE_MAX_REQUESTS: u64 = 1000;
const DEFAULT_FALLBACK_WINDOW_SECS: u64 = 60;
const DEFAULT_FALLBACK_MAX_REQUESTS: u64 = 100;
const DEFAULT_RATE_LIMIT_SWEEP_SECS: u64 = 300;
const DEFAULT_BREAKER_FAILURE_THRESHOLD: u64 = 5;
const DEFAULT_BREAKER_CALL_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_BREAKER_RESET_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_PAGE_LIMIT: u32 = 10;
const DEFAULT_MAX_PAGE_LIMIT: u32 = 100;

/// Command-line arguments for the mediawatch binary.
#[derive(Debug, Parser)]
#[command(
    name = "mediawatch",
    version,
    about = "Bilingual media-monitoring blog service"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "MEDIAWATCH_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the public and admin HTTP listeners.
    Serve(Box<ServeArgs>),
    /// Apply pending database migrations and exit.
    Migrate(MigrateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the public listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the administrative listener host.
    #[arg(long = "server-admin-host", value_name = "HOST")]
    pub server_admin_host: Option<String>,

    /// Override the public listener port.
    #[arg(long = "server-public-port", value_name = "PORT")]
    pub public_port: Option<u16>,

    /// Override the administrative listener port.
    #[arg(long = "server-admin-port", value_name = "PORT")]
    pub admin_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Toggle read-path caching.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the default cache entry lifetime.
    #[arg(long = "cache-default-ttl-seconds", value_name = "SECONDS")]
    pub cache_default_ttl_seconds: Option<u64>,

    /// Override the cache capacity.
    #[arg(long = "cache-max-entries", value_name = "COUNT")]
    pub cache_max_entries: Option<usize>,

    /// Override the largest page size a listing may request.
    #[arg(long = "pagination-max-limit", value_name = "COUNT")]
    pub pagination_max_limit: Option<u32>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub rate_limit: RateLimitSettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub pagination: PaginationSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub public_addr: SocketAddr,
    pub admin_addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// Absent URL runs the service on the in-process store.
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub default_ttl_secs: u64,
    pub max_entries: usize,
    pub sweep_interval_secs: u64,
    pub detail_ttl_secs: u64,
    pub category_ttl_secs: u64,
    pub download_ttl_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRuleSettings {
    pub window: Duration,
    pub max_requests: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub news: RateLimitRuleSettings,
    pub llm: RateLimitRuleSettings,
    pub storage: RateLimitRuleSettings,
    pub default: RateLimitRuleSettings,
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: NonZeroU32,
    pub call_timeout: Duration,
    pub reset_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerSettings {
    pub news: BreakerSettings,
    pub llm: BreakerSettings,
}

#[derive(Debug, Clone, Copy)]
pub struct PaginationSettings {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_PAGE_LIMIT,
            max_limit: DEFAULT_MAX_PAGE_LIMIT,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    rate_limit: RawRateLimitSettings,
    circuit_breaker: RawCircuitBreakerSettings,
    pagination: RawPaginationSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(host) = overrides.server_admin_host.as_ref() {
            self.server.admin_host = Some(host.clone());
        }
        if let Some(port) = overrides.public_port {
            self.server.public_port = Some(port);
        }
        if let Some(port) = overrides.admin_port {
            self.server.admin_port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(ttl) = overrides.cache_default_ttl_seconds {
            self.cache.default_ttl_secs = Some(ttl);
        }
        if let Some(max) = overrides.cache_max_entries {
            self.cache.max_entries = Some(max);
        }
        if let Some(max) = overrides.pagination_max_limit {
            self.pagination.max_limit = Some(max);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            rate_limit,
            circuit_breaker,
            pagination,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            rate_limit: build_rate_limit_settings(rate_limit)?,
            circuit_breaker: build_circuit_breaker_settings(circuit_breaker)?,
            pagination: build_pagination_settings(pagination)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let admin_host = server
        .admin_host
        .unwrap_or_else(|| DEFAULT_ADMIN_HOST.to_string());

    let public_port = server.public_port.unwrap_or(DEFAULT_PUBLIC_PORT);
    if public_port == 0 {
        return Err(LoadError::invalid(
            "server.public_port",
            "port must be greater than zero",
        ));
    }

    let admin_port = server.admin_port.unwrap_or(DEFAULT_ADMIN_PORT);
    if admin_port == 0 {
        return Err(LoadError::invalid(
            "server.admin_port",
            "port must be greater than zero",
        ));
    }

    let public_addr = parse_socket_addr(&host, public_port)
        .map_err(|reason| LoadError::invalid("server.public_addr", reason))?;
    let admin_addr = parse_socket_addr(&admin_host, admin_port)
        .map_err(|reason| LoadError::invalid("server.admin_addr", reason))?;
    if public_addr == admin_addr {
        return Err(LoadError::invalid(
            "server.admin_port",
            "admin listener must not share the public address",
        ));
    }

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        public_addr,
        admin_addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let max_entries = cache.max_entries.unwrap_or(DEFAULT_CACHE_MAX_ENTRIES);
    NonZeroUsize::new(max_entries)
        .ok_or_else(|| LoadError::invalid("cache.max_entries", "must be greater than zero"))?;

    let sweep_interval_secs = cache.sweep_interval_secs.unwrap_or(DEFAULT_CACHE_SWEEP_SECS);
    if sweep_interval_secs == 0 {
        return Err(LoadError::invalid(
            "cache.sweep_interval_secs",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        default_ttl_secs: cache.default_ttl_secs.unwrap_or(DEFAULT_CACHE_TTL_SECS),
        max_entries,
        sweep_interval_secs,
        detail_ttl_secs: cache
            .detail_ttl_secs
            .unwrap_or(DEFAULT_CACHE_DETAIL_TTL_SECS),
        category_ttl_secs: cache
            .category_ttl_secs
            .unwrap_or(DEFAULT_CACHE_CATEGORY_TTL_SECS),
        download_ttl_secs: cache
            .download_ttl_secs
            .unwrap_or(DEFAULT_CACHE_DOWNLOAD_TTL_SECS),
    })
}

fn build_rule(
    raw: RawRuleSettings,
    default_window_secs: u64,
    default_max: u64,
    window_key: &'static str,
    max_key: &'static str,
) -> Result<RateLimitRuleSettings, LoadError> {
    let window_ms = raw
        .window_ms
        .unwrap_or_else(|| default_window_secs.saturating_mul(1000));
    if window_ms == 0 {
        return Err(LoadError::invalid(window_key, "must be greater than zero"));
    }

    Ok(RateLimitRuleSettings {
        window: Duration::from_millis(window_ms),
        max_requests: non_zero_u32(raw.max_requests.unwrap_or(default_max), max_key)?,
    })
}

fn build_rate_limit_settings(
    rate_limit: RawRateLimitSettings,
) -> Result<RateLimitSettings, LoadError> {
    let sweep_secs = rate_limit
        .sweep_interval_secs
        .unwrap_or(DEFAULT_RATE_LIMIT_SWEEP_SECS);
    if sweep_secs == 0 {
        return Err(LoadError::invalid(
            "rate_limit.sweep_interval_secs",
            "must be greater than zero",
        ));
    }

    Ok(RateLimitSettings {
        news: build_rule(
            rate_limit.news,
            DEFAULT_NEWS_WINDOW_SECS,
            DEFAULT_NEWS_MAX_REQUESTS,
            "rate_limit.news.window_ms",
            "rate_limit.news.max_requests",
        )?,
        llm: build_rule(
            rate_limit.llm,
            DEFAULT_LLM_WINDOW_SECS,
            DEFAULT_LLM_MAX_REQUESTS,
            "rate_limit.llm.window_ms",
            "rate_limit.llm.max_requests",
        )?,
        storage: build_rule(
            rate_limit.storage,
            DEFAULT_STORAGE_WINDOW_SECS,
            DEFAULT_STORAGE_MAX_REQUESTS,
            "rate_limit.storage.window_ms",
            "rate_limit.storage.max_requests",
        )?,
        default: build_rule(
            rate_limit.default,
            DEFAULT_FALLBACK_WINDOW_SECS,
            DEFAULT_FALLBACK_MAX_REQUESTS,
            "rate_limit.default.window_ms",
            "rate_limit.default.max_requests",
        )?,
        sweep_interval: Duration::from_secs(sweep_secs),
    })
}

fn build_breaker(
    raw: RawBreakerSettings,
    threshold_key: &'static str,
    call_timeout_key: &'static str,
    reset_timeout_key: &'static str,
) -> Result<BreakerSettings, LoadError> {
    let call_timeout_ms = raw
        .call_timeout_ms
        .unwrap_or(DEFAULT_BREAKER_CALL_TIMEOUT_MS);
    if call_timeout_ms == 0 {
        return Err(LoadError::invalid(
            call_timeout_key,
            "must be greater than zero",
        ));
    }
    let reset_timeout_ms = raw
        .reset_timeout_ms
        .unwrap_or(DEFAULT_BREAKER_RESET_TIMEOUT_MS);
    if reset_timeout_ms == 0 {
        return Err(LoadError::invalid(
            reset_timeout_key,
            "must be greater than zero",
        ));
    }

    Ok(BreakerSettings {
        failure_threshold: non_zero_u32(
            raw.failure_threshold
                .unwrap_or(DEFAULT_BREAKER_FAILURE_THRESHOLD),
            threshold_key,
        )?,
        call_timeout: Duration::from_millis(call_timeout_ms),
        reset_timeout: Duration::from_millis(reset_timeout_ms),
    })
}

fn build_circuit_breaker_settings(
    raw: RawCircuitBreakerSettings,
) -> Result<CircuitBreakerSettings, LoadError> {
    Ok(CircuitBreakerSettings {
        news: build_breaker(
            raw.news,
            "circuit_breaker.news.failure_threshold",
            "circuit_breaker.news.call_timeout_ms",
            "circuit_breaker.news.reset_timeout_ms",
        )?,
        llm: build_breaker(
            raw.llm,
            "circuit_breaker.llm.failure_threshold",
            "circuit_breaker.llm.call_timeout_ms",
            "circuit_breaker.llm.reset_timeout_ms",
        )?,
    })
}

fn build_pagination_settings(
    pagination: RawPaginationSettings,
) -> Result<PaginationSettings, LoadError> {
    let max_limit = pagination.max_limit.unwrap_or(DEFAULT_MAX_PAGE_LIMIT);
    if max_limit == 0 {
        return Err(LoadError::invalid(
            "pagination.max_limit",
            "must be greater than zero",
        ));
    }

    let default_limit = pagination.default_limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    if default_limit == 0 || default_limit > max_limit {
        return Err(LoadError::invalid(
            "pagination.default_limit",
            format!("must be between 1 and {max_limit}"),
        ));
    }

    Ok(PaginationSettings {
        default_limit,
        max_limit,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    admin_host: Option<String>,
    public_port: Option<u16>,
    admin_port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    default_ttl_secs: Option<u64>,
    max_entries: Option<usize>,
    sweep_interval_secs: Option<u64>,
    detail_ttl_secs: Option<u64>,
    category_ttl_secs: Option<u64>,
    download_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRuleSettings {
    window_ms: Option<u64>,
    max_requests: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRateLimitSettings {
    news: RawRuleSettings,
    llm: RawRuleSettings,
    storage: RawRuleSettings,
    default: RawRuleSettings,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBreakerSettings {
    failure_threshold: Option<u64>,
    call_timeout_ms: Option<u64>,
    reset_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCircuitBreakerSettings {
    news: RawBreakerSettings,
    llm: RawBreakerSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPaginationSettings {
    default_limit: Option<u32>,
    max_limit: Option<u32>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

        assert_eq!(settings.server.public_addr.port(), DEFAULT_PUBLIC_PORT);
        assert!(settings.database.url.is_none());
        assert_eq!(settings.cache.max_entries, 1000);
        assert_eq!(settings.cache.default_ttl_secs, 300);
        assert_eq!(
            settings.rate_limit.news.window,
            Duration::from_secs(24 * 60 * 60)
        );
        assert_eq!(settings.rate_limit.llm.max_requests.get(), 50);
        assert_eq!(settings.rate_limit.storage.max_requests.get(), 1000);
        assert_eq!(
            settings.rate_limit.sweep_interval,
            Duration::from_secs(300)
        );
        assert_eq!(settings.circuit_breaker.news.failure_threshold.get(), 5);
        assert_eq!(settings.pagination.default_limit, 10);
        assert_eq!(settings.pagination.max_limit, 100);
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.server.public_port = Some(4000);
        raw.logging.level = Some("info".to_string());
        raw.cache.max_entries = Some(10);

        let overrides = ServeOverrides {
            public_port: Some(4321),
            log_level: Some("debug".to_string()),
            cache_max_entries: Some(25),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.public_addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
        assert_eq!(settings.cache.max_entries, 25);
    }

    #[test]
    fn zero_quota_names_the_offending_key() {
        let mut raw = RawSettings::default();
        raw.rate_limit.llm.max_requests = Some(0);

        let err = Settings::from_raw(raw).expect_err("zero quota rejected");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "rate_limit.llm.max_requests",
                ..
            }
        ));
    }

    #[test]
    fn default_page_size_must_fit_the_maximum() {
        let mut raw = RawSettings::default();
        raw.pagination.default_limit = Some(50);
        raw.pagination.max_limit = Some(20);

        let err = Settings::from_raw(raw).expect_err("default above max rejected");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "pagination.default_limit",
                ..
            }
        ));
    }

    #[test]
    fn blank_database_url_means_in_memory() {
        let mut raw = RawSettings::default();
        raw.database.url = Some("   ".to_string());
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert!(settings.database.url.is_none());
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = RawSettings::default();
        let overrides = ServeOverrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["mediawatch"]);
        let command = args
            .command
            .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
        assert!(matches!(command, Command::Serve(_)));
    }

    #[test]
    fn parse_serve_overrides() {
        let args = CliArgs::parse_from([
            "mediawatch",
            "serve",
            "--server-host",
            "0.0.0.0",
            "--database-url",
            "postgres://override",
            "--cache-enabled",
            "false",
        ]);

        match args.command.expect("serve command") {
            Command::Serve(serve) => {
                assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
                assert_eq!(
                    serve.overrides.database_url.as_deref(),
                    Some("postgres://override")
                );
                assert_eq!(serve.overrides.cache_enabled, Some(false));
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn parse_migrate_arguments() {
        let args = CliArgs::parse_from([
            "mediawatch",
            "migrate",
            "--database-url",
            "postgres://example",
        ]);

        match args.command.expect("migrate command") {
            Command::Migrate(migrate) => {
                assert_eq!(
                    migrate.database.database_url.as_deref(),
                    Some("postgres://example")
                );
            }
            _ => panic!("wrong command parsed"),
        }
    }
}
