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

use crate::application::seed::DEFAULT_SEED_COUNT;
use crate::cache::CacheConfig;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "casale";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/1";
const DEFAULT_MEMORY_MAX_ENTRIES: u64 = 10_000;
const DEFAULT_FETCH_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_METRICS_INTERVAL_SECS: u64 = 60;

/// Command-line arguments for the Casale binary.
#[derive(Debug, Parser)]
#[command(name = "casale", version, about = "Casale property listing service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "CASALE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP API and periodic metrics collection.
    Serve(Box<ServeArgs>),
    /// Pre-load the aggregate listing, hot locations and price ranges.
    Warm(BackendArgs),
    /// Show cache entry state and invalidation statistics.
    Stats(BackendArgs),
    /// Collect cache metrics, optionally with trend or full analysis.
    Metrics(MetricsArgs),
    /// Reset the cache store's hit/miss statistics.
    #[command(name = "reset-metrics")]
    ResetMetrics(BackendArgs),
    /// Remove cached listing entries.
    Clear(ClearArgs),
    /// Insert deterministic sample listings.
    Seed(SeedArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct BackendOverrides {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the cache backend (memory|redis).
    #[arg(long = "cache-backend", value_name = "BACKEND")]
    pub cache_backend: Option<String>,

    /// Override the Redis connection URL.
    #[arg(long = "redis-url", value_name = "URL")]
    pub redis_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct BackendArgs {
    #[command(flatten)]
    pub overrides: BackendOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub backend: BackendOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

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

    /// Override the metrics collection interval; 0 disables collection.
    #[arg(long = "cache-metrics-interval-seconds", value_name = "SECONDS")]
    pub metrics_interval_seconds: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MetricsArgs {
    #[command(flatten)]
    pub overrides: BackendOverrides,

    /// Report the hit-rate trend over recorded samples.
    #[arg(long, conflicts_with = "analysis")]
    pub trend: bool,

    /// Report metrics, trend, key inspection and recommendations.
    #[arg(long)]
    pub analysis: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ClearArgs {
    #[command(flatten)]
    pub overrides: BackendOverrides,

    /// Only remove keys matching this glob pattern.
    #[arg(long, value_name = "PATTERN")]
    pub pattern: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct SeedArgs {
    #[command(flatten)]
    pub overrides: BackendOverrides,

    /// Number of listings to create.
    #[arg(long, default_value_t = DEFAULT_SEED_COUNT)]
    pub count: usize,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
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
    /// Without a URL listings are kept in process memory.
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Redis { url: String },
}

impl CacheBackend {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis { .. } => "redis",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    pub memory_max_entries: NonZeroUsize,
    /// When false the store is treated as unable to enumerate keys.
    pub pattern_sweep: bool,
    pub fetch_timeout: Option<Duration>,
    pub metrics_history_capacity: NonZeroUsize,
    pub invalidation_log_capacity: usize,
    pub metrics_interval: Option<Duration>,
    pub warm_locations: Vec<String>,
    pub warm_price_ranges: Vec<(f64, f64)>,
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

    builder = builder.add_source(Environment::with_prefix("CASALE").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Warm(args))
        | Some(Command::Stats(args))
        | Some(Command::ResetMetrics(args)) => raw.apply_backend_overrides(&args.overrides),
        Some(Command::Metrics(args)) => raw.apply_backend_overrides(&args.overrides),
        Some(Command::Clear(args)) => raw.apply_backend_overrides(&args.overrides),
        Some(Command::Seed(args)) => raw.apply_backend_overrides(&args.overrides),
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
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_backend_overrides(&overrides.backend);
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
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
        if let Some(seconds) = overrides.metrics_interval_seconds {
            self.cache.metrics_interval_seconds = Some(seconds);
        }
    }

    fn apply_backend_overrides(&mut self, overrides: &BackendOverrides) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(backend) = overrides.cache_backend.as_ref() {
            self.cache.backend = Some(backend.clone());
        }
        if let Some(url) = overrides.redis_url.as_ref() {
            self.cache.redis_url = Some(url.clone());
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
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

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
        addr,
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
    let url = non_blank(database.url);
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
    let defaults = CacheConfig::default();

    let redis_url = non_blank(cache.redis_url);
    let backend = match cache.backend.as_deref().map(str::trim) {
        None | Some("memory") => CacheBackend::Memory,
        Some("redis") => CacheBackend::Redis {
            url: redis_url.unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
        },
        Some(other) => {
            return Err(LoadError::invalid(
                "cache.backend",
                format!("unknown backend `{other}`, expected `memory` or `redis`"),
            ));
        }
    };

    let memory_max_entries = non_zero_usize(
        cache
            .memory_max_entries
            .unwrap_or(DEFAULT_MEMORY_MAX_ENTRIES),
        "cache.memory_max_entries",
    )?;
    let metrics_history_capacity = non_zero_usize(
        cache
            .metrics_history_capacity
            .unwrap_or(defaults.metrics_history_capacity as u64),
        "cache.metrics_history_capacity",
    )?;
    let invalidation_log_capacity = cache
        .invalidation_log_capacity
        .map_or(Ok(defaults.invalidation_log_capacity), |value| {
            usize::try_from(value).map_err(|_| {
                LoadError::invalid(
                    "cache.invalidation_log_capacity",
                    "value exceeds supported range for usize",
                )
            })
        })?;

    let fetch_timeout = optional_duration(
        cache.fetch_timeout_ms.unwrap_or(DEFAULT_FETCH_TIMEOUT_MS),
        Duration::from_millis,
    );
    let metrics_interval = optional_duration(
        cache
            .metrics_interval_seconds
            .unwrap_or(DEFAULT_METRICS_INTERVAL_SECS),
        Duration::from_secs,
    );

    let warm_locations = match cache.warm_locations {
        Some(locations) => {
            let locations: Vec<String> = locations
                .into_iter()
                .map(|location| location.trim().to_string())
                .collect();
            if locations.iter().any(String::is_empty) {
                return Err(LoadError::invalid(
                    "cache.warm_locations",
                    "locations must not be empty",
                ));
            }
            locations
        }
        None => defaults.warm_locations,
    };

    let warm_price_ranges = match cache.warm_price_ranges {
        Some(ranges) => {
            for [min, max] in &ranges {
                if !min.is_finite() || !max.is_finite() || min > max {
                    return Err(LoadError::invalid(
                        "cache.warm_price_ranges",
                        format!("invalid range [{min}, {max}]"),
                    ));
                }
            }
            ranges.into_iter().map(|[min, max]| (min, max)).collect()
        }
        None => defaults.warm_price_ranges,
    };

    Ok(CacheSettings {
        backend,
        memory_max_entries,
        pattern_sweep: cache.pattern_sweep.unwrap_or(true),
        fetch_timeout,
        metrics_history_capacity,
        invalidation_log_capacity,
        metrics_interval,
        warm_locations,
        warm_price_ranges,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
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
    backend: Option<String>,
    redis_url: Option<String>,
    memory_max_entries: Option<u64>,
    pattern_sweep: Option<bool>,
    fetch_timeout_ms: Option<u64>,
    metrics_history_capacity: Option<u64>,
    invalidation_log_capacity: Option<u64>,
    metrics_interval_seconds: Option<u64>,
    warm_locations: Option<Vec<String>>,
    warm_price_ranges: Option<Vec<[f64; 2]>>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Zero disables.
fn optional_duration(value: u64, unit: fn(u64) -> Duration) -> Option<Duration> {
    (value > 0).then(|| unit(value))
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

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
