//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64, NonZeroUsize},
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
const LOCAL_CONFIG_BASENAME: &str = "verdura";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 4000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CACHE_LOCAL_CAPACITY: usize = 2048;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_CACHE_RECONNECT_COOLDOWN_SECS: u64 = 5;
const DEFAULT_CACHE_MAX_RECONNECT_ATTEMPTS: u32 = 10;
const DEFAULT_AUTH_LIMIT_MAX: u32 = 5;
const DEFAULT_AUTH_LIMIT_WINDOW_SECS: u64 = 900;
const DEFAULT_API_LIMIT_MAX: u32 = 100;
const DEFAULT_API_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_SEARCH_LIMIT_MAX: u32 = 30;
const DEFAULT_SEARCH_LIMIT_WINDOW_SECS: u64 = 10;
const DEFAULT_CSRF_TTL_SECS: u64 = 7200;
const DEFAULT_TRASH_RETENTION_DAYS: u32 = 30;
// Daily at 03:15 UTC, off the top of the hour.
const DEFAULT_PURGE_SCHEDULE: &str = "0 15 3 * * *";

/// Command-line arguments for the Verdura binary.
#[derive(Debug, Parser)]
#[command(name = "verdura", version, about = "Verdura storefront API server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "VERDURA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the Verdura HTTP service and background workers.
    Serve(Box<ServeArgs>),
    /// Run a single trash purge pass and exit.
    #[command(name = "purge-trash")]
    PurgeTrash(PurgeArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: Overrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct PurgeArgs {
    #[command(flatten)]
    pub overrides: Overrides,

    /// Override the retention window in days for this purge pass.
    #[arg(long = "retention-days", value_name = "DAYS")]
    pub retention_days: Option<u32>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
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

    /// Override the runtime environment (development|production).
    #[arg(long = "runtime-env", value_name = "ENV")]
    pub runtime_env: Option<String>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the Redis connection URL for the distributed cache tier.
    #[arg(long = "cache-redis-url", value_name = "URL")]
    pub cache_redis_url: Option<String>,

    /// Override the CSRF signing secret.
    #[arg(long = "csrf-secret", env = "VERDURA_CSRF_SECRET", value_name = "SECRET")]
    pub csrf_secret: Option<String>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub runtime_env: RuntimeEnv,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub rate_limit: RateLimitSettings,
    pub csrf: CsrfSettings,
    pub trash: TrashSettings,
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

/// Controls whether internal error detail is exposed in response bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEnv {
    Development,
    Production,
}

impl RuntimeEnv {
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for RuntimeEnv {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub local_capacity: NonZeroUsize,
    pub default_ttl: Duration,
    pub redis_url: Option<String>,
    pub reconnect_cooldown: Duration,
    pub max_reconnect_attempts: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct WindowSettings {
    pub max_requests: NonZeroU32,
    pub window: Duration,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub auth: WindowSettings,
    pub api: WindowSettings,
    pub search: WindowSettings,
}

#[derive(Debug, Clone)]
pub struct CsrfSettings {
    pub secret: String,
    pub token_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct TrashSettings {
    pub retention_days: NonZeroU64,
    pub purge_schedule: String,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read configuration: {0}")]
    Read(#[from] config::ConfigError),
    #[error("invalid setting `{key}`: {message}")]
    Invalid { key: &'static str, message: String },
}

impl SettingsError {
    fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }
}

/// Raw deserialization target for the `config` crate before validation.
#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    #[serde(default)]
    server: RawServer,
    #[serde(default)]
    logging: RawLogging,
    #[serde(default)]
    runtime: RawRuntime,
    #[serde(default)]
    database: RawDatabase,
    #[serde(default)]
    cache: RawCache,
    #[serde(default)]
    rate_limit: RawRateLimit,
    #[serde(default)]
    csrf: RawCsrf,
    #[serde(default)]
    trash: RawTrash,
}

#[derive(Debug, Default, Deserialize)]
struct RawServer {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLogging {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRuntime {
    env: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDatabase {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCache {
    enabled: Option<bool>,
    local_capacity: Option<usize>,
    default_ttl_seconds: Option<u64>,
    redis_url: Option<String>,
    reconnect_cooldown_seconds: Option<u64>,
    max_reconnect_attempts: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RawWindow {
    max_requests: Option<u32>,
    window_seconds: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRateLimit {
    #[serde(default)]
    auth: RawWindow,
    #[serde(default)]
    api: RawWindow,
    #[serde(default)]
    search: RawWindow,
}

#[derive(Debug, Default, Deserialize)]
struct RawCsrf {
    secret: Option<String>,
    token_ttl_seconds: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTrash {
    retention_days: Option<u32>,
    purge_schedule: Option<String>,
}

/// Parse CLI arguments and resolve settings with full precedence.
pub fn load_with_cli() -> Result<(CliArgs, Settings), SettingsError> {
    let cli = CliArgs::parse();
    let overrides = match &cli.command {
        Some(Command::Serve(args)) => args.overrides.clone(),
        Some(Command::PurgeTrash(args)) => args.overrides.clone(),
        None => Overrides::default(),
    };
    let settings = load(cli.config_file.as_deref(), &overrides)?;
    Ok((cli, settings))
}

/// Resolve settings from layered sources. `config_file` beats the default
/// basenames; environment variables use the `VERDURA_` prefix with `__`
/// separators (`VERDURA_SERVER__PORT=8080`); CLI overrides beat everything.
pub fn load(
    config_file: Option<&std::path::Path>,
    overrides: &Overrides,
) -> Result<Settings, SettingsError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    let raw: RawSettings = builder
        .add_source(Environment::with_prefix("VERDURA").separator("__"))
        .build()?
        .try_deserialize()?;

    resolve(raw, overrides)
}

fn resolve(raw: RawSettings, overrides: &Overrides) -> Result<Settings, SettingsError> {
    let host = overrides
        .server_host
        .clone()
        .or(raw.server.host)
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = overrides.server_port.or(raw.server.port).unwrap_or(DEFAULT_PORT);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|err| SettingsError::invalid("server.host", format!("{err}")))?;

    let graceful_shutdown = Duration::from_secs(
        overrides
            .server_graceful_shutdown_seconds
            .or(raw.server.graceful_shutdown_seconds)
            .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS),
    );

    let level_text = overrides
        .log_level
        .clone()
        .or(raw.logging.level)
        .unwrap_or_else(|| "info".to_string());
    let level = LevelFilter::from_str(&level_text)
        .map_err(|_| SettingsError::invalid("logging.level", format!("unknown level `{level_text}`")))?;
    let format = match overrides.log_json.or(raw.logging.json).unwrap_or(false) {
        true => LogFormat::Json,
        false => LogFormat::Compact,
    };

    let env_text = overrides
        .runtime_env
        .clone()
        .or(raw.runtime.env)
        .unwrap_or_else(|| "production".to_string());
    let runtime_env = RuntimeEnv::from_str(&env_text)
        .map_err(|_| SettingsError::invalid("runtime.env", format!("unknown environment `{env_text}`")))?;

    let database = DatabaseSettings {
        url: overrides.database_url.clone().or(raw.database.url),
        max_connections: non_zero_u32(
            "database.max_connections",
            overrides
                .database_max_connections
                .or(raw.database.max_connections)
                .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
        )?,
    };

    let cache = CacheSettings {
        enabled: raw.cache.enabled.unwrap_or(true),
        local_capacity: NonZeroUsize::new(
            raw.cache.local_capacity.unwrap_or(DEFAULT_CACHE_LOCAL_CAPACITY),
        )
        .ok_or_else(|| SettingsError::invalid("cache.local_capacity", "must be non-zero"))?,
        default_ttl: Duration::from_secs(
            raw.cache.default_ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS),
        ),
        redis_url: overrides.cache_redis_url.clone().or(raw.cache.redis_url),
        reconnect_cooldown: Duration::from_secs(
            raw.cache
                .reconnect_cooldown_seconds
                .unwrap_or(DEFAULT_CACHE_RECONNECT_COOLDOWN_SECS),
        ),
        max_reconnect_attempts: raw
            .cache
            .max_reconnect_attempts
            .unwrap_or(DEFAULT_CACHE_MAX_RECONNECT_ATTEMPTS),
    };

    let rate_limit = RateLimitSettings {
        auth: window(
            "rate_limit.auth",
            &raw.rate_limit.auth,
            DEFAULT_AUTH_LIMIT_MAX,
            DEFAULT_AUTH_LIMIT_WINDOW_SECS,
        )?,
        api: window(
            "rate_limit.api",
            &raw.rate_limit.api,
            DEFAULT_API_LIMIT_MAX,
            DEFAULT_API_LIMIT_WINDOW_SECS,
        )?,
        search: window(
            "rate_limit.search",
            &raw.rate_limit.search,
            DEFAULT_SEARCH_LIMIT_MAX,
            DEFAULT_SEARCH_LIMIT_WINDOW_SECS,
        )?,
    };

    let secret = overrides
        .csrf_secret
        .clone()
        .or(raw.csrf.secret)
        .unwrap_or_default();
    if secret.len() < 32 {
        return Err(SettingsError::invalid(
            "csrf.secret",
            "secret must be at least 32 bytes; set VERDURA_CSRF_SECRET",
        ));
    }
    let csrf = CsrfSettings {
        secret,
        token_ttl: Duration::from_secs(
            raw.csrf.token_ttl_seconds.unwrap_or(DEFAULT_CSRF_TTL_SECS),
        ),
    };

    let trash = TrashSettings {
        retention_days: NonZeroU64::new(u64::from(
            raw.trash.retention_days.unwrap_or(DEFAULT_TRASH_RETENTION_DAYS),
        ))
        .ok_or_else(|| SettingsError::invalid("trash.retention_days", "must be non-zero"))?,
        purge_schedule: raw
            .trash
            .purge_schedule
            .unwrap_or_else(|| DEFAULT_PURGE_SCHEDULE.to_string()),
    };

    Ok(Settings {
        server: ServerSettings {
            addr,
            graceful_shutdown,
        },
        logging: LoggingSettings { level, format },
        runtime_env,
        database,
        cache,
        rate_limit,
        csrf,
        trash,
    })
}

fn window(
    key: &'static str,
    raw: &RawWindow,
    default_max: u32,
    default_window_secs: u64,
) -> Result<WindowSettings, SettingsError> {
    Ok(WindowSettings {
        max_requests: non_zero_u32(key, raw.max_requests.unwrap_or(default_max))?,
        window: Duration::from_secs(raw.window_seconds.unwrap_or(default_window_secs)),
    })
}

fn non_zero_u32(key: &'static str, value: u32) -> Result<NonZeroU32, SettingsError> {
    NonZeroU32::new(value).ok_or_else(|| SettingsError::invalid(key, "must be non-zero"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides_with_secret() -> Overrides {
        Overrides {
            csrf_secret: Some("0123456789abcdef0123456789abcdef".to_string()),
            ..Overrides::default()
        }
    }

    #[test]
    fn defaults_resolve() {
        let settings =
            resolve(RawSettings::default(), &overrides_with_secret()).expect("defaults resolve");

        assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
        assert!(matches!(settings.runtime_env, RuntimeEnv::Production));
        assert!(settings.cache.enabled);
        assert_eq!(settings.rate_limit.auth.max_requests.get(), 5);
        assert_eq!(settings.rate_limit.auth.window.as_secs(), 900);
        assert_eq!(settings.trash.retention_days.get(), 30);
    }

    #[test]
    fn cli_overrides_beat_raw_values() {
        let raw = RawSettings {
            server: RawServer {
                port: Some(5000),
                ..RawServer::default()
            },
            ..RawSettings::default()
        };
        let overrides = Overrides {
            server_port: Some(6000),
            ..overrides_with_secret()
        };

        let settings = resolve(raw, &overrides).expect("resolve");
        assert_eq!(settings.server.addr.port(), 6000);
    }

    #[test]
    fn short_csrf_secret_is_rejected() {
        let overrides = Overrides {
            csrf_secret: Some("too-short".to_string()),
            ..Overrides::default()
        };
        let err = resolve(RawSettings::default(), &overrides).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { key: "csrf.secret", .. }));
    }

    #[test]
    fn unknown_runtime_env_is_rejected() {
        let raw = RawSettings {
            runtime: RawRuntime {
                env: Some("staging".to_string()),
            },
            ..RawSettings::default()
        };
        assert!(resolve(raw, &overrides_with_secret()).is_err());
    }
}
