//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    fmt,
    net::SocketAddr,
    num::NonZeroU64,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "magicbox";
const ENV_PREFIX: &str = "MAGICBOX";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_ADMIN_HOST: &str = "127.0.0.1";
const DEFAULT_PUBLIC_PORT: u16 = 8080;
const DEFAULT_ADMIN_PORT: u16 = 8081;
const DEFAULT_CACHE_MAX_SIZE_MB: u64 = 1024;
const DEFAULT_CACHE_TTL_SECS: u64 = 30 * 24 * 60 * 60;
const DEFAULT_CACHE_CLEAN_INTERVAL_SECS: u64 = 60 * 60;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub admin: AdminSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub s3: S3Settings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub public_addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct AdminSettings {
    pub enabled: bool,
    pub addr: SocketAddr,
    /// Bearer token; `None` leaves the admin surface unauthenticated.
    pub token: Option<Secret>,
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
pub struct CacheSettings {
    pub max_size_mb: NonZeroU64,
    pub ttl: Duration,
    pub clean_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket_name: String,
    pub credential_id: String,
    pub credential_secret: Secret,
    pub endpoint: String,
    pub region: String,
    pub force_path_style: bool,
}

/// A string that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(**redacted**)")
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

    // `MAGICBOX_S3__BUCKET_NAME` -> `s3.bucket_name`
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__"),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::CheckConfig) | None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    admin: RawAdminSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    s3: RawS3Settings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.public_port {
            self.server.public_port = Some(port);
        }
        if let Some(enabled) = overrides.admin_enabled {
            self.admin.enabled = Some(enabled);
        }
        if let Some(host) = overrides.admin_host.as_ref() {
            self.admin.host = Some(host.clone());
        }
        if let Some(port) = overrides.admin_port {
            self.admin.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(size) = overrides.cache_max_size_mb {
            self.cache.max_size_mb = Some(size);
        }
        if let Some(ttl) = overrides.cache_ttl_seconds {
            self.cache.ttl_seconds = Some(ttl);
        }
        if let Some(bucket) = overrides.s3_bucket_name.as_ref() {
            self.s3.bucket_name = Some(bucket.clone());
        }
        if let Some(endpoint) = overrides.s3_endpoint.as_ref() {
            self.s3.endpoint = Some(endpoint.clone());
        }
        if let Some(region) = overrides.s3_region.as_ref() {
            self.s3.region = Some(region.clone());
        }
        if let Some(path_style) = overrides.s3_force_path_style {
            self.s3.force_path_style = Some(path_style);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            admin,
            logging,
            cache,
            s3,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            admin: build_admin_settings(admin)?,
            logging: build_logging_settings(logging)?,
            cache: build_cache_settings(cache)?,
            s3: build_s3_settings(s3)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let public_port = server.public_port.unwrap_or(DEFAULT_PUBLIC_PORT);
    if public_port == 0 {
        return Err(LoadError::invalid(
            "server.public_port",
            "port must be greater than zero",
        ));
    }

    let public_addr = parse_socket_addr(&host, public_port)
        .map_err(|reason| LoadError::invalid("server.public_addr", reason))?;

    Ok(ServerSettings { public_addr })
}

fn build_admin_settings(admin: RawAdminSettings) -> Result<AdminSettings, LoadError> {
    let host = admin.host.unwrap_or_else(|| DEFAULT_ADMIN_HOST.to_string());
    let port = admin.port.unwrap_or(DEFAULT_ADMIN_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "admin.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("admin.addr", reason))?;

    Ok(AdminSettings {
        enabled: admin.enabled.unwrap_or(true),
        addr,
        token: non_empty(admin.token).map(Secret),
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

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let max_size_mb_value = cache.max_size_mb.unwrap_or(DEFAULT_CACHE_MAX_SIZE_MB);
    let max_size_mb = NonZeroU64::new(max_size_mb_value)
        .ok_or_else(|| LoadError::invalid("cache.max_size_mb", "must be greater than zero"))?;
    usize::try_from(max_size_mb_value)
        .ok()
        .and_then(|mb| mb.checked_mul(1024 * 1024))
        .ok_or_else(|| {
            LoadError::invalid(
                "cache.max_size_mb",
                "value exceeds supported range for usize",
            )
        })?;

    let ttl_seconds = cache.ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS);
    if ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.ttl_seconds",
            "must be greater than zero",
        ));
    }

    let clean_interval_seconds = cache
        .clean_interval_seconds
        .unwrap_or(DEFAULT_CACHE_CLEAN_INTERVAL_SECS);
    if clean_interval_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.clean_interval_seconds",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        max_size_mb,
        ttl: Duration::from_secs(ttl_seconds),
        clean_interval: Duration::from_secs(clean_interval_seconds),
    })
}

fn build_s3_settings(s3: RawS3Settings) -> Result<S3Settings, LoadError> {
    Ok(S3Settings {
        bucket_name: required(s3.bucket_name, "s3.bucket_name")?,
        credential_id: required(s3.credential_id, "s3.credential_id")?,
        credential_secret: Secret(required(s3.credential_secret, "s3.credential_secret")?),
        endpoint: required(s3.endpoint, "s3.endpoint")?,
        region: required(s3.region, "s3.region")?,
        force_path_style: s3.force_path_style.unwrap_or(false),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    public_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAdminSettings {
    enabled: Option<bool>,
    host: Option<String>,
    port: Option<u16>,
    token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    max_size_mb: Option<u64>,
    ttl_seconds: Option<u64>,
    clean_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawS3Settings {
    bucket_name: Option<String>,
    credential_id: Option<String>,
    credential_secret: Option<String>,
    endpoint: Option<String>,
    region: Option<String>,
    force_path_style: Option<bool>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn required(value: Option<String>, key: &'static str) -> Result<String, LoadError> {
    non_empty(value).ok_or_else(|| LoadError::invalid(key, "missing required value"))
}
