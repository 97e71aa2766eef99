use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the Magicbox binary.
#[derive(Debug, Parser)]
#[command(
    name = "magicbox",
    version,
    about = "Caching reverse proxy for S3-compatible object stores"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "MAGICBOX_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the public and admin HTTP listeners.
    Serve(Box<ServeArgs>),
    /// Load and validate configuration, then exit.
    #[command(name = "check-config")]
    CheckConfig,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the public listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the public listener port.
    #[arg(long = "server-public-port", value_name = "PORT")]
    pub public_port: Option<u16>,

    /// Enable or disable the admin listener.
    #[arg(
        long = "admin-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub admin_enabled: Option<bool>,

    /// Override the admin listener host.
    #[arg(long = "admin-host", value_name = "HOST")]
    pub admin_host: Option<String>,

    /// Override the admin listener port.
    #[arg(long = "admin-port", value_name = "PORT")]
    pub admin_port: Option<u16>,

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

    /// Override the cache size ceiling in megabytes.
    #[arg(long = "cache-max-size-mb", value_name = "MB")]
    pub cache_max_size_mb: Option<u64>,

    /// Override the cache entry lifetime.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<u64>,

    /// Override the bucket objects are served from.
    #[arg(long = "s3-bucket-name", value_name = "BUCKET")]
    pub s3_bucket_name: Option<String>,

    /// Override the object store endpoint URL.
    #[arg(long = "s3-endpoint", value_name = "URL")]
    pub s3_endpoint: Option<String>,

    /// Override the object store region.
    #[arg(long = "s3-region", value_name = "REGION")]
    pub s3_region: Option<String>,

    /// Toggle path-style bucket addressing.
    #[arg(
        long = "s3-force-path-style",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub s3_force_path_style: Option<bool>,
}
