use std::path::PathBuf;

use clap::Parser;
use clap::ValueHint;

use minio_plugin::plugin::{
    PluginConfig, DEFAULT_HOST, DEFAULT_METRICS_PATH, DEFAULT_PORT, DEFAULT_PREFIX, DEFAULT_SCHEME,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Protocol scheme
    ///
    /// Scheme of the MinIO metrics endpoint. Certificates are not verified for https.
    #[arg(long, env="MINIO_SCHEME", value_hint=ValueHint::Other, default_value=DEFAULT_SCHEME)]
    pub scheme: String,

    /// Hostname
    ///
    /// Host of the MinIO server to scrape.
    #[arg(long, env="MINIO_HOST", value_hint=ValueHint::Hostname, default_value=DEFAULT_HOST)]
    pub host: String,

    /// Port
    ///
    /// Port of the MinIO server to scrape.
    #[arg(long, env="MINIO_PORT", value_hint=ValueHint::Other, default_value=DEFAULT_PORT)]
    pub port: String,

    /// Path to exported metrics
    #[arg(long, env="MINIO_METRICS_PATH", value_hint=ValueHint::Other, default_value=DEFAULT_METRICS_PATH)]
    pub metrics_path: String,

    /// Metric key prefix
    ///
    /// Prefix of every reported key and of the graph labels.
    #[arg(long, env="MINIO_METRIC_KEY_PREFIX", value_hint=ValueHint::Other, default_value=DEFAULT_PREFIX)]
    pub metric_key_prefix: String,

    /// Temp file name
    ///
    /// File keeping the previous values for per-minute rates. Defaults to
    /// mackerel-plugin-minio-<HOST>-<PORT> in the plugin work directory.
    #[arg(long, value_hint=ValueHint::FilePath)]
    pub tempfile: Option<PathBuf>,

    /// Set the logging level
    #[arg(short, long, env="LOG_LEVEL", value_hint=ValueHint::Other, default_value="WARN")]
    pub loglevel: log::LevelFilter,

    /// Log to this file instead of stderr
    #[arg(long, env="LOG_FILE", value_hint=ValueHint::FilePath)]
    pub logfile: Option<PathBuf>,
}

impl Cli {
    pub fn plugin_config(&self) -> PluginConfig {
        PluginConfig {
            scheme: self.scheme.clone(),
            host: self.host.clone(),
            port: self.port.clone(),
            metrics_path: self.metrics_path.clone(),
            prefix: self.metric_key_prefix.clone(),
        }
    }
}
