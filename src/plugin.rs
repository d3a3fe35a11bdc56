//! The metrics cycle: fetch, flatten, derive.

use std::collections::BTreeMap;

use log::debug;

use crate::derived::derive_metrics;
use crate::error::Result;
use crate::flatten::flatten;
use crate::graphs::{graph_definition, Graph};
use crate::prom::MetricScraper;
use crate::snapshot::Snapshot;

pub const DEFAULT_SCHEME: &str = "http";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: &str = "9000";
pub const DEFAULT_METRICS_PATH: &str = "/minio/prometheus/metrics";
pub const DEFAULT_PREFIX: &str = "minio";

/// Where to scrape and how to name the reported keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    pub scheme: String,
    pub host: String,
    pub port: String,
    pub metrics_path: String,
    pub prefix: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT.to_string(),
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl PluginConfig {
    pub fn metrics_endpoint(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.scheme, self.host, self.port, self.metrics_path
        )
    }
}

#[derive(Debug)]
pub struct MinioPlugin {
    config: PluginConfig,
    scraper: MetricScraper,
}

impl MinioPlugin {
    pub fn new(config: PluginConfig) -> Result<MinioPlugin> {
        let scraper = MetricScraper::new(config.metrics_endpoint())?;
        Ok(MinioPlugin { config, scraper })
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn metric_key_prefix(&self) -> &str {
        if self.config.prefix.is_empty() {
            DEFAULT_PREFIX
        } else {
            &self.config.prefix
        }
    }

    /// Runs one cycle. Every call scrapes anew, nothing is shared between
    /// calls.
    pub async fn fetch_metrics(&self) -> Result<Snapshot> {
        let families = self.scraper.fetch().await?;
        let snapshot = flatten(&families)?;
        debug!("Flattened {} keys", snapshot.len());
        derive_metrics(snapshot)
    }

    pub fn graph_definition(&self) -> BTreeMap<String, Graph> {
        graph_definition(self.metric_key_prefix())
    }
}
