//! Output for the monitoring agent's plugin protocol.
//!
//! Values are printed as `{prefix}.{graph}.{metric}\t{value}\t{epoch}`. Diff
//! metrics are reported as per-minute rates against the values of the
//! previous run, which are kept in a JSON counter cache on disk.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::graphs::Graph;
use crate::plugin::MinioPlugin;
use crate::snapshot::{Snapshot, Value};

/// Set by the agent when it asks for graph definitions.
pub const META_ENV: &str = "MACKEREL_AGENT_PLUGIN_META";
/// Directory for the counter cache, the OS temp dir otherwise.
pub const WORKDIR_ENV: &str = "MACKEREL_PLUGIN_WORKDIR";

/// Previous values older than this are not used for rates.
const MAX_DIFF_AGE_SECS: i64 = 600;

/// Values of the previous run.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterCache {
    #[serde(rename = "_lastTime", default, skip_serializing_if = "Option::is_none")]
    last_time: Option<i64>,
    #[serde(flatten)]
    values: BTreeMap<String, Value>,
}

impl CounterCache {
    pub fn from_snapshot(snapshot: &Snapshot, now: i64) -> CounterCache {
        CounterCache {
            last_time: Some(now),
            // JSON has no representation for NaN and infinities.
            values: snapshot
                .iter()
                .filter(|(_, v)| v.as_f64().is_finite())
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        }
    }

    /// Reads the cache, a missing or corrupt file counts as an empty cache.
    pub fn load(path: &Path) -> CounterCache {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No counter cache at {}: {e}", path.display());
                return CounterCache::default();
            }
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("Ignoring corrupt counter cache {}: {e}", path.display());
            CounterCache::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn last_time(&self) -> Option<i64> {
        self.last_time
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).copied()
    }
}

/// Per-minute rate of a counter, `None` when no usable rate exists.
pub fn calc_diff(current: Value, previous: Value, elapsed_secs: i64) -> Option<f64> {
    if elapsed_secs <= 0 || elapsed_secs > MAX_DIFF_AGE_SECS {
        return None;
    }
    let delta = match (current, previous) {
        (Value::Uint(cur), Value::Uint(prev)) => cur.checked_sub(prev)? as f64,
        _ => {
            let delta = current.as_f64() - previous.as_f64();
            if delta < 0.0 {
                return None;
            }
            delta
        }
    };
    Some(delta * 60.0 / elapsed_secs as f64)
}

/// Default counter cache location for a scrape target.
pub fn default_tempfile(host: &str, port: &str) -> PathBuf {
    let dir = std::env::var_os(WORKDIR_ENV)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    dir.join(format!("mackerel-plugin-minio-{host}-{port}"))
}

/// Whether the agent asked for graph definitions instead of values.
pub fn meta_requested() -> bool {
    std::env::var_os(META_ENV).is_some_and(|v| !v.is_empty())
}

pub fn write_meta(
    out: &mut impl Write,
    prefix: &str,
    graphs: &BTreeMap<String, Graph>,
) -> Result<()> {
    #[derive(Serialize)]
    struct Meta<'a> {
        graphs: BTreeMap<String, &'a Graph>,
    }

    let meta = Meta {
        graphs: graphs
            .iter()
            .map(|(key, graph)| (format!("{prefix}.{key}"), graph))
            .collect(),
    };
    writeln!(out, "# mackerel-agent-plugin")?;
    serde_json::to_writer(&mut *out, &meta)?;
    writeln!(out)?;
    Ok(())
}

pub fn write_values(
    out: &mut impl Write,
    prefix: &str,
    graphs: &BTreeMap<String, Graph>,
    snapshot: &Snapshot,
    previous: &CounterCache,
    now: i64,
) -> Result<()> {
    for (graph_key, graph) in graphs {
        for metric in &graph.metrics {
            let Some(value) = snapshot.get(&metric.name) else {
                debug!("{} not in snapshot, skipping", metric.name);
                continue;
            };
            let reported = if metric.diff {
                previous
                    .get(&metric.name)
                    .zip(previous.last_time())
                    .and_then(|(prev, last)| calc_diff(value, prev, now - last))
            } else {
                Some(value.as_f64())
            };
            if let Some(reported) = reported {
                writeln!(
                    out,
                    "{prefix}.{graph_key}.{}\t{reported:.6}\t{now}",
                    metric.name
                )?;
            }
        }
    }
    Ok(())
}

/// Binds a plugin to its counter cache.
pub struct Agent {
    plugin: MinioPlugin,
    tempfile: PathBuf,
}

impl Agent {
    pub fn new(plugin: MinioPlugin, tempfile: Option<PathBuf>) -> Agent {
        let tempfile = tempfile.unwrap_or_else(|| {
            let config = plugin.config();
            default_tempfile(&config.host, &config.port)
        });
        Agent { plugin, tempfile }
    }

    pub fn tempfile(&self) -> &Path {
        &self.tempfile
    }

    pub fn print_meta(&self, out: &mut impl Write) -> Result<()> {
        write_meta(
            out,
            self.plugin.metric_key_prefix(),
            &self.plugin.graph_definition(),
        )
    }

    /// Fetches one snapshot, prints it and stores it for the next run. Nothing
    /// is printed when the cycle fails.
    pub async fn print_values(&self, out: &mut impl Write) -> Result<()> {
        let snapshot = self.plugin.fetch_metrics().await?;
        let now = Utc::now().timestamp();
        let previous = CounterCache::load(&self.tempfile);

        write_values(
            out,
            self.plugin.metric_key_prefix(),
            &self.plugin.graph_definition(),
            &snapshot,
            &previous,
            now,
        )?;
        CounterCache::from_snapshot(&snapshot, now).save(&self.tempfile)
    }
}
