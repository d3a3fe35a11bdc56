//! Graph definitions handed to the monitoring agent.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::derived::{DISK_USED_PERCENT, FDS_PERCENTAGE};

const REQUEST_DURATION: &str = "minio_http_requests_duration_seconds";

/// Latency buckets that get graphed, key suffix and label.
const LATENCY_BUCKETS: [(&str, &str); 6] = [
    ("0_001", "1ms"),
    ("0_003", "3ms"),
    ("0_005", "5ms"),
    ("0_5", "500ms"),
    ("1", "1s"),
    ("total", "total"),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Graph {
    pub label: String,
    pub unit: String,
    pub metrics: Vec<GraphMetric>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphMetric {
    pub name: String,
    pub label: String,
    pub stacked: bool,
    /// Reported as a per-minute rate instead of the raw counter.
    #[serde(skip)]
    pub diff: bool,
}

impl GraphMetric {
    fn new(name: impl Into<String>, label: &str) -> Self {
        Self {
            name: name.into(),
            label: label.to_string(),
            stacked: false,
            diff: false,
        }
    }

    fn stacked(mut self) -> Self {
        self.stacked = true;
        self
    }

    fn diff(mut self) -> Self {
        self.diff = true;
        self
    }
}

fn graph(label: String, unit: &str, metrics: Vec<GraphMetric>) -> Graph {
    Graph {
        label,
        unit: unit.to_string(),
        metrics,
    }
}

fn latency_graph(label_prefix: &str, method: &str) -> Graph {
    let metrics = LATENCY_BUCKETS
        .iter()
        .map(|(suffix, label)| {
            GraphMetric::new(format!("{REQUEST_DURATION}_{method}_{suffix}"), label).diff()
        })
        .collect();
    graph(
        format!("{label_prefix} HTTP {method} Request Duration"),
        "integer",
        metrics,
    )
}

/// Upper-cases the first letter of every word.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut word_start = true;
    for c in text.chars() {
        if word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        word_start = c.is_whitespace();
    }
    out
}

/// All graphs, keyed by graph name without the key prefix.
pub fn graph_definition(prefix: &str) -> BTreeMap<String, Graph> {
    let label_prefix = title_case(prefix);
    let p = label_prefix.as_str();

    let mut graphs = BTreeMap::new();
    graphs.insert(
        "threads".to_string(),
        graph(
            format!("{p} Threads"),
            "integer",
            vec![
                GraphMetric::new("go_goroutines", "Goroutines"),
                GraphMetric::new("go_threads", "OS Threads"),
            ],
        ),
    );
    graphs.insert(
        "memstats.alloc".to_string(),
        graph(
            format!("{p} Memory Stats"),
            "bytes",
            vec![
                GraphMetric::new("go_memstats_alloc_bytes_total", "Total Memory Bytes Allocated"),
                GraphMetric::new("go_memstats_alloc_bytes", "Memory Bytes Allocated"),
                GraphMetric::new("go_memstats_frees_total", "Free"),
            ],
        ),
    );
    graphs.insert(
        "disk_usage".to_string(),
        graph(
            format!("{p} Disk Usage Percentage"),
            "percentage",
            vec![GraphMetric::new(DISK_USED_PERCENT, "Used")],
        ),
    );
    graphs.insert(
        "disk.availability".to_string(),
        graph(
            format!("{p} Disk Availability"),
            "integer",
            vec![
                GraphMetric::new("minio_offline_disks", "Offline Disk Counts"),
                GraphMetric::new("minio_total_disks", "Online Disk Counts"),
            ],
        ),
    );
    graphs.insert(
        "process.cpu".to_string(),
        graph(
            format!("{p} Process CPU Time"),
            "float",
            vec![GraphMetric::new("process_cpu_seconds_total", "In Seconds").stacked()],
        ),
    );
    graphs.insert(
        "process.fds".to_string(),
        graph(
            format!("{p} Process FDs Percentage"),
            "percentage",
            vec![GraphMetric::new(FDS_PERCENTAGE, "Consumed").stacked()],
        ),
    );
    graphs.insert(
        "network".to_string(),
        graph(
            format!("{p} Network"),
            "bytes",
            vec![
                GraphMetric::new("minio_network_received_bytes_total", "Total Received Bytes"),
                GraphMetric::new("minio_network_sent_bytes_total", "Total Sent Bytes"),
            ],
        ),
    );
    graphs.insert(
        "http.inflight_request_counts".to_string(),
        graph(
            format!("{p} HTTP Inflight Request Counts"),
            "integer",
            vec![
                GraphMetric::new("promhttp_metric_handler_requests_in_flight", "In Flight")
                    .stacked(),
            ],
        ),
    );
    graphs.insert(
        "http.request_counts".to_string(),
        graph(
            format!("{p} HTTP Request Counts"),
            "integer",
            ["200", "500", "503"]
                .iter()
                .map(|code| {
                    GraphMetric::new(format!("promhttp_metric_handler_requests_total_{code}"), code)
                        .stacked()
                })
                .collect(),
        ),
    );
    for method in ["GET", "POST", "PUT", "HEAD"] {
        graphs.insert(
            format!("http_{}", method.to_lowercase()),
            latency_graph(p, method),
        );
    }
    graphs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_count() {
        assert_eq!(graph_definition("minio").len(), 13);
    }

    #[test]
    fn test_labels_use_title_cased_prefix() {
        let graphs = graph_definition("minio");
        assert_eq!(graphs["threads"].label, "Minio Threads");
        assert_eq!(graphs["http_get"].label, "Minio HTTP GET Request Duration");
        assert_eq!(title_case("object store"), "Object Store");
    }

    #[test]
    fn test_latency_graphs_are_diffs() {
        let graphs = graph_definition("minio");
        let put = &graphs["http_put"];
        assert_eq!(put.metrics.len(), 6);
        assert!(put.metrics.iter().all(|m| m.diff));
        assert_eq!(put.metrics[0].name, "minio_http_requests_duration_seconds_PUT_0_001");
        assert_eq!(put.metrics[5].name, "minio_http_requests_duration_seconds_PUT_total");
        assert!(!graphs["threads"].metrics[0].diff);
    }

    #[test]
    fn test_serialized_metric_omits_diff() {
        let metric = GraphMetric::new("a", "A").diff();
        let json = serde_json::to_value(&metric).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "a", "label": "A", "stacked": false})
        );
    }
}
