//! Flattening of decoded families into snapshot keys.
//!
//! Key rules:
//! - an unlabeled scalar sample is stored under the family name,
//! - a sample with a `code` label is stored under `{family}_{code}`,
//! - any other label set falls back to the family name, so such samples
//!   collide and the last one wins,
//! - histogram samples need a `request_type` label and yield
//!   `{family}_{request_type}_total` and one key per bucket bound with dots
//!   replaced by underscores,
//! - summaries are not supported and dropped.

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::prom::{HistogramValueSample, Labels, MetricFamily, Sample, SingleValueSample};
use crate::snapshot::{Snapshot, SnapshotBuilder, Value};

/// Label carrying the HTTP status code of request counters.
pub const CODE_LABEL: &str = "code";
/// Label carrying the HTTP method of request duration histograms.
pub const REQUEST_TYPE_LABEL: &str = "request_type";

/// Flattens every family into a fresh snapshot.
pub fn flatten(families: &[MetricFamily]) -> Result<Snapshot> {
    let mut builder = SnapshotBuilder::new();
    for family in families {
        flatten_family(&mut builder, family)?;
    }
    Ok(builder.build())
}

/// Adds the keys of one family to `builder`.
pub fn flatten_family(builder: &mut SnapshotBuilder, family: &MetricFamily) -> Result<()> {
    for sample in &family.samples {
        match sample {
            Sample::CounterSample(s) | Sample::GaugeSample(s) | Sample::UntypedSample(s) => {
                flatten_single(builder, &family.name, s)
            }
            Sample::HistogramSample(h) => flatten_histogram(builder, &family.name, h)?,
            Sample::SummarySample(_) => {
                trace!("Dropping summary sample of {}", family.name);
            }
        }
    }
    Ok(())
}

/// Key of a scalar sample.
pub fn metric_name(base: &str, labels: &Labels) -> String {
    match labels.get(CODE_LABEL) {
        Some(code) => format!("{base}_{code}"),
        None => base.to_string(),
    }
}

/// Interprets value text, integers stay integers.
pub fn parse_value(text: &str) -> Option<Value> {
    if let Ok(v) = text.parse::<u64>() {
        return Some(Value::Uint(v));
    }
    text.parse::<f64>().ok().map(Value::Float)
}

fn flatten_single(builder: &mut SnapshotBuilder, family: &str, sample: &SingleValueSample) {
    let key = metric_name(family, &sample.labels);
    let Some(value) = parse_value(&sample.value) else {
        debug!("Dropping {key}: unsupported value {:?}", sample.value);
        return;
    };
    if let Some(previous) = builder.insert(key.as_str(), value) {
        debug!(
            "{key} overwritten ({previous} -> {value}), labels {:?} are not supported",
            sample.labels
        );
    }
}

fn flatten_histogram(
    builder: &mut SnapshotBuilder,
    family: &str,
    sample: &HistogramValueSample,
) -> Result<()> {
    let Some(request_type) = sample.labels.get(REQUEST_TYPE_LABEL) else {
        trace!("Skipping histogram sample of {family} without {REQUEST_TYPE_LABEL} label");
        return Ok(());
    };
    let base = format!("{family}_{request_type}");

    let total_key = format!("{base}_total");
    let total = parse_count(&total_key, &sample.count)?;
    builder.insert(total_key, Value::Uint(total));

    for (bound, count) in &sample.buckets {
        let key = format!("{base}_{}", bound.replace('.', "_"));
        let count = parse_count(&key, count)?;
        builder.insert(key, Value::Uint(count));
    }
    Ok(())
}

fn parse_count(key: &str, text: &str) -> Result<u64> {
    text.parse::<u64>().map_err(|source| Error::InvalidCount {
        key: key.to_string(),
        value: text.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prom::test_data::MINIO_METRICS;
    use crate::prom::{decode, MetricType, SummaryValueSample};
    use assert_matches::assert_matches;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn gauge(name: &str, samples: Vec<(Labels, &str)>) -> MetricFamily {
        MetricFamily {
            name: name.to_string(),
            help: None,
            metric_type: MetricType::Gauge,
            samples: samples
                .into_iter()
                .map(|(labels, value)| {
                    Sample::GaugeSample(SingleValueSample {
                        labels,
                        value: value.to_string(),
                        timestamp: None,
                    })
                })
                .collect(),
        }
    }

    fn histogram(name: &str, sample_labels: &[(&str, &str)], count: &str) -> MetricFamily {
        MetricFamily {
            name: name.to_string(),
            help: None,
            metric_type: MetricType::Histogram,
            samples: vec![Sample::HistogramSample(HistogramValueSample {
                labels: labels(sample_labels),
                count: count.to_string(),
                sum: "1.5".to_string(),
                buckets: vec![
                    ("0.001".to_string(), "9334".to_string()),
                    ("1".to_string(), "18662".to_string()),
                    ("+Inf".to_string(), "18666".to_string()),
                ],
            })],
        }
    }

    #[test]
    fn test_unlabeled_float() {
        let family = gauge("process_cpu_seconds_total", vec![(Labels::new(), "233.84")]);
        let snapshot = flatten(&[family]).unwrap();
        assert_eq!(
            snapshot.get("process_cpu_seconds_total"),
            Some(Value::Float(233.84))
        );
    }

    #[test]
    fn test_integer_text_prefers_uint() {
        let snapshot = flatten(&[gauge("go_goroutines", vec![(Labels::new(), "19")])]).unwrap();
        assert_eq!(snapshot.get("go_goroutines"), Some(Value::Uint(19)));

        let snapshot = flatten(&[gauge("negative", vec![(Labels::new(), "-1")])]).unwrap();
        assert_eq!(snapshot.get("negative"), Some(Value::Float(-1.0)));
    }

    #[test]
    fn test_code_label_disambiguates() {
        let family = gauge(
            "promhttp_metric_handler_requests_total",
            vec![
                (labels(&[("code", "200")]), "9256"),
                (labels(&[("code", "500")]), "0.5"),
            ],
        );
        let snapshot = flatten(&[family]).unwrap();
        assert_eq!(
            snapshot.get("promhttp_metric_handler_requests_total_200"),
            Some(Value::Uint(9256))
        );
        assert_eq!(
            snapshot.get("promhttp_metric_handler_requests_total_500"),
            Some(Value::Float(0.5))
        );
        assert!(!snapshot.contains_key("promhttp_metric_handler_requests_total"));
    }

    #[test]
    fn test_other_labels_collide() {
        let family = gauge(
            "minio_disk_usage",
            vec![
                (labels(&[("disk", "/a")]), "1"),
                (labels(&[("disk", "/b")]), "2"),
            ],
        );
        let snapshot = flatten(&[family]).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("minio_disk_usage"), Some(Value::Uint(2)));
    }

    #[test]
    fn test_unparsable_value_is_dropped() {
        let snapshot = flatten(&[gauge("weird", vec![(Labels::new(), "12abc")])]).unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_histogram_keys() {
        let family = histogram(
            "minio_http_requests_duration_seconds",
            &[("request_type", "GET")],
            "18666",
        );
        let snapshot = flatten(&[family]).unwrap();
        assert_eq!(snapshot.len(), 4);
        assert_eq!(
            snapshot.get("minio_http_requests_duration_seconds_GET_0_001"),
            Some(Value::Uint(9334))
        );
        assert_eq!(
            snapshot.get("minio_http_requests_duration_seconds_GET_1"),
            Some(Value::Uint(18662))
        );
        assert_eq!(
            snapshot.get("minio_http_requests_duration_seconds_GET_+Inf"),
            Some(Value::Uint(18666))
        );
        assert_eq!(
            snapshot.get("minio_http_requests_duration_seconds_GET_total"),
            Some(Value::Uint(18666))
        );
    }

    #[test]
    fn test_histogram_without_request_type_is_skipped() {
        let family = histogram("lat", &[("method", "GET")], "3");
        let snapshot = flatten(&[family]).unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_histogram_bad_count_is_fatal() {
        let family = histogram("lat", &[("request_type", "GET")], "1.5e+06");
        let err = flatten(&[family]).unwrap_err();
        assert_matches!(err, Error::InvalidCount { key, .. } if key == "lat_GET_total");
    }

    #[test]
    fn test_decoded_million_counts_are_uint() {
        let text = "# TYPE minio_http_requests_duration_seconds histogram\n\
                    minio_http_requests_duration_seconds_bucket{request_type=\"GET\",le=\"0.001\"} 1000000\n\
                    minio_http_requests_duration_seconds_bucket{request_type=\"GET\",le=\"+Inf\"} 2000000\n\
                    minio_http_requests_duration_seconds_sum{request_type=\"GET\"} 7654321.5\n\
                    minio_http_requests_duration_seconds_count{request_type=\"GET\"} 2000000\n";
        let snapshot = flatten(&decode(text).unwrap()).unwrap();
        assert_eq!(
            snapshot.get("minio_http_requests_duration_seconds_GET_total"),
            Some(Value::Uint(2_000_000))
        );
        assert_eq!(
            snapshot.get("minio_http_requests_duration_seconds_GET_0_001"),
            Some(Value::Uint(1_000_000))
        );
        assert_eq!(
            snapshot.get("minio_http_requests_duration_seconds_GET_+Inf"),
            Some(Value::Uint(2_000_000))
        );
    }

    #[test]
    fn test_summary_is_dropped() {
        let family = MetricFamily {
            name: "go_gc_duration_seconds".to_string(),
            help: None,
            metric_type: MetricType::Summary,
            samples: vec![Sample::SummarySample(SummaryValueSample {
                labels: Labels::new(),
                count: "3395".to_string(),
                sum: "0.56".to_string(),
                quantiles: Vec::new(),
            })],
        };
        assert!(flatten(&[family]).unwrap().is_empty());
    }

    #[test]
    fn test_flatten_is_deterministic() {
        let families = decode(MINIO_METRICS).unwrap();
        let first = flatten(&families).unwrap();
        let second = flatten(&families).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_flatten_minio_sample() {
        let snapshot = flatten(&decode(MINIO_METRICS).unwrap()).unwrap();
        assert_eq!(snapshot.get("go_goroutines"), Some(Value::Uint(19)));
        assert_eq!(snapshot.get("go_threads"), Some(Value::Uint(14)));
        assert_eq!(snapshot.get("go_info"), Some(Value::Uint(1)));
        assert_eq!(
            snapshot.get("go_memstats_alloc_bytes"),
            Some(Value::Float(5514112.0))
        );
        assert_eq!(
            snapshot.get("process_virtual_memory_max_bytes"),
            Some(Value::Float(-1.0))
        );
        assert_eq!(
            snapshot.get("minio_http_requests_duration_seconds_PUT_total"),
            Some(Value::Uint(221))
        );
        assert!(!snapshot.contains_key("go_gc_duration_seconds"));
    }
}
