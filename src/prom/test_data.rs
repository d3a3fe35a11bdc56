/// Scrape of a single-disk MinIO server.
pub const MINIO_METRICS: &str = include_str!("../../testdata/minio_metrics.prom");
