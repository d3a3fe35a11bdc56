//! Ratios computed from raw snapshot values.

use crate::error::{Error, Result};
use crate::snapshot::{Snapshot, SnapshotBuilder, Value};

pub const MAX_FDS: &str = "process_max_fds";
pub const OPEN_FDS: &str = "process_open_fds";
pub const DISK_TOTAL_BYTES: &str = "minio_disk_storage_total_bytes";
pub const DISK_USED_BYTES: &str = "minio_disk_storage_used_bytes";

pub const FDS_PERCENTAGE: &str = "process_fds_percentage";
pub const DISK_USED_PERCENT: &str = "minio_disk_storage_used_percent";

/// Adds the file descriptor and disk usage percentages.
///
/// The four inputs are always exported by the server, a missing or
/// differently typed one fails the cycle.
pub fn derive_metrics(snapshot: Snapshot) -> Result<Snapshot> {
    let mut builder = snapshot.into_builder();

    let max_fds = require_uint(&builder, MAX_FDS)?;
    let open_fds = require_uint(&builder, OPEN_FDS)?;
    let total_bytes = require_float(&builder, DISK_TOTAL_BYTES)?;
    let used_bytes = require_float(&builder, DISK_USED_BYTES)?;

    builder.insert(
        FDS_PERCENTAGE,
        Value::Float(open_fds as f64 / max_fds as f64 * 100.0),
    );
    builder.insert(
        DISK_USED_PERCENT,
        Value::Float(used_bytes / total_bytes * 100.0),
    );
    Ok(builder.build())
}

fn require_uint(builder: &SnapshotBuilder, key: &str) -> Result<u64> {
    builder
        .get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::MissingMetric {
            key: key.to_string(),
            expected: "uint64",
        })
}

fn require_float(builder: &SnapshotBuilder, key: &str) -> Result<f64> {
    builder
        .get(key)
        .and_then(Value::as_float)
        .ok_or_else(|| Error::MissingMetric {
            key: key.to_string(),
            expected: "float64",
        })
}
