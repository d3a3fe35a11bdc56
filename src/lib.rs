//! Scrapes a MinIO server's Prometheus endpoint and turns it into the flat
//! key/value snapshot reported by the mackerel-agent plugin.

pub mod agent;
pub mod derived;
pub mod error;
pub mod flatten;
pub mod graphs;
pub mod plugin;
pub mod prom;
pub mod snapshot;

pub use crate::error::{Error, Result};
pub use crate::plugin::{MinioPlugin, PluginConfig};
pub use crate::snapshot::{Snapshot, Value};
