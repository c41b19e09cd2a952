//! Config Store (C1)

pub mod config_store;
pub mod models;

pub use config_store::ConfigStore;
pub use models::{AgentConfigRecord, MetricEvent, VersionAction, VersionHistoryEntry, VersionMetrics};
