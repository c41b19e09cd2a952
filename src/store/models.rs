//! Persisted record types owned by the Config Store (C1)

use crate::config::ConfigDocument;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// `(agent_id, version)` is unique; at most one row per `agent_id` has
/// `is_active = true` (§3 invariant, enforced by [`crate::store::ConfigStore::activate_version`]).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AgentConfigRecord {
    pub agent_id: String,
    pub version: i64,
    pub config: ConfigDocument,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub is_active: bool,
    pub is_deprecated: bool,
    pub description: String,
}

/// Append-only audit trail of every version lifecycle transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionHistoryEntry {
    pub agent_id: String,
    pub version: i64,
    pub action: VersionAction,
    pub prev_state: Option<String>,
    pub new_state: Option<String>,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionAction {
    Created,
    Activated,
    Deprecated,
    Updated,
}

impl VersionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionAction::Created => "created",
            VersionAction::Activated => "activated",
            VersionAction::Deprecated => "deprecated",
            VersionAction::Updated => "updated",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "activated" => VersionAction::Activated,
            "deprecated" => VersionAction::Deprecated,
            "updated" => VersionAction::Updated,
            _ => VersionAction::Created,
        }
    }
}

/// Rolling per-day counters for a version (§3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct VersionMetrics {
    pub total: i64,
    pub success: i64,
    pub failed: i64,
    pub avg_response_ms: f64,
    pub escalation_count: i64,
    pub satisfaction_sum: f64,
    pub satisfaction_count: i64,
}

impl VersionMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.success as f64 / self.total as f64
        }
    }

    pub fn escalation_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.escalation_count as f64 / self.total as f64
        }
    }

    pub fn avg_satisfaction(&self) -> Option<f64> {
        if self.satisfaction_count == 0 {
            None
        } else {
            Some(self.satisfaction_sum / self.satisfaction_count as f64)
        }
    }
}

/// A single observed outcome recorded via [`crate::store::ConfigStore::record_metric`].
#[derive(Debug, Clone, Copy)]
pub struct MetricEvent {
    pub success: bool,
    pub response_ms: f64,
    pub escalated: bool,
    pub satisfaction: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_derive_rates_without_storing_them_twice() {
        let metrics = VersionMetrics {
            total: 10,
            success: 8,
            failed: 2,
            avg_response_ms: 120.0,
            escalation_count: 1,
            satisfaction_sum: 36.0,
            satisfaction_count: 9,
        };
        assert_eq!(metrics.success_rate(), 0.8);
        assert_eq!(metrics.escalation_rate(), 0.1);
        assert_eq!(metrics.avg_satisfaction(), Some(4.0));
    }

    #[test]
    fn metrics_handle_zero_total() {
        let metrics = VersionMetrics::default();
        assert_eq!(metrics.success_rate(), 0.0);
        assert_eq!(metrics.avg_satisfaction(), None);
    }
}
