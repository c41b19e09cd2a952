//! Config Store (C1): versioned agent/team/workflow configuration
//!
//! Mirrors the teacher's `SqliteMemoryStore` / `LlmCache` idiom: a
//! `sqlx::SqlitePool`, `CREATE TABLE IF NOT EXISTS` on `initialize()`, and
//! plain parameterized queries. Activation is wrapped in one transaction so
//! readers never observe more than one active version (§3 invariant 1).

use crate::config::ConfigDocument;
use crate::error::{ConfigError, Result};
use crate::store::models::{AgentConfigRecord, MetricEvent, VersionAction, VersionHistoryEntry, VersionMetrics};
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// A cached active-version lookup, invalidated by `generation`.
#[derive(Debug, Clone)]
struct CachedActive {
    record: AgentConfigRecord,
    generation: u64,
}

/// Versioned agent configuration storage with a generation-stamped
/// active-version cache (§4.1).
pub struct ConfigStore {
    pool: SqlitePool,
    active_cache: Arc<RwLock<HashMap<String, CachedActive>>>,
    generation: Arc<AtomicU64>,
}

impl ConfigStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url).await?;
        let store = Self {
            pool,
            active_cache: Arc::new(RwLock::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&self) -> Result<()> {
        info!("initializing config store schema");
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS agent_configs (
                agent_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                config_blob TEXT NOT NULL,
                created_at TEXT NOT NULL,
                created_by TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 0,
                is_deprecated INTEGER NOT NULL DEFAULT 0,
                description TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (agent_id, version)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS version_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                action TEXT NOT NULL,
                prev_state TEXT,
                new_state TEXT,
                changed_by TEXT NOT NULL,
                changed_at TEXT NOT NULL,
                reason TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS version_metrics (
                agent_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                date TEXT NOT NULL,
                total INTEGER NOT NULL DEFAULT 0,
                success INTEGER NOT NULL DEFAULT 0,
                failed INTEGER NOT NULL DEFAULT 0,
                avg_response_ms REAL NOT NULL DEFAULT 0,
                escalation_count INTEGER NOT NULL DEFAULT 0,
                satisfaction_sum REAL NOT NULL DEFAULT 0,
                satisfaction_count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (agent_id, version, date)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Monotonic generation counter; bumped on every write so the Agent
    /// Factory knows to invalidate its own handle cache (§4.1, §9 hot reload).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Create a new version. Fails with `VersionExists` on a duplicate
    /// `(agent_id, version)` pair.
    pub async fn create_version(
        &self,
        agent_id: &str,
        version: i64,
        config: ConfigDocument,
        created_by: &str,
        description: &str,
    ) -> Result<AgentConfigRecord> {
        config.validate()?;

        let existing: Option<(i64,)> = sqlx::query_as(
            "SELECT version FROM agent_configs WHERE agent_id = ? AND version = ?",
        )
        .bind(agent_id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;

        if existing.is_some() {
            return Err(ConfigError::VersionExists {
                agent_id: agent_id.to_string(),
                version,
            }
            .into());
        }

        let created_at = Utc::now();
        let blob = serde_json::to_string(&config)?;

        sqlx::query(
            r#"
            INSERT INTO agent_configs
                (agent_id, version, config_blob, created_at, created_by, is_active, is_deprecated, description)
            VALUES (?, ?, ?, ?, ?, 0, 0, ?)
            "#,
        )
        .bind(agent_id)
        .bind(version)
        .bind(&blob)
        .bind(created_at.to_rfc3339())
        .bind(created_by)
        .bind(description)
        .execute(&self.pool)
        .await?;

        self.append_history(agent_id, version, VersionAction::Created, None, None, created_by, None)
            .await?;
        self.bump_generation();

        info!(agent_id, version, "created config version");

        Ok(AgentConfigRecord {
            agent_id: agent_id.to_string(),
            version,
            config,
            created_at,
            created_by: created_by.to_string(),
            is_active: false,
            is_deprecated: false,
            description: description.to_string(),
        })
    }

    /// Activate `version` of `agent_id`. Atomic: within one transaction the
    /// target row becomes active and every sibling version becomes
    /// inactive, so readers never observe two active versions (§3 invariant 1,
    /// §4.1, §5 "Database transactions are used for ... version activation").
    pub async fn activate_version(
        &self,
        agent_id: &str,
        version: i64,
        actor: &str,
        reason: &str,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT version FROM agent_configs WHERE agent_id = ? AND version = ?",
        )
        .bind(agent_id)
        .bind(version)
        .fetch_optional(&mut *tx)
        .await?;

        if row.is_none() {
            return Err(ConfigError::VersionNotFound {
                agent_id: agent_id.to_string(),
                version,
            }
            .into());
        }

        let previously_active: Option<(i64,)> = sqlx::query_as(
            "SELECT version FROM agent_configs WHERE agent_id = ? AND is_active = 1",
        )
        .bind(agent_id)
        .fetch_optional(&mut *tx)
        .await?;

        // Idempotent: activating the already-active version is a no-op
        // beyond the history append (§8 round-trip property).
        if previously_active.map(|(v,)| v) != Some(version) {
            sqlx::query("UPDATE agent_configs SET is_active = 0 WHERE agent_id = ?")
                .bind(agent_id)
                .execute(&mut *tx)
                .await?;

            sqlx::query("UPDATE agent_configs SET is_active = 1 WHERE agent_id = ? AND version = ?")
                .bind(agent_id)
                .bind(version)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        self.append_history(
            agent_id,
            version,
            VersionAction::Activated,
            previously_active.map(|(v,)| v.to_string()),
            Some(version.to_string()),
            actor,
            Some(reason),
        )
        .await?;

        self.active_cache.write().await.remove(agent_id);
        self.bump_generation();

        info!(agent_id, version, actor, "activated config version");
        Ok(())
    }

    pub async fn deprecate_version(&self, agent_id: &str, version: i64, actor: &str, reason: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE agent_configs SET is_deprecated = 1 WHERE agent_id = ? AND version = ?",
        )
        .bind(agent_id)
        .bind(version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ConfigError::VersionNotFound {
                agent_id: agent_id.to_string(),
                version,
            }
            .into());
        }

        self.append_history(agent_id, version, VersionAction::Deprecated, None, None, actor, Some(reason))
            .await?;
        self.bump_generation();
        Ok(())
    }

    /// Resolve the active version for `agent_id`, memoized per the
    /// current generation.
    pub async fn get_active(&self, agent_id: &str) -> Result<AgentConfigRecord> {
        let generation = self.generation();

        if let Some(cached) = self.active_cache.read().await.get(agent_id) {
            if cached.generation == generation {
                debug!(agent_id, "active config cache hit");
                return Ok(cached.record.clone());
            }
        }

        let row = sqlx::query(
            "SELECT agent_id, version, config_blob, created_at, created_by, is_active, is_deprecated, description \
             FROM agent_configs WHERE agent_id = ? AND is_active = 1",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ConfigError::NoActiveVersion {
            agent_id: agent_id.to_string(),
        })?;

        let record = Self::row_to_record(row)?;

        self.active_cache.write().await.insert(
            agent_id.to_string(),
            CachedActive {
                record: record.clone(),
                generation,
            },
        );

        Ok(record)
    }

    pub async fn get_version(&self, agent_id: &str, version: i64) -> Result<AgentConfigRecord> {
        let row = sqlx::query(
            "SELECT agent_id, version, config_blob, created_at, created_by, is_active, is_deprecated, description \
             FROM agent_configs WHERE agent_id = ? AND version = ?",
        )
        .bind(agent_id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ConfigError::VersionNotFound {
            agent_id: agent_id.to_string(),
            version,
        })?;

        Self::row_to_record(row)
    }

    pub async fn list_versions(&self, agent_id: &str) -> Result<Vec<AgentConfigRecord>> {
        let rows = sqlx::query(
            "SELECT agent_id, version, config_blob, created_at, created_by, is_active, is_deprecated, description \
             FROM agent_configs WHERE agent_id = ? ORDER BY version ASC",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    pub async fn record_metric(&self, agent_id: &str, version: i64, event: MetricEvent) -> Result<()> {
        let date = Utc::now().format("%Y-%m-%d").to_string();

        sqlx::query(
            r#"
            INSERT INTO version_metrics (agent_id, version, date, total, success, failed, avg_response_ms, escalation_count, satisfaction_sum, satisfaction_count)
            VALUES (?, ?, ?, 1, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(agent_id, version, date) DO UPDATE SET
                total = total + 1,
                success = success + excluded.success,
                failed = failed + excluded.failed,
                avg_response_ms = (avg_response_ms * total + excluded.avg_response_ms) / (total + 1),
                escalation_count = escalation_count + excluded.escalation_count,
                satisfaction_sum = satisfaction_sum + excluded.satisfaction_sum,
                satisfaction_count = satisfaction_count + excluded.satisfaction_count
            "#,
        )
        .bind(agent_id)
        .bind(version)
        .bind(&date)
        .bind(if event.success { 1 } else { 0 })
        .bind(if event.success { 0 } else { 1 })
        .bind(event.response_ms)
        .bind(if event.escalated { 1 } else { 0 })
        .bind(event.satisfaction.unwrap_or(0.0))
        .bind(if event.satisfaction.is_some() { 1 } else { 0 })
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn metrics_for(&self, agent_id: &str, version: i64) -> Result<VersionMetrics> {
        let row = sqlx::query(
            "SELECT \
                COALESCE(SUM(total), 0) as total, \
                COALESCE(SUM(success), 0) as success, \
                COALESCE(SUM(failed), 0) as failed, \
                COALESCE(AVG(avg_response_ms), 0) as avg_response_ms, \
                COALESCE(SUM(escalation_count), 0) as escalation_count, \
                COALESCE(SUM(satisfaction_sum), 0) as satisfaction_sum, \
                COALESCE(SUM(satisfaction_count), 0) as satisfaction_count \
             FROM version_metrics WHERE agent_id = ? AND version = ?",
        )
        .bind(agent_id)
        .bind(version)
        .fetch_one(&self.pool)
        .await?;

        Ok(VersionMetrics {
            total: row.try_get("total")?,
            success: row.try_get("success")?,
            failed: row.try_get("failed")?,
            avg_response_ms: row.try_get("avg_response_ms")?,
            escalation_count: row.try_get("escalation_count")?,
            satisfaction_sum: row.try_get("satisfaction_sum")?,
            satisfaction_count: row.try_get("satisfaction_count")?,
        })
    }

    pub async fn history(&self, agent_id: &str) -> Result<Vec<VersionHistoryEntry>> {
        let rows = sqlx::query(
            "SELECT agent_id, version, action, prev_state, new_state, changed_by, changed_at, reason \
             FROM version_history WHERE agent_id = ? ORDER BY id ASC",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(VersionHistoryEntry {
                    agent_id: row.try_get("agent_id")?,
                    version: row.try_get("version")?,
                    action: VersionAction::from_str(&row.try_get::<String, _>("action")?),
                    prev_state: row.try_get("prev_state")?,
                    new_state: row.try_get("new_state")?,
                    changed_by: row.try_get("changed_by")?,
                    changed_at: row.try_get("changed_at")?,
                    reason: row.try_get("reason")?,
                })
            })
            .collect()
    }

    async fn append_history(
        &self,
        agent_id: &str,
        version: i64,
        action: VersionAction,
        prev_state: Option<String>,
        new_state: Option<String>,
        changed_by: &str,
        reason: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO version_history (agent_id, version, action, prev_state, new_state, changed_by, changed_at, reason)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(agent_id)
        .bind(version)
        .bind(action.as_str())
        .bind(prev_state)
        .bind(new_state)
        .bind(changed_by)
        .bind(Utc::now().to_rfc3339())
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_record(row: sqlx::sqlite::SqliteRow) -> Result<AgentConfigRecord> {
        let config_blob: String = row.try_get("config_blob")?;
        let config: ConfigDocument = serde_json::from_str(&config_blob)?;
        let created_at: String = row.try_get("created_at")?;

        Ok(AgentConfigRecord {
            agent_id: row.try_get("agent_id")?,
            version: row.try_get("version")?,
            config,
            created_at: created_at
                .parse()
                .unwrap_or_else(|_| Utc::now()),
            created_by: row.try_get("created_by")?,
            is_active: row.try_get::<i64, _>("is_active")? != 0,
            is_deprecated: row.try_get::<i64, _>("is_deprecated")? != 0,
            description: row.try_get("description")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentIdentity, EscalationTriggers, KnowledgeFilter, MemoryPolicy, ModelParams, StorageBinding};

    fn doc(agent_id: &str, version: i64) -> ConfigDocument {
        ConfigDocument {
            agent: AgentIdentity {
                agent_id: agent_id.into(),
                version,
                name: "PagBank Specialist".into(),
                role: "specialist".into(),
                description: String::new(),
            },
            model: ModelParams {
                provider: "anthropic".into(),
                id: "claude".into(),
                temperature: 0.3,
                max_tokens: 512,
            },
            instructions: "Responda em português.".into(),
            tools: vec![],
            knowledge_filter: KnowledgeFilter::default(),
            storage: StorageBinding {
                kind: "sqlite".into(),
                table_name: "sessions".into(),
                auto_upgrade_schema: true,
            },
            memory: MemoryPolicy {
                add_history_to_messages: true,
                num_history_runs: 5,
            },
            escalation_triggers: EscalationTriggers::default(),
        }
    }

    async fn store() -> ConfigStore {
        ConfigStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn duplicate_version_is_rejected() {
        let store = store().await;
        store.create_version("pagbank-specialist", 1, doc("pagbank-specialist", 1), "ana", "").await.unwrap();
        let err = store
            .create_version("pagbank-specialist", 1, doc("pagbank-specialist", 1), "ana", "")
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn activation_is_exclusive_and_idempotent() {
        let store = store().await;
        store.create_version("pagbank-specialist", 27, doc("pagbank-specialist", 27), "ana", "").await.unwrap();
        store.create_version("pagbank-specialist", 28, doc("pagbank-specialist", 28), "ana", "").await.unwrap();

        store.activate_version("pagbank-specialist", 28, "ana", "launch").await.unwrap();
        let active = store.get_active("pagbank-specialist").await.unwrap();
        assert_eq!(active.version, 28);

        // Activating the same version again is a no-op (§8 round-trip property).
        store.activate_version("pagbank-specialist", 28, "ana", "replay").await.unwrap();
        let active = store.get_active("pagbank-specialist").await.unwrap();
        assert_eq!(active.version, 28);

        store.activate_version("pagbank-specialist", 27, "ana", "rollback").await.unwrap();
        let active = store.get_active("pagbank-specialist").await.unwrap();
        assert_eq!(active.version, 27);

        let versions = store.list_versions("pagbank-specialist").await.unwrap();
        let active_count = versions.iter().filter(|v| v.is_active).count();
        assert_eq!(active_count, 1);
    }

    #[tokio::test]
    async fn metrics_accumulate_across_events() {
        let store = store().await;
        store.create_version("cards", 1, doc("cards", 1), "ana", "").await.unwrap();

        store
            .record_metric(
                "cards",
                1,
                MetricEvent {
                    success: true,
                    response_ms: 100.0,
                    escalated: false,
                    satisfaction: Some(5.0),
                },
            )
            .await
            .unwrap();
        store
            .record_metric(
                "cards",
                1,
                MetricEvent {
                    success: false,
                    response_ms: 200.0,
                    escalated: true,
                    satisfaction: None,
                },
            )
            .await
            .unwrap();

        let metrics = store.metrics_for("cards", 1).await.unwrap();
        assert_eq!(metrics.total, 2);
        assert_eq!(metrics.success, 1);
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.escalation_rate(), 0.5);
    }

    #[tokio::test]
    async fn no_active_version_is_reported() {
        let store = store().await;
        store.create_version("cards", 1, doc("cards", 1), "ana", "").await.unwrap();
        let err = store.get_active("cards").await;
        assert!(err.is_err());
    }
}
