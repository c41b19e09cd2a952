//! Memory Store (C3): session persistence, user memory, pattern detection.
//!
//! Session state and memory entries are stored as JSON blobs in SQLite
//! tables, the same `serialize_metadata`/row-per-entity idiom the teacher
//! uses in its `SqliteMemoryStore`.

use crate::error::{MemoryError, Result};
use crate::memory::session::SessionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

/// A long-term, tag-queryable fact about a user (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMemory {
    pub memory_id: Uuid,
    pub user_id: String,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Advisory signals computed over a user's recent memories (§4.3).
#[derive(Debug, Clone, Serialize, Default)]
pub struct PatternReport {
    pub recurring_issues: Vec<String>,
    pub frustration_indicators: Vec<String>,
    pub common_requests: Vec<String>,
    pub fraud_signals: Vec<String>,
}

const PATTERN_WINDOW: usize = 50;
const RECURRING_THRESHOLD: usize = 2;

pub struct MemoryStore {
    pool: SqlitePool,
}

impl MemoryStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url).await?;
        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&self) -> Result<()> {
        info!("initializing memory store schema");
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                state_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_memory (
                memory_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                content TEXT NOT NULL,
                tags TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_user_memory_user ON user_memory(user_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<SessionState>> {
        let row = sqlx::query("SELECT state_json FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let json: String = row.try_get("state_json")?;
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    pub async fn put_session(&self, state: &SessionState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, state_json, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET state_json = excluded.state_json, updated_at = excluded.updated_at
            "#,
        )
        .bind(&state.session_id)
        .bind(&json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        debug!(session_id = %state.session_id, "session persisted");
        Ok(())
    }

    /// Explicit deletion, reserved for demos (§4.3 — the store is
    /// otherwise append-only).
    pub async fn clear_session(&self, session_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn add_user_memory(&self, user_id: &str, content: &str, tags: &[String]) -> Result<Uuid> {
        let memory_id = Uuid::new_v4();
        let tags_json = serde_json::to_string(tags)?;
        sqlx::query(
            "INSERT INTO user_memory (memory_id, user_id, content, tags, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(memory_id.to_string())
        .bind(user_id)
        .bind(content)
        .bind(&tags_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(memory_id)
    }

    /// Free-text or tag search, most recent first.
    pub async fn search_user_memory(&self, user_id: &str, query_or_tag: Option<&str>, limit: usize) -> Result<Vec<UserMemory>> {
        let rows = sqlx::query(
            "SELECT memory_id, user_id, content, tags, created_at FROM user_memory \
             WHERE user_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(PATTERN_WINDOW as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut memories = Vec::new();
        for row in rows {
            let memory = Self::row_to_memory(row)?;
            let matches = match query_or_tag {
                None => true,
                Some(needle) => {
                    memory.content.to_lowercase().contains(&needle.to_lowercase())
                        || memory.tags.iter().any(|t| t.eq_ignore_ascii_case(needle))
                }
            };
            if matches {
                memories.push(memory);
            }
            if memories.len() >= limit {
                break;
            }
        }
        Ok(memories)
    }

    pub async fn summarize_session(&self, session_id: &str) -> Result<String> {
        let session = self
            .get_session(session_id)
            .await?
            .ok_or_else(|| MemoryError::SessionNotFound(session_id.to_string()))?;

        let topic = session.current_topic.clone().unwrap_or_else(|| "assunto geral".to_string());
        Ok(format!(
            "Sessão {}: {} interações sobre {}. Frustração: {}. Encaminhado a humano: {}.",
            session.session_id,
            session.interaction_count,
            topic,
            session.frustration_level.value(),
            session.awaiting_human,
        ))
    }

    /// Pure, advisory pattern detection over the last [`PATTERN_WINDOW`]
    /// memories (§4.3). Tag-frequency thresholds: "recurring" iff a tag's
    /// count exceeds [`RECURRING_THRESHOLD`].
    pub async fn detect_patterns(&self, user_id: &str) -> Result<PatternReport> {
        let memories = self.search_user_memory(user_id, None, PATTERN_WINDOW).await?;
        Ok(compute_patterns(&memories))
    }

    fn row_to_memory(row: sqlx::sqlite::SqliteRow) -> Result<UserMemory> {
        let tags_json: String = row.try_get("tags")?;
        let created_at: String = row.try_get("created_at")?;
        Ok(UserMemory {
            memory_id: row.try_get::<String, _>("memory_id")?.parse().unwrap_or_else(|_| Uuid::new_v4()),
            user_id: row.try_get("user_id")?,
            content: row.try_get("content")?,
            tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
        })
    }
}

/// Separated for unit testing without a database: pure tag-frequency /
/// keyword-cohort computation (§4.3).
pub fn compute_patterns(memories: &[UserMemory]) -> PatternReport {
    use std::collections::HashMap;

    let mut tag_counts: HashMap<String, usize> = HashMap::new();
    for memory in memories {
        for tag in &memory.tags {
            *tag_counts.entry(tag.clone()).or_insert(0) += 1;
        }
    }

    let recurring_issues: Vec<String> = tag_counts
        .iter()
        .filter(|(tag, count)| **count > RECURRING_THRESHOLD && tag.as_str() != "feedback")
        .map(|(tag, _)| tag.clone())
        .collect();

    let frustration_indicators: Vec<String> = memories
        .iter()
        .filter(|m| m.tags.iter().any(|t| t == "frustration"))
        .map(|m| m.content.clone())
        .collect();

    let common_requests: Vec<String> = tag_counts
        .iter()
        .filter(|(tag, count)| **count > 1 && tag.as_str() == "request")
        .map(|(tag, _)| tag.clone())
        .collect();

    let fraud_signals: Vec<String> = memories
        .iter()
        .filter(|m| m.tags.iter().any(|t| t == "fraud"))
        .map(|m| m.content.clone())
        .collect();

    PatternReport {
        recurring_issues,
        frustration_indicators,
        common_requests,
        fraud_signals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::session::{MessageRole, SessionState};

    async fn store() -> MemoryStore {
        MemoryStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = store().await;
        let mut session = SessionState::new("sess-1", "cust-1");
        session.record_message(MessageRole::Customer, "Oi".into(), "oi".into());

        store.put_session(&session).await.unwrap();
        let loaded = store.get_session("sess-1").await.unwrap().unwrap();
        assert_eq!(loaded.interaction_count, 1);
    }

    #[tokio::test]
    async fn missing_session_is_none() {
        let store = store().await;
        assert!(store.get_session("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_session_removes_it() {
        let store = store().await;
        let session = SessionState::new("sess-1", "cust-1");
        store.put_session(&session).await.unwrap();
        store.clear_session("sess-1").await.unwrap();
        assert!(store.get_session("sess-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_by_tag_filters_correctly() {
        let store = store().await;
        store.add_user_memory("u1", "cartão bloqueado de novo", &["recurring".into()]).await.unwrap();
        store.add_user_memory("u1", "elogio ao app", &["feedback".into()]).await.unwrap();

        let results = store.search_user_memory("u1", Some("feedback"), 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].content.contains("elogio"));
    }

    #[test]
    fn recurring_requires_more_than_threshold_hits() {
        let memories: Vec<UserMemory> = (0..3)
            .map(|i| UserMemory {
                memory_id: Uuid::new_v4(),
                user_id: "u1".into(),
                content: format!("cartão bloqueado #{i}"),
                tags: vec!["card_block".into()],
                created_at: Utc::now(),
            })
            .collect();

        let report = compute_patterns(&memories);
        assert!(report.recurring_issues.contains(&"card_block".to_string()));
    }

    #[test]
    fn two_hits_are_not_yet_recurring() {
        let memories: Vec<UserMemory> = (0..2)
            .map(|i| UserMemory {
                memory_id: Uuid::new_v4(),
                user_id: "u1".into(),
                content: format!("cartão bloqueado #{i}"),
                tags: vec!["card_block".into()],
                created_at: Utc::now(),
            })
            .collect();

        let report = compute_patterns(&memories);
        assert!(!report.recurring_issues.contains(&"card_block".to_string()));
    }

    #[test]
    fn fraud_signals_are_surfaced() {
        let memories = vec![UserMemory {
            memory_id: Uuid::new_v4(),
            user_id: "u1".into(),
            content: "pediram pagamento antecipado".into(),
            tags: vec!["fraud".into()],
            created_at: Utc::now(),
        }];
        let report = compute_patterns(&memories);
        assert_eq!(report.fraud_signals.len(), 1);
    }
}
