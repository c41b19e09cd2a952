//! Agent Factory (C4): resolves an effective config version for a request
//! and hands back a ready-to-run agent handle, cached until the Config
//! Store's generation counter moves (§4.4, §9 design note 1).

use crate::abtest::AbTestManager;
use crate::config::ConfigDocument;
use crate::error::Result;
use crate::llm::LlmClient;
use crate::store::ConfigStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// The three agent shapes a config document can describe (§9 design note
/// 1: a tagged sum type in place of one duck-typed `Agent` struct).
/// Distinguished by `AgentIdentity::role`.
#[derive(Debug, Clone)]
pub enum AgentKind {
    /// A single specialist bound to one routing destination (Cards,
    /// Credit, Investments, ...).
    Specialist { specialist_key: String },
    /// A small group of specialists sharing a [`crate::memory::SharedWorkspace`].
    Team { member_keys: Vec<String> },
    /// An agent whose job is to drive the Typification Workflow (C8)
    /// rather than converse directly.
    Workflow { workflow_name: String },
}

impl AgentKind {
    fn from_role(role: &str) -> Self {
        match role {
            r if r.eq_ignore_ascii_case("team") => AgentKind::Team { member_keys: Vec::new() },
            r if r.eq_ignore_ascii_case("workflow") => AgentKind::Workflow {
                workflow_name: "typification".to_string(),
            },
            other => AgentKind::Specialist {
                specialist_key: other.to_string(),
            },
        }
    }
}

/// An immutable, ready-to-run agent (config resolved, LLM handle attached).
pub struct AgentHandle {
    pub agent_id: String,
    pub version: i64,
    pub config: ConfigDocument,
    pub kind: AgentKind,
    pub llm: Arc<dyn LlmClient>,
}

struct CachedHandle {
    handle: Arc<AgentHandle>,
    generation: u64,
}

pub struct AgentFactory {
    store: Arc<ConfigStore>,
    llm: Arc<dyn LlmClient>,
    ab_tests: Arc<AbTestManager>,
    cache: RwLock<HashMap<(String, i64), CachedHandle>>,
}

impl AgentFactory {
    pub fn new(store: Arc<ConfigStore>, llm: Arc<dyn LlmClient>, ab_tests: Arc<AbTestManager>) -> Self {
        Self {
            store,
            llm,
            ab_tests,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a version, build (or reuse) a handle for it. Version
    /// resolution order (§4.4): explicit `version` override, then an A/B
    /// test assignment for `user_id` if one is running for this agent,
    /// then the Config Store's active version.
    pub async fn create_agent(
        &self,
        agent_id: &str,
        version: Option<i64>,
        user_id: Option<&str>,
    ) -> Result<Arc<AgentHandle>> {
        let resolved_version = self.resolve_version(agent_id, version, user_id).await?;
        let generation = self.store.generation();

        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(&(agent_id.to_string(), resolved_version)) {
                if cached.generation == generation {
                    return Ok(cached.handle.clone());
                }
            }
        }

        let record = self.store.get_version(agent_id, resolved_version).await?;
        let kind = AgentKind::from_role(&record.config.agent.role);
        let handle = Arc::new(AgentHandle {
            agent_id: agent_id.to_string(),
            version: resolved_version,
            config: record.config,
            kind,
            llm: self.llm.clone(),
        });

        debug!(agent_id, version = resolved_version, "agent handle built");

        let mut cache = self.cache.write().await;
        cache.insert(
            (agent_id.to_string(), resolved_version),
            CachedHandle {
                handle: handle.clone(),
                generation,
            },
        );
        Ok(handle)
    }

    async fn resolve_version(&self, agent_id: &str, version: Option<i64>, user_id: Option<&str>) -> Result<i64> {
        if let Some(v) = version {
            return Ok(v);
        }

        if let Some(user_id) = user_id {
            let test_id = format!("{agent_id}-default");
            if let Ok(assigned) = self.ab_tests.assign(&test_id, user_id).await {
                return Ok(assigned);
            }
        }

        let active = self.store.get_active(agent_id).await?;
        Ok(active.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentIdentity, ConfigDocument, EscalationTriggers, KnowledgeFilter, MemoryPolicy, ModelParams, StorageBinding};
    use crate::llm::{EmbeddingResponse, GenerationResponse, Message};
    use async_trait::async_trait;

    struct StubLlm;

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn generate(&self, _messages: &[Message]) -> Result<GenerationResponse> {
            unimplemented!()
        }
        async fn embed(&self, _text: &str) -> Result<EmbeddingResponse> {
            unimplemented!()
        }
    }

    fn doc(agent_id: &str, version: i64, role: &str) -> ConfigDocument {
        ConfigDocument {
            agent: AgentIdentity {
                agent_id: agent_id.to_string(),
                version,
                name: "Especialista de Cartões".into(),
                role: role.to_string(),
                description: "atende duvidas sobre cartoes".into(),
            },
            model: ModelParams::default(),
            instructions: "Ajude o cliente com cartoes.".into(),
            tools: vec![],
            knowledge_filter: KnowledgeFilter::default(),
            storage: StorageBinding {
                kind: "sqlite".into(),
                table_name: "cards_memory".into(),
                auto_upgrade_schema: true,
            },
            memory: MemoryPolicy::default(),
            escalation_triggers: EscalationTriggers::default(),
        }
    }

    async fn factory() -> (AgentFactory, Arc<ConfigStore>) {
        let store = Arc::new(ConfigStore::connect("sqlite::memory:").await.unwrap());
        store
            .create_version("cards", 1, doc("cards", 1, "cards"), "tester", "")
            .await
            .unwrap();
        store.activate_version("cards", 1, "tester", "launch").await.unwrap();
        let ab_tests = Arc::new(AbTestManager::new());
        let factory = AgentFactory::new(store.clone(), Arc::new(StubLlm), ab_tests);
        (factory, store)
    }

    #[tokio::test]
    async fn resolves_active_version_by_default() {
        let (factory, _store) = factory().await;
        let handle = factory.create_agent("cards", None, None).await.unwrap();
        assert_eq!(handle.version, 1);
        assert!(matches!(handle.kind, AgentKind::Specialist { .. }));
    }

    #[tokio::test]
    async fn explicit_version_overrides_active() {
        let (factory, store) = factory().await;
        store
            .create_version("cards", 2, doc("cards", 2, "cards"), "tester", "")
            .await
            .unwrap();
        let handle = factory.create_agent("cards", Some(2), None).await.unwrap();
        assert_eq!(handle.version, 2);
    }

    #[tokio::test]
    async fn cache_is_invalidated_after_reactivation() {
        let (factory, store) = factory().await;
        store
            .create_version("cards", 2, doc("cards", 2, "cards"), "tester", "")
            .await
            .unwrap();

        let first = factory.create_agent("cards", None, None).await.unwrap();
        assert_eq!(first.version, 1);

        store.activate_version("cards", 2, "tester", "promote").await.unwrap();
        let second = factory.create_agent("cards", None, None).await.unwrap();
        assert_eq!(second.version, 2);
    }
}
