//! End-to-end scenarios spanning the Config Store, Agent Factory, Router
//! and A/B Test Manager together — the properties a unit test scoped to
//! one module can't exercise on its own (§8 concrete scenarios).

use async_trait::async_trait;
use pagbank_routing_runtime::abtest::{AbTestManager, Arm};
use pagbank_routing_runtime::config::{
    AgentIdentity, ConfigDocument, EscalationTriggers, KnowledgeFilter, MemoryPolicy, ModelParams, StorageBinding,
};
use pagbank_routing_runtime::factory::AgentFactory;
use pagbank_routing_runtime::knowledge::KnowledgeGateway;
use pagbank_routing_runtime::llm::{EmbeddingResponse, GenerationResponse, LlmClient, Message};
use pagbank_routing_runtime::memory::{MemoryStore, SessionState};
use pagbank_routing_runtime::router::Router;
use pagbank_routing_runtime::store::ConfigStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

struct StubLlm;

#[async_trait]
impl LlmClient for StubLlm {
    async fn generate(&self, messages: &[Message]) -> pagbank_routing_runtime::Result<GenerationResponse> {
        let last_user = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        Ok(GenerationResponse {
            text: format!("Resposta de teste sobre: {last_user}"),
            tokens_used: Some(12),
            model: "stub".to_string(),
            finish_reason: Some("stop".to_string()),
        })
    }

    async fn embed(&self, _text: &str) -> pagbank_routing_runtime::Result<EmbeddingResponse> {
        Ok(EmbeddingResponse { embedding: vec![0.1, 0.2, 0.3], model: "stub".to_string() })
    }
}

fn doc(agent_id: &str, version: i64, role: &str) -> ConfigDocument {
    ConfigDocument {
        agent: AgentIdentity {
            agent_id: agent_id.to_string(),
            version,
            name: format!("Agente {agent_id} v{version}"),
            role: role.to_string(),
            description: String::new(),
        },
        model: ModelParams::default(),
        instructions: "Responda ao cliente em português.".to_string(),
        tools: vec![],
        knowledge_filter: KnowledgeFilter::default(),
        storage: StorageBinding { kind: "sqlite".into(), table_name: "scenario_memory".into(), auto_upgrade_schema: true },
        memory: MemoryPolicy::default(),
        escalation_triggers: EscalationTriggers::default(),
    }
}

struct Harness {
    router: Router,
    store: Arc<ConfigStore>,
    ab_tests: Arc<AbTestManager>,
}

async fn harness() -> Harness {
    let store = Arc::new(ConfigStore::connect("sqlite::memory:").await.unwrap());
    store.create_version("pagbank-specialist", 27, doc("pagbank-specialist", 27, "cards"), "ana", "v27").await.unwrap();
    store.activate_version("pagbank-specialist", 27, "ana", "launch").await.unwrap();

    let llm: Arc<dyn LlmClient> = Arc::new(StubLlm);
    let ab_tests = Arc::new(AbTestManager::new());
    let factory = Arc::new(AgentFactory::new(store.clone(), llm.clone(), ab_tests.clone()));
    let knowledge = Arc::new(KnowledgeGateway::new(vec![], llm.clone()));
    let memory = Arc::new(MemoryStore::connect("sqlite::memory:").await.unwrap());
    let router = Router::new(factory, knowledge, memory, ab_tests.clone(), Duration::from_secs(5), Duration::from_secs(10));

    Harness { router, store, ab_tests }
}

fn new_session(customer_id: &str) -> Arc<Mutex<SessionState>> {
    Arc::new(Mutex::new(SessionState::new(uuid::Uuid::new_v4().to_string(), customer_id)))
}

/// §8 invariant 1 + round-trip: activating the same version twice leaves
/// `is_active` state unchanged, and at most one version stays active.
#[tokio::test]
async fn activating_the_same_version_twice_is_a_no_op() {
    let h = harness().await;
    h.store.activate_version("pagbank-specialist", 27, "ana", "re-activate").await.unwrap();

    let versions = h.store.list_versions("pagbank-specialist").await.unwrap();
    let active: Vec<_> = versions.iter().filter(|v| v.is_active).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].version, 27);
}

/// §8 scenario 5: creating and activating version 28 routes new sessions
/// to 28; rolling back to 27 routes the next new session to 27.
#[tokio::test]
async fn version_activation_and_rollback_reach_new_sessions_immediately() {
    let h = harness().await;
    h.store.create_version("pagbank-specialist", 28, doc("pagbank-specialist", 28, "cards"), "ana", "v28").await.unwrap();
    h.store.activate_version("pagbank-specialist", 28, "ana", "promote").await.unwrap();

    let token = CancellationToken::new();
    let session_a = new_session("c1");
    let result = h
        .router
        .handle_turn(&session_a, "pagbank-specialist", Arc::new(StubLlm), "c1", "meu cartão está bloqueado", &token)
        .await
        .unwrap();
    assert_eq!(result.version_used, 28);

    h.store.activate_version("pagbank-specialist", 27, "ana", "rollback").await.unwrap();

    let session_b = new_session("c2");
    let result = h
        .router
        .handle_turn(&session_b, "pagbank-specialist", Arc::new(StubLlm), "c2", "meu cartão está bloqueado", &token)
        .await
        .unwrap();
    assert_eq!(result.version_used, 27);
}

/// §8 invariant 4 + scenario 2: a payment-advance-scam utterance routes
/// to Credit, raises a fraud alert, mints a FRAUDE protocol, and flags
/// the session for human handoff.
#[tokio::test]
async fn payment_advance_scam_ends_in_a_fraud_protocol_and_human_handoff() {
    let h = harness().await;
    let token = CancellationToken::new();
    let session = new_session("c1");

    let result = h
        .router
        .handle_turn(
            &session,
            "pagbank-specialist",
            Arc::new(StubLlm),
            "c1",
            "o rapaz me ligou dizendo que eu preciso pagar uma taxa antes de liberar o empréstimo",
            &token,
        )
        .await
        .unwrap();

    assert_eq!(result.specialist_key, "credit");
    assert!(result.fraud_alert);
    assert!(result.escalated);
    let protocol = result.protocol.expect("fraud turn must mint a protocol");
    assert!(protocol.starts_with("FRAUDE-"));

    let state = session.lock().await;
    assert!(state.awaiting_human);
}

/// §8 invariant 6: the same (user, test) pair always resolves to the same
/// arm until the experiment ends.
#[tokio::test]
async fn ab_assignment_is_sticky_per_user() {
    let h = harness().await;
    h.ab_tests
        .create_test("pagbank-specialist-default", "pagbank-specialist", vec![Arm { version: 27, weight: 50 }, Arm { version: 28, weight: 50 }], 10)
        .await
        .unwrap();
    h.ab_tests.start_test("pagbank-specialist-default").await.unwrap();

    let first = h.ab_tests.assign("pagbank-specialist-default", "c42").await.unwrap();
    for _ in 0..10 {
        let again = h.ab_tests.assign("pagbank-specialist-default", "c42").await.unwrap();
        assert_eq!(first, again);
    }
}

/// §8 invariant 7: identical session state and identical normalized
/// utterance select the same specialist every time.
#[tokio::test]
async fn routing_is_idempotent_for_identical_input() {
    let h = harness().await;
    let token = CancellationToken::new();

    let first_session = new_session("c1");
    let first = h
        .router
        .handle_turn(&first_session, "pagbank-specialist", Arc::new(StubLlm), "c1", "quero saber o limite do meu cartão", &token)
        .await
        .unwrap();

    let second_session = new_session("c2");
    let second = h
        .router
        .handle_turn(&second_session, "pagbank-specialist", Arc::new(StubLlm), "c2", "quero saber o limite do meu cartão", &token)
        .await
        .unwrap();

    assert_eq!(first.specialist_key, second.specialist_key);
}

/// §8 invariant 8: protocol ids minted in the same window are unique.
#[tokio::test]
async fn protocols_minted_in_quick_succession_are_unique() {
    let mut seen = std::collections::HashSet::new();
    for _ in 0..200 {
        let id = pagbank_routing_runtime::router::mint_technical_protocol();
        assert!(seen.insert(id), "protocol id collided");
    }
}
