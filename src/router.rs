//! Router (C6): the turn-handling state machine (§4.6, §5, §9 design
//! note 1 — a `RouterState` enum in place of an ad-hoc set of booleans).

use crate::abtest::AbTestManager;
use crate::config::EscalationTriggers;
use crate::error::{Result, RouterError};
use crate::factory::AgentFactory;
use crate::frustration;
use crate::knowledge::KnowledgeGateway;
use crate::llm::LlmClient;
use crate::memory::session::{MessageRole, SessionState};
use crate::memory::MemoryStore;
use crate::normalize::normalize;
use crate::protocol::{self, ProtocolKind};
use crate::specialists::{
    AlertLevel, CardsSpecialist, CreditSpecialist, DigitalAccountSpecialist, FeedbackCollectorSpecialist,
    HumanHandoffSpecialist, InsuranceSpecialist, InvestmentsSpecialist, Specialist, SpecialistContext,
    TechnicalEscalationSpecialist,
};
use crate::typification::{self, TypificationWorkflow};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// The Router's own state machine, independent of the customer-facing
/// `SessionState` (§5): `Idle → Handling → Clarifying|Dispatching →
/// Handling|Escalated|Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    Idle,
    Handling,
    Clarifying,
    Dispatching,
    Escalated,
    Closed,
}

/// First-match-wins keyword table, in insertion-order priority (used as
/// the tiebreaker when two specialists tie on keyword-hit count).
fn keyword_table() -> Vec<(&'static str, &'static [&'static str])> {
    vec![
        ("cards", &["cartão", "cartao", "fatura", "limite do cartão", "bloqueio de cartão"]),
        ("digital_account", &["pix", "conta digital", "extrato", "transferência", "saldo"]),
        ("investments", &["cdb", "cofrinho", "investir", "investimento", "rendimento", "renda fixa"]),
        ("credit", &["empréstimo", "emprestimo", "crédito", "credito", "antecipação", "antecipacao"]),
        ("insurance", &["seguro", "plano de saúde", "plano de saude", "seguro de vida"]),
        ("technical_escalation", &["erro no app", "bug", "não funciona", "nao funciona", "travando"]),
        ("feedback_collector", &["feedback", "sugestão", "sugestao", "elogio", "reclamação sobre atendimento"]),
    ]
}

const HUMAN_REQUEST_PHRASES: &[&str] = &["falar com atendente", "quero um humano", "falar com uma pessoa", "atendente humano"];
const MAX_CLARIFICATIONS_PER_TOPIC: u32 = 1;
const MAX_INTERACTIONS_BEFORE_ESCALATION: u32 = 3;

/// Count keyword hits per specialist; returns matches with count > 0,
/// already in priority order.
fn match_specialists(normalized_utterance: &str) -> Vec<(&'static str, usize)> {
    keyword_table()
        .into_iter()
        .filter_map(|(key, keywords)| {
            let hits = keywords.iter().filter(|kw| normalized_utterance.contains(*kw)).count();
            if hits > 0 {
                Some((key, hits))
            } else {
                None
            }
        })
        .collect()
}

/// Pick the best specialist: highest keyword-hit count, ties broken by
/// table insertion order (the order `match_specialists` already preserves
/// since it walks the table front-to-back).
fn best_match(matches: &[(&'static str, usize)]) -> Option<&'static str> {
    matches.iter().max_by_key(|(_, hits)| *hits).map(|(key, _)| *key)
}

pub fn requests_human(normalized_utterance: &str) -> bool {
    HUMAN_REQUEST_PHRASES.iter().any(|phrase| normalized_utterance.contains(phrase))
}

/// Outcome of one `handle_turn` call, returned to the Request API (§4.10).
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub reply: String,
    pub specialist_key: String,
    pub version_used: i64,
    pub protocol: Option<String>,
    pub escalated: bool,
    pub fraud_alert: bool,
    pub state: RouterState,
}

pub struct Router {
    factory: Arc<AgentFactory>,
    knowledge: Arc<KnowledgeGateway>,
    memory: Arc<MemoryStore>,
    ab_tests: Arc<AbTestManager>,
    specialists: HashMap<&'static str, Arc<dyn Specialist>>,
    typification: TypificationWorkflow,
    soft_timeout: Duration,
    hard_timeout: Duration,
}

impl Router {
    pub fn new(
        factory: Arc<AgentFactory>,
        knowledge: Arc<KnowledgeGateway>,
        memory: Arc<MemoryStore>,
        ab_tests: Arc<AbTestManager>,
        soft_timeout: Duration,
        hard_timeout: Duration,
    ) -> Self {
        let mut specialists: HashMap<&'static str, Arc<dyn Specialist>> = HashMap::new();
        specialists.insert("cards", Arc::new(CardsSpecialist));
        specialists.insert("digital_account", Arc::new(DigitalAccountSpecialist));
        specialists.insert("investments", Arc::new(InvestmentsSpecialist));
        specialists.insert("credit", Arc::new(CreditSpecialist));
        specialists.insert("insurance", Arc::new(InsuranceSpecialist));
        specialists.insert("technical_escalation", Arc::new(TechnicalEscalationSpecialist));
        specialists.insert("feedback_collector", Arc::new(FeedbackCollectorSpecialist));
        specialists.insert("human_handoff", Arc::new(HumanHandoffSpecialist));

        Self {
            factory,
            knowledge,
            memory,
            ab_tests,
            specialists,
            typification: TypificationWorkflow::new(),
            soft_timeout,
            hard_timeout,
        }
    }

    /// Run one turn to completion, or report a cancellation/timeout
    /// failure (§5, §7).
    pub async fn handle_turn(
        &self,
        session: &Arc<Mutex<SessionState>>,
        agent_id: &str,
        llm: Arc<dyn LlmClient>,
        user_id: &str,
        raw_utterance: &str,
        cancellation: &CancellationToken,
    ) -> Result<TurnResult> {
        self.handle_turn_with_version(session, agent_id, None, llm, user_id, raw_utterance, cancellation).await
    }

    /// Same as [`Router::handle_turn`], but with an explicit version
    /// override (§4.4 resolution order) instead of letting the factory
    /// fall back to an A/B assignment or the active version.
    pub async fn handle_turn_with_version(
        &self,
        session: &Arc<Mutex<SessionState>>,
        agent_id: &str,
        version: Option<i64>,
        llm: Arc<dyn LlmClient>,
        user_id: &str,
        raw_utterance: &str,
        cancellation: &CancellationToken,
    ) -> Result<TurnResult> {
        let normalized = normalize(raw_utterance);

        let handle = self.factory.create_agent(agent_id, version, Some(user_id)).await?;

        let outcome = timeout(self.hard_timeout, self.run_turn_body(session, &handle, llm, user_id, raw_utterance, &normalized, cancellation)).await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(agent_id, "turn exceeded hard timeout");
                Err(RouterError::TimeoutEscalation(self.hard_timeout.as_secs()).into())
            }
        }
    }

    async fn run_turn_body(
        &self,
        session: &Arc<Mutex<SessionState>>,
        handle: &crate::factory::AgentHandle,
        llm: Arc<dyn LlmClient>,
        _user_id: &str,
        raw_utterance: &str,
        normalized: &str,
        cancellation: &CancellationToken,
    ) -> Result<TurnResult> {
        if cancellation.is_cancelled() {
            return Err(RouterError::CancelledTurn.into());
        }

        let recent_normalized: Vec<String> = {
            let state = session.lock().await;
            state.message_history.iter().rev().take(6).map(|m| m.normalized_text.clone()).collect()
        };

        {
            let mut state = session.lock().await;
            frustration::apply_turn(&mut state.frustration_level, normalized, raw_utterance, &recent_normalized);
            // Exactly one push per committed turn — §8 invariant 2 ties
            // `message_history.len()` to `interaction_count`, both counting
            // turns, not speaker-roles.
            state.record_message(MessageRole::Customer, raw_utterance.to_string(), normalized.to_string());
        }

        let fraud_detected = CreditSpecialist::detect_scam(normalized);

        let (specialist_key, needs_clarification) = self.decide_route(session, normalized, fraud_detected).await;

        if needs_clarification {
            let topic = specialist_key.clone().unwrap_or_else(|| "geral".to_string());
            let clarification = "Para te ajudar melhor, você pode detalhar um pouco mais o que precisa? \
                Por exemplo: cartão, conta digital, investimentos, crédito ou seguro."
                .to_string();

            let snapshot = {
                let mut state = session.lock().await;
                state.bump_clarification(&topic);
                state.clone()
            };
            self.memory.put_session(&snapshot).await?;

            return Ok(TurnResult {
                reply: clarification,
                specialist_key: "clarification".to_string(),
                version_used: handle.version,
                protocol: None,
                escalated: false,
                fraud_alert: false,
                state: RouterState::Clarifying,
            });
        }

        let specialist_key = specialist_key.unwrap_or_else(|| "human_handoff".to_string());
        let specialist = self
            .specialists
            .get(specialist_key.as_str())
            .cloned()
            .ok_or_else(|| RouterError::SpecialistFailure(format!("unknown specialist '{specialist_key}'")))?;

        let triggers: EscalationTriggers = handle.config.escalation_triggers.clone();

        let dispatch_state = if specialist_key == "human_handoff" {
            RouterState::Escalated
        } else {
            RouterState::Dispatching
        };

        let run_once = |llm: Arc<dyn LlmClient>, specialist: Arc<dyn Specialist>, triggers: EscalationTriggers| {
            let session = Arc::clone(session);
            let knowledge = self.knowledge.clone();
            let memory = self.memory.clone();
            let ab_tests = self.ab_tests.clone();
            let normalized = normalized.to_string();
            let raw_utterance = raw_utterance.to_string();
            async move {
                let mut state = session.lock().await;
                let mut ctx = SpecialistContext {
                    session: &mut state,
                    normalized_utterance: &normalized,
                    raw_utterance: &raw_utterance,
                    knowledge,
                    llm,
                    memory,
                    ab_tests,
                    triggers,
                };
                specialist.run(&mut ctx).await
            }
        };

        let first_attempt = timeout(self.soft_timeout, run_once(llm.clone(), specialist.clone(), triggers.clone())).await;

        let output = match first_attempt {
            Ok(Ok(output)) => output,
            Ok(Err(_)) | Err(_) => {
                warn!(specialist_key, "specialist failed or timed out, retrying once");
                match timeout(self.soft_timeout, run_once(llm.clone(), specialist.clone(), triggers.clone())).await {
                    Ok(Ok(output)) => output,
                    _ => {
                        info!(specialist_key, "retry exhausted, falling back to apology and technical ticket");
                        let technical = self.specialists.get("technical_escalation").unwrap().clone();
                        run_once(llm, technical, triggers).await?
                    }
                }
            }
        };

        let escalated = output.close_session;

        let snapshot = {
            let mut state = session.lock().await;
            state.record_routing(&specialist_key, fraud_detected);
            if let Some(protocol) = &output.protocol {
                if !state.protocols.contains(protocol) {
                    state.protocols.push(protocol.clone());
                }
            }
            if escalated {
                // §4.8: the Typification Workflow runs at session closure
                // (human handoff, resolution, or explicit end) to classify
                // the ticket the closed turn leaves behind.
                let attempt = typification::attempt_from_routing(&specialist_key, normalized);
                let ticket = self.typification.run(&attempt);
                state.tickets.push(typification::describe_ticket(&ticket));
            }
            state.clone()
        };
        // §4.5: persisted to the Memory Store after every turn.
        self.memory.put_session(&snapshot).await?;

        let state = if escalated { RouterState::Closed } else { dispatch_state };

        Ok(TurnResult {
            reply: output.reply,
            specialist_key,
            version_used: handle.version,
            protocol: output.protocol,
            escalated,
            fraud_alert: matches!(output.alert_level, Some(AlertLevel::High)),
            state,
        })
    }

    /// Decide which specialist handles this turn, or report that a
    /// clarification question is needed instead (§4.6 steps 4-5).
    async fn decide_route(&self, session: &Arc<Mutex<SessionState>>, normalized: &str, fraud_detected: bool) -> (Option<String>, bool) {
        let (frustration, interaction_count, resolved) = {
            let state = session.lock().await;
            (state.frustration_level.is_escalation_threshold(), state.interaction_count, state.resolved)
        };

        // Escalation gate (§4.6 step 4) runs before the fraud shortcut
        // (step 5): a customer already past the frustration/interaction
        // threshold goes to a human even if the same utterance also trips
        // the scam keywords.
        if frustration || (interaction_count > MAX_INTERACTIONS_BEFORE_ESCALATION && !resolved) || requests_human(normalized) {
            return (Some("human_handoff".to_string()), false);
        }

        if fraud_detected {
            return (Some("credit".to_string()), false);
        }

        let matches = match_specialists(normalized);
        if matches.is_empty() || matches.len() > 2 {
            let topic = matches.first().map(|(key, _)| key.to_string());
            let already_clarified = {
                let state = session.lock().await;
                topic.as_deref().map(|t| state.clarifications_for(t)).unwrap_or(0) >= MAX_CLARIFICATIONS_PER_TOPIC
            };

            if already_clarified {
                return (Some(best_match(&matches).unwrap_or("human_handoff").to_string()), false);
            }
            return (topic, true);
        }

        (best_match(&matches).map(|s| s.to_string()), false)
    }
}

/// Mints a Technical Escalation protocol ahead of time, for callers that
/// need one outside a specialist turn (e.g. LLM provider total failure
/// surfaced at the API layer, §7).
pub fn mint_technical_protocol() -> String {
    protocol::generate(ProtocolKind::Technical, chrono::Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentIdentity, ConfigDocument, EscalationTriggers, KnowledgeFilter, MemoryPolicy, ModelParams, StorageBinding};
    use crate::llm::{EmbeddingResponse, GenerationResponse, Message as LlmMessage};
    use crate::store::ConfigStore;
    use async_trait::async_trait;

    #[test]
    fn keyword_table_routes_cards_before_digital_account_on_tie() {
        let matches = match_specialists("quero saber sobre meu cartão e meu saldo");
        assert_eq!(best_match(&matches), Some("cards"));
    }

    #[test]
    fn more_specific_hits_win_regardless_of_table_order() {
        let matches = match_specialists("cdb cofrinho investimento rendimento");
        assert_eq!(best_match(&matches), Some("investments"));
    }

    #[test]
    fn unmatched_utterance_has_no_best_match() {
        let matches = match_specialists("bom dia");
        assert!(matches.is_empty());
    }

    #[test]
    fn explicit_human_request_is_detected() {
        assert!(requests_human("eu quero falar com atendente agora"));
    }

    struct StubLlm;

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn generate(&self, _messages: &[LlmMessage]) -> Result<GenerationResponse> {
            Ok(GenerationResponse {
                text: "Claro, posso te ajudar com isso.".to_string(),
                tokens_used: Some(8),
                model: "stub".to_string(),
                finish_reason: Some("stop".to_string()),
            })
        }
        async fn embed(&self, _text: &str) -> Result<EmbeddingResponse> {
            Ok(EmbeddingResponse { embedding: vec![0.0], model: "stub".to_string() })
        }
    }

    fn doc(agent_id: &str, version: i64, role: &str) -> ConfigDocument {
        ConfigDocument {
            agent: AgentIdentity {
                agent_id: agent_id.to_string(),
                version,
                name: "Roteador de Testes".into(),
                role: role.to_string(),
                description: "agente de teste".into(),
            },
            model: ModelParams::default(),
            instructions: "Responda ao cliente.".into(),
            tools: vec![],
            knowledge_filter: KnowledgeFilter::default(),
            storage: StorageBinding {
                kind: "sqlite".into(),
                table_name: format!("{agent_id}_memory"),
                auto_upgrade_schema: true,
            },
            memory: MemoryPolicy::default(),
            escalation_triggers: EscalationTriggers::default(),
        }
    }

    async fn test_router() -> (Router, Arc<Mutex<SessionState>>, Arc<dyn LlmClient>) {
        let store = Arc::new(ConfigStore::connect("sqlite::memory:").await.unwrap());
        store.create_version("router-agent", 1, doc("router-agent", 1, "router-agent"), "tester", "").await.unwrap();
        store.activate_version("router-agent", 1, "tester", "launch").await.unwrap();

        let ab_tests = Arc::new(AbTestManager::new());
        let llm: Arc<dyn LlmClient> = Arc::new(StubLlm);
        let factory = Arc::new(AgentFactory::new(store.clone(), llm.clone(), ab_tests.clone()));
        let knowledge = Arc::new(KnowledgeGateway::new(vec![], llm.clone()));
        let memory = Arc::new(MemoryStore::connect("sqlite::memory:").await.unwrap());

        let router = Router::new(factory, knowledge, memory, ab_tests, Duration::from_secs(5), Duration::from_secs(10));
        let session = Arc::new(Mutex::new(SessionState::new("s1", "c1")));
        (router, session, llm)
    }

    #[tokio::test]
    async fn routes_a_card_question_to_the_cards_specialist() {
        let (router, session, llm) = test_router().await;
        let token = CancellationToken::new();
        let result = router
            .handle_turn(&session, "router-agent", llm, "c1", "quero saber o limite do meu cartão", &token)
            .await
            .unwrap();
        assert_eq!(result.specialist_key, "cards");
        assert!(!result.escalated);
    }

    #[tokio::test]
    async fn ambiguous_utterance_asks_for_clarification_once_then_forces_a_route() {
        let (router, session, llm) = test_router().await;
        let token = CancellationToken::new();

        let first = router.handle_turn(&session, "router-agent", llm.clone(), "c1", "oi, bom dia", &token).await.unwrap();
        assert_eq!(first.specialist_key, "clarification");

        let second = router.handle_turn(&session, "router-agent", llm, "c1", "oi, bom dia", &token).await.unwrap();
        assert_ne!(second.specialist_key, "clarification");
    }

    #[tokio::test]
    async fn payment_advance_scam_routes_to_credit_with_high_alert() {
        let (router, session, llm) = test_router().await;
        let token = CancellationToken::new();
        let result = router
            .handle_turn(&session, "router-agent", llm, "c1", "pediram para eu pagar uma taxa antes de liberar o emprestimo", &token)
            .await
            .unwrap();
        assert_eq!(result.specialist_key, "credit");
        assert!(result.fraud_alert);
    }

    #[tokio::test]
    async fn three_frustrated_turns_escalate_to_a_human() {
        let (router, session, llm) = test_router().await;
        let token = CancellationToken::new();

        for _ in 0..3 {
            router
                .handle_turn(&session, "router-agent", llm.clone(), "c1", "ISSO NAO FUNCIONA, que absurdo, cansei", &token)
                .await
                .unwrap();
        }

        let last = router.handle_turn(&session, "router-agent", llm, "c1", "ISSO NAO FUNCIONA, que absurdo, cansei", &token).await.unwrap();
        assert_eq!(last.specialist_key, "human_handoff");
        assert!(last.escalated);
    }
}
