//! Specialists (C7): the eight destinations the Router can dispatch a
//! turn to (§4.7). Each one implements [`Specialist`] and is otherwise a
//! plain struct — there is no shared base class, matching the teacher's
//! preference for small trait objects over inheritance-style hierarchies.

pub mod cards;
pub mod credit;
pub mod digital_account;
pub mod feedback;
pub mod human_handoff;
pub mod insurance;
pub mod investments;
pub mod technical;

use crate::abtest::AbTestManager;
use crate::config::EscalationTriggers;
use crate::error::Result;
use crate::knowledge::{KnowledgeGateway, SearchFilter};
use crate::llm::LlmClient;
use crate::memory::session::SessionState;
use crate::memory::MemoryStore;
use crate::protocol::ProtocolKind;
use async_trait::async_trait;
use std::sync::Arc;

/// Level attached to a fraud or compliance alert raised during a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Low,
    Medium,
    High,
}

/// Everything one specialist invocation needs, borrowed for the turn.
pub struct SpecialistContext<'a> {
    pub session: &'a mut SessionState,
    pub normalized_utterance: &'a str,
    pub raw_utterance: &'a str,
    pub knowledge: Arc<KnowledgeGateway>,
    pub llm: Arc<dyn LlmClient>,
    pub memory: Arc<MemoryStore>,
    pub ab_tests: Arc<AbTestManager>,
    pub triggers: EscalationTriggers,
}

/// What a specialist hands back to the Router for one turn.
#[derive(Debug, Clone)]
pub struct SpecialistOutput {
    pub reply: String,
    pub protocol: Option<String>,
    pub alert_level: Option<AlertLevel>,
    pub close_session: bool,
}

impl SpecialistOutput {
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            reply: text.into(),
            protocol: None,
            alert_level: None,
            close_session: false,
        }
    }
}

#[async_trait]
pub trait Specialist: Send + Sync {
    /// Stable identifier used as the routing-table dispatch key and in
    /// `routing_history` (§3).
    fn key(&self) -> &'static str;

    async fn run(&self, ctx: &mut SpecialistContext<'_>) -> Result<SpecialistOutput>;
}

pub(crate) fn new_protocol(kind: ProtocolKind) -> String {
    crate::protocol::generate(kind, chrono::Utc::now())
}

/// Prefix applied to a reply when retrieval degrades to an empty context
/// (§7: `KnowledgeUnavailable` must not fail the turn, only apologize for it).
pub(crate) const KNOWLEDGE_UNAVAILABLE_APOLOGY: &str =
    "Desculpe, nossa base de conhecimento está temporariamente indisponível, mas vou tentar ajudar com o que sei.";

/// Runs a knowledge search, keeping the raw hits. Returns `(results,
/// degraded)`; `degraded` is true when the search itself failed (not
/// merely when it returned zero hits), so callers can prefix the soft
/// apology required by §7.
pub(crate) async fn search_raw(knowledge: &KnowledgeGateway, query: &str, filter: &SearchFilter, top_k: usize) -> (Vec<crate::knowledge::SearchResult>, bool) {
    match knowledge.search(query, filter, top_k).await {
        Ok(results) => (results, false),
        Err(_) => (Vec::new(), true),
    }
}

/// Runs a knowledge search and joins the hits into one reference block.
/// See [`search_raw`] for the `degraded` semantics.
pub(crate) async fn search_context(knowledge: &KnowledgeGateway, query: &str, filter: &SearchFilter, top_k: usize) -> (String, bool) {
    let (results, degraded) = search_raw(knowledge, query, filter, top_k).await;
    (results.into_iter().map(|r| r.content).collect::<Vec<_>>().join("\n"), degraded)
}

/// Prepends the soft-apology prefix to `reply` when `degraded` is set.
pub(crate) fn apologize_if_degraded(reply: impl Into<String>, degraded: bool) -> String {
    let reply = reply.into();
    if degraded {
        format!("{KNOWLEDGE_UNAVAILABLE_APOLOGY}\n\n{reply}")
    } else {
        reply
    }
}

pub use cards::CardsSpecialist;
pub use credit::CreditSpecialist;
pub use digital_account::DigitalAccountSpecialist;
pub use feedback::FeedbackCollectorSpecialist;
pub use human_handoff::HumanHandoffSpecialist;
pub use insurance::InsuranceSpecialist;
pub use investments::InvestmentsSpecialist;
pub use technical::TechnicalEscalationSpecialist;
