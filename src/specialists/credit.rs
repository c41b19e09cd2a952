//! Credit Specialist (§4.7): loans, receivables anticipation, and the
//! mandatory payment-advance-scam shortcut.
//!
//! Two hard constraints (§4.7, §8): every one of the canonical scam
//! keywords (and their near-variants) must be caught, and no reply may
//! imply a guaranteed approval.

use crate::error::Result;
use crate::knowledge::{BusinessUnit, SearchFilter};
use crate::llm::{system_message, user_message};
use crate::protocol::ProtocolKind;
use crate::session_tools::SessionTools;
use crate::specialists::{new_protocol, search_context, AlertLevel, Specialist, SpecialistContext, SpecialistOutput};
use async_trait::async_trait;

/// Literal scam phrases (§4.6 step 5's canonical list plus documented
/// variants). Matched against the normalized utterance.
pub const SCAM_KEYWORDS: &[&str] = &[
    "pagamento antecipado",
    "pagar para liberar",
    "depósito antes",
    "deposito antes",
    "taxa de liberação",
    "taxa de liberacao",
    "boleto para liberar",
    "pagar uma taxa antes",
    "taxa antecipada para liberar",
    "depósito antecipado para aprovar",
    "pagamento antecipado para liberar o crédito",
    "pagar para receber o empréstimo",
    "comprovante de pagamento antes de liberar",
];

/// Word pairs that signal the same scam pattern when they occur close
/// together but not as one of the fixed [`SCAM_KEYWORDS`] phrases — e.g.
/// "pagar 500 reais para liberar o empréstimo" (§4.6 step 5 "near-variants").
const SCAM_PROXIMITY_PAIRS: &[(&str, &str)] = &[("pagar", "liberar"), ("depósito", "liberar"), ("deposito", "liberar"), ("taxa", "liberar"), ("boleto", "liberar")];

const SCAM_PROXIMITY_WINDOW: usize = 6;

const NO_GUARANTEE_NOTICE: &str = "A aprovação de crédito depende de análise e não é garantida.";

pub struct CreditSpecialist;

impl CreditSpecialist {
    pub fn detect_scam(normalized_utterance: &str) -> bool {
        if SCAM_KEYWORDS.iter().any(|kw| normalized_utterance.contains(kw)) {
            return true;
        }

        let words: Vec<&str> = normalized_utterance.split_whitespace().collect();
        SCAM_PROXIMITY_PAIRS.iter().any(|(a, b)| words_within_window(&words, a, b, SCAM_PROXIMITY_WINDOW))
    }
}

fn bare<'a>(w: &'a &str) -> &'a str {
    w.trim_matches(|c: char| c.is_ascii_punctuation())
}

fn words_within_window(words: &[&str], a: &str, b: &str, window: usize) -> bool {
    let positions_of = |needle: &str| -> Vec<usize> { words.iter().enumerate().filter(|(_, w)| bare(w) == needle).map(|(i, _)| i).collect() };

    let a_positions = positions_of(a);
    let b_positions = positions_of(b);
    a_positions.iter().any(|&ai| b_positions.iter().any(|&bi| bi > ai && bi - ai <= window))
}

#[async_trait]
impl Specialist for CreditSpecialist {
    fn key(&self) -> &'static str {
        "credit"
    }

    async fn run(&self, ctx: &mut SpecialistContext<'_>) -> Result<SpecialistOutput> {
        if Self::detect_scam(ctx.normalized_utterance) {
            let protocol = new_protocol(ProtocolKind::Fraud);
            ctx.session.awaiting_human = true;
            ctx.session.protocols.push(protocol.clone());

            let mut tools = SessionTools::new(ctx.session);
            tools.set_escalation_flag("fraud_suspected", "padrão de golpe de pagamento antecipado detectado");

            return Ok(SpecialistOutput {
                reply: format!(
                    "ATENÇÃO: identificamos um padrão comum de golpe. O PagBank nunca pede \
                     pagamento antecipado para liberar crédito. Não realize nenhum pagamento e \
                     entre em contato pelos canais oficiais para confirmar qualquer solicitação \
                     de crédito. Protocolo {protocol}."
                ),
                protocol: Some(protocol),
                alert_level: Some(AlertLevel::High),
                close_session: true,
            });
        }

        let anticipation_threshold = ctx.triggers.threshold("anticipation_high_value", 10_000.0);

        let filter = SearchFilter {
            business_unit: Some(BusinessUnit::Credito),
            ..Default::default()
        };
        let (knowledge, degraded) = search_context(&ctx.knowledge, ctx.normalized_utterance, &filter, 3).await;

        let messages = vec![
            system_message(format!(
                "Você é o Especialista de Crédito do PagBank. Nunca garanta aprovação de \
                 crédito — toda solicitação passa por análise. Antecipações acima de R$ \
                 {anticipation_threshold:.2} exigem confirmação adicional. Responda em português."
            )),
            system_message(format!("Referência:\n{knowledge}")),
            user_message(ctx.raw_utterance),
        ];

        let response = ctx.llm.generate(&messages).await?;
        let mut reply = response.text;
        if !reply.to_lowercase().contains("análise") && !reply.to_lowercase().contains("analise") {
            reply.push_str(&format!("\n\n{NO_GUARANTEE_NOTICE}"));
        }

        Ok(SpecialistOutput::reply(crate::specialists::apologize_if_degraded(reply, degraded)))
    }
}
