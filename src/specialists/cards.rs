//! Cards Specialist (§4.7): card blocking, limits, invoice disputes.
//!
//! Block/unblock requests are a security sub-flow: §4.7 requires they
//! always be escalated for verification rather than handled end-to-end
//! by the assistant.

use crate::error::Result;
use crate::knowledge::{BusinessUnit, SearchFilter};
use crate::llm::{system_message, user_message};
use crate::protocol::ProtocolKind;
use crate::specialists::{apologize_if_degraded, new_protocol, search_context, AlertLevel, Specialist, SpecialistContext, SpecialistOutput};
use async_trait::async_trait;

const BLOCK_UNBLOCK_KEYWORDS: &[&str] = &["bloquear", "bloqueio", "desbloquear", "desbloqueio", "cartão roubado", "cartão perdido", "cartão clonado"];

fn requires_verification(normalized_utterance: &str) -> bool {
    BLOCK_UNBLOCK_KEYWORDS.iter().any(|kw| normalized_utterance.contains(kw))
}

pub struct CardsSpecialist;

#[async_trait]
impl Specialist for CardsSpecialist {
    fn key(&self) -> &'static str {
        "cards"
    }

    async fn run(&self, ctx: &mut SpecialistContext<'_>) -> Result<SpecialistOutput> {
        if requires_verification(ctx.normalized_utterance) {
            let protocol = new_protocol(ProtocolKind::Standard);
            ctx.session.awaiting_human = true;
            ctx.session.protocols.push(protocol.clone());

            return Ok(SpecialistOutput {
                reply: format!(
                    "Por segurança, bloqueio e desbloqueio de cartão exigem verificação de \
                     identidade com um atendente. Vou te encaminhar agora. Protocolo {protocol}."
                ),
                protocol: Some(protocol),
                alert_level: Some(AlertLevel::Medium),
                close_session: true,
            });
        }

        let filter = SearchFilter {
            business_unit: Some(BusinessUnit::Cartoes),
            ..Default::default()
        };

        let (knowledge, degraded) = search_context(&ctx.knowledge, ctx.normalized_utterance, &filter, 3).await;

        let messages = vec![
            system_message(
                "Você é a Especialista de Cartões do PagBank. Responda com objetividade, \
                 em português, usando somente as informações de referência abaixo quando \
                 relevantes.",
            ),
            system_message(format!("Referência:\n{knowledge}")),
            user_message(ctx.raw_utterance),
        ];

        let response = ctx.llm.generate(&messages).await?;
        Ok(SpecialistOutput::reply(apologize_if_degraded(response.text, degraded)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_request_requires_verification() {
        assert!(requires_verification("quero bloquear meu cartao agora"));
    }

    #[test]
    fn unblock_request_requires_verification() {
        assert!(requires_verification("preciso desbloquear o cartao"));
    }

    #[test]
    fn invoice_question_does_not_require_verification() {
        assert!(!requires_verification("quero entender um valor na minha fatura"));
    }
}
