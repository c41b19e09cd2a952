//! Technical Escalation Specialist (§4.7): system errors, bugs, and
//! LLM-failure fallbacks the Router routes here directly.

use crate::error::Result;
use crate::protocol::ProtocolKind;
use crate::specialists::{new_protocol, Specialist, SpecialistContext, SpecialistOutput};
use async_trait::async_trait;

pub struct TechnicalEscalationSpecialist;

#[async_trait]
impl Specialist for TechnicalEscalationSpecialist {
    fn key(&self) -> &'static str {
        "technical_escalation"
    }

    async fn run(&self, ctx: &mut SpecialistContext<'_>) -> Result<SpecialistOutput> {
        let protocol = new_protocol(ProtocolKind::Technical);
        ctx.session.protocols.push(protocol.clone());

        Ok(SpecialistOutput {
            reply: format!(
                "Identificamos uma falha técnica ao processar sua solicitação. Abrimos o \
                 protocolo {protocol} e nossa equipe técnica vai retornar em breve."
            ),
            protocol: Some(protocol),
            alert_level: None,
            close_session: false,
        })
    }
}
