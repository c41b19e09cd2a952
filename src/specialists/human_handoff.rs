//! Human Handoff Specialist (§4.7): the escalation terminal. Summarizes
//! the conversation, mints a standard protocol, and closes the session.

use crate::error::Result;
use crate::protocol::ProtocolKind;
use crate::session_tools::SessionTools;
use crate::specialists::{new_protocol, Specialist, SpecialistContext, SpecialistOutput};
use async_trait::async_trait;

pub struct HumanHandoffSpecialist;

#[async_trait]
impl Specialist for HumanHandoffSpecialist {
    fn key(&self) -> &'static str {
        "human_handoff"
    }

    async fn run(&self, ctx: &mut SpecialistContext<'_>) -> Result<SpecialistOutput> {
        let protocol = new_protocol(ProtocolKind::Standard);
        ctx.session.protocols.push(protocol.clone());
        ctx.session.awaiting_human = true;
        ctx.session.resolved = false;

        let topic = ctx.session.current_topic.clone().unwrap_or_else(|| "atendimento geral".to_string());
        let summary = format!(
            "Resumo: cliente {} em atendimento sobre {} após {} interações, nível de frustração {}.",
            ctx.session.customer_id,
            topic,
            ctx.session.interaction_count,
            ctx.session.frustration_level.value(),
        );

        let mut tools = SessionTools::new(ctx.session);
        tools.record_team_decision("encaminhar para atendente humano", summary.clone());

        Ok(SpecialistOutput {
            reply: format!(
                "Vou te transferir para um atendente humano agora. Protocolo {protocol}. {summary}"
            ),
            protocol: Some(protocol),
            alert_level: None,
            close_session: true,
        })
    }
}
