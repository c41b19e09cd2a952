//! Digital Account Specialist (§4.7): Pix, account statements, transfers.

use crate::error::Result;
use crate::knowledge::{BusinessUnit, SearchFilter};
use crate::llm::{system_message, user_message};
use crate::specialists::{apologize_if_degraded, search_context, Specialist, SpecialistContext, SpecialistOutput};
use async_trait::async_trait;

pub struct DigitalAccountSpecialist;

#[async_trait]
impl Specialist for DigitalAccountSpecialist {
    fn key(&self) -> &'static str {
        "digital_account"
    }

    async fn run(&self, ctx: &mut SpecialistContext<'_>) -> Result<SpecialistOutput> {
        let filter = SearchFilter {
            business_unit: Some(BusinessUnit::ContaDigital),
            ..Default::default()
        };

        let (knowledge, degraded) = search_context(&ctx.knowledge, ctx.normalized_utterance, &filter, 3).await;

        let pix_high_value = ctx.triggers.threshold("pix_high_value", 5000.0);

        let messages = vec![
            system_message(format!(
                "Você é a Especialista de Conta Digital do PagBank. Responda com objetividade, \
                 em português. Transferências Pix acima de R$ {pix_high_value:.2} exigem \
                 confirmação adicional de segurança; mencione isso quando o valor aparecer na \
                 mensagem do cliente."
            )),
            system_message(format!("Referência:\n{knowledge}")),
            user_message(ctx.raw_utterance),
        ];

        let response = ctx.llm.generate(&messages).await?;
        Ok(SpecialistOutput::reply(apologize_if_degraded(response.text, degraded)))
    }
}
