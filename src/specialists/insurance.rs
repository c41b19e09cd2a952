//! Insurance Specialist (§4.7): life, health and income-protection
//! products. Replies anchor on the two reference figures the business
//! requires customers to see (§4.7): the R$20.000 monthly income draw and
//! the R$24,90 entry-level health plan price.

use crate::error::Result;
use crate::knowledge::{BusinessUnit, SearchFilter};
use crate::llm::{system_message, user_message};
use crate::specialists::{apologize_if_degraded, search_context, Specialist, SpecialistContext, SpecialistOutput};
use async_trait::async_trait;

const INCOME_DRAW_ANCHOR: &str = "R$ 20.000 de saque mensal";
const HEALTH_PLAN_ANCHOR: &str = "a partir de R$ 24,90";

pub struct InsuranceSpecialist;

#[async_trait]
impl Specialist for InsuranceSpecialist {
    fn key(&self) -> &'static str {
        "insurance"
    }

    async fn run(&self, ctx: &mut SpecialistContext<'_>) -> Result<SpecialistOutput> {
        let filter = SearchFilter {
            business_unit: Some(BusinessUnit::Seguros),
            ..Default::default()
        };
        let (knowledge, degraded) = search_context(&ctx.knowledge, ctx.normalized_utterance, &filter, 3).await;

        let messages = vec![
            system_message(format!(
                "Você é o Especialista de Seguros do PagBank. Ao falar de seguro de renda, \
                 mencione o saque mensal de {INCOME_DRAW_ANCHOR}. Ao falar de plano de saúde, \
                 mencione o plano {HEALTH_PLAN_ANCHOR} por mês. Responda em português."
            )),
            system_message(format!("Referência:\n{knowledge}")),
            user_message(ctx.raw_utterance),
        ];

        let response = ctx.llm.generate(&messages).await?;
        let mut reply = response.text;

        let wants_income = ctx.normalized_utterance.contains("renda") || ctx.normalized_utterance.contains("aposentadoria");
        if wants_income && !reply.contains("20.000") {
            reply.push_str(&format!("\n\nO seguro de renda do PagBank permite {INCOME_DRAW_ANCHOR}."));
        }

        let wants_health = ctx.normalized_utterance.contains("saúde") || ctx.normalized_utterance.contains("saude");
        if wants_health && !reply.contains("24,90") {
            reply.push_str(&format!("\n\nNossos planos de saúde começam {HEALTH_PLAN_ANCHOR} por mês."));
        }

        Ok(SpecialistOutput::reply(apologize_if_degraded(reply, degraded)))
    }
}
