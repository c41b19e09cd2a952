//! Investments Specialist (§4.7): CDB, Cofrinho, fund products.
//!
//! Every reply carries the compliance disclaimer and, when the corpus
//! surfaces the Cofrinho product, the FGC guarantee mention — both are
//! mandatory regardless of what the LLM generates (§4.7 non-negotiable
//! compliance text).

use crate::error::Result;
use crate::knowledge::{BusinessUnit, SearchFilter};
use crate::llm::{system_message, user_message};
use crate::specialists::{apologize_if_degraded, search_raw, Specialist, SpecialistContext, SpecialistOutput};
use async_trait::async_trait;

const COMPLIANCE_DISCLAIMER: &str = "Esta não é uma recomendação de investimento. Rentabilidade \
    passada não garante resultados futuros. Consulte o regulamento do produto antes de investir.";

pub struct InvestmentsSpecialist;

#[async_trait]
impl Specialist for InvestmentsSpecialist {
    fn key(&self) -> &'static str {
        "investments"
    }

    async fn run(&self, ctx: &mut SpecialistContext<'_>) -> Result<SpecialistOutput> {
        let filter = SearchFilter {
            business_unit: Some(BusinessUnit::Investimentos),
            ..Default::default()
        };

        let (search_results, degraded) = search_raw(&ctx.knowledge, ctx.normalized_utterance, &filter, 3).await;
        let knowledge = search_results.iter().map(|r| r.content.clone()).collect::<Vec<_>>().join("\n");
        let mentions_cofrinho = search_results.iter().any(|r| r.content.to_lowercase().contains("cofrinho"))
            || ctx.normalized_utterance.contains("cofrinho");

        let messages = vec![
            system_message(
                "Você é a Especialista de Investimentos do PagBank. Responda com objetividade, \
                 em português, usando as informações de referência abaixo.",
            ),
            system_message(format!("Referência:\n{knowledge}")),
            user_message(ctx.raw_utterance),
        ];

        let response = ctx.llm.generate(&messages).await?;
        let mut reply = response.text;

        if mentions_cofrinho && !reply.to_lowercase().contains("fgc") {
            reply.push_str("\n\nO Cofrinho é protegido pelo FGC até o limite legal por CPF e por instituição.");
        }

        reply.push_str(&format!("\n\n{COMPLIANCE_DISCLAIMER}"));

        Ok(SpecialistOutput::reply(apologize_if_degraded(reply, degraded)))
    }
}

#[cfg(test)]
mod tests {
    use super::COMPLIANCE_DISCLAIMER;

    #[test]
    fn disclaimer_text_is_present() {
        assert!(COMPLIANCE_DISCLAIMER.contains("regulamento"));
    }

    #[test]
    fn disclaimer_contains_the_mandated_non_recommendation_phrase() {
        assert!(COMPLIANCE_DISCLAIMER.contains("Esta não é uma recomendação de investimento"));
    }
}
