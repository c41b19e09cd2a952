//! Feedback Collector Specialist (§4.7): categorizes free-text feedback
//! into `{ui_ux, products, service}` and writes it to long-term memory so
//! [`crate::memory::store::detect_patterns`] can surface it later.

use crate::error::Result;
use crate::specialists::{Specialist, SpecialistContext, SpecialistOutput};
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackCategory {
    UiUx,
    Products,
    Service,
}

impl FeedbackCategory {
    pub fn as_tag(self) -> &'static str {
        match self {
            FeedbackCategory::UiUx => "feedback_ui_ux",
            FeedbackCategory::Products => "feedback_products",
            FeedbackCategory::Service => "feedback_service",
        }
    }
}

const UI_UX_KEYWORDS: &[&str] = &["aplicativo", "app", "tela", "layout", "travou", "design"];
const PRODUCT_KEYWORDS: &[&str] = &["taxa", "produto", "cartão", "cartao", "investimento", "seguro", "juros"];

pub fn categorize(normalized_utterance: &str) -> FeedbackCategory {
    if UI_UX_KEYWORDS.iter().any(|kw| normalized_utterance.contains(kw)) {
        FeedbackCategory::UiUx
    } else if PRODUCT_KEYWORDS.iter().any(|kw| normalized_utterance.contains(kw)) {
        FeedbackCategory::Products
    } else {
        FeedbackCategory::Service
    }
}

pub struct FeedbackCollectorSpecialist;

#[async_trait]
impl Specialist for FeedbackCollectorSpecialist {
    fn key(&self) -> &'static str {
        "feedback_collector"
    }

    async fn run(&self, ctx: &mut SpecialistContext<'_>) -> Result<SpecialistOutput> {
        let category = categorize(ctx.normalized_utterance);
        ctx.memory
            .add_user_memory(&ctx.session.customer_id, ctx.raw_utterance, &[category.as_tag().to_string(), "feedback".to_string()])
            .await?;

        Ok(SpecialistOutput::reply(
            "Obrigado pelo retorno! Registramos seu feedback e ele vai ajudar a melhorar o PagBank.",
        ))
    }
}
