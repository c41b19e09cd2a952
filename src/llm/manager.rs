//! Provider retry/fallback wrapper (§4.6 step 7, §7 LLMFailure policy:
//! "retry once, then fall back to a prior working version, then a safe
//! apology plus a Technical Escalation ticket").

use crate::error::{LlmError, Result, RuntimeError};
use crate::llm::client::{GenerationResponse, LlmClient, Message};
use std::sync::Arc;
use tracing::warn;

/// Outcome of [`ProviderManager::generate_with_fallback`], distinguishing
/// a degraded-but-successful response from total failure so the router
/// can decide whether to open a Technical Escalation ticket.
pub enum FallbackOutcome {
    Primary(GenerationResponse),
    Fallback(GenerationResponse),
    Exhausted,
}

/// Wraps a primary provider and an optional fallback provider (typically a
/// prior known-good model version) behind the retry-then-fallback policy.
pub struct ProviderManager {
    primary: Arc<dyn LlmClient>,
    fallback: Option<Arc<dyn LlmClient>>,
    max_retries: u32,
}

impl ProviderManager {
    pub fn new(primary: Arc<dyn LlmClient>, fallback: Option<Arc<dyn LlmClient>>) -> Self {
        Self {
            primary,
            fallback,
            max_retries: 1,
        }
    }

    pub async fn generate_with_fallback(&self, messages: &[Message]) -> FallbackOutcome {
        let mut attempts = 0;
        loop {
            match self.primary.generate(messages).await {
                Ok(response) => return FallbackOutcome::Primary(response),
                Err(err) if attempts < self.max_retries && is_retryable(&err) => {
                    attempts += 1;
                    warn!(attempt = attempts, error = %err, "retrying primary provider");
                    continue;
                }
                Err(err) => {
                    warn!(error = %err, "primary provider exhausted, trying fallback");
                    break;
                }
            }
        }

        let Some(fallback) = &self.fallback else {
            return FallbackOutcome::Exhausted;
        };

        match fallback.generate(messages).await {
            Ok(response) => FallbackOutcome::Fallback(response),
            Err(err) => {
                warn!(error = %err, "fallback provider also failed");
                FallbackOutcome::Exhausted
            }
        }
    }
}

fn is_retryable(err: &RuntimeError) -> bool {
    matches!(
        err,
        RuntimeError::Llm(LlmError::Timeout) | RuntimeError::Llm(LlmError::ConnectionFailed(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::{user_message, EmbeddingResponse};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyOnce {
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmClient for FlakyOnce {
        async fn generate(&self, _messages: &[Message]) -> Result<GenerationResponse> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(LlmError::Timeout.into())
            } else {
                Ok(GenerationResponse {
                    text: "recovered".into(),
                    tokens_used: None,
                    model: "primary".into(),
                    finish_reason: None,
                })
            }
        }

        async fn embed(&self, _text: &str) -> Result<EmbeddingResponse> {
            unimplemented!()
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl LlmClient for AlwaysFails {
        async fn generate(&self, _messages: &[Message]) -> Result<GenerationResponse> {
            Err(LlmError::ConnectionFailed("down".into()).into())
        }

        async fn embed(&self, _text: &str) -> Result<EmbeddingResponse> {
            unimplemented!()
        }
    }

    struct AlwaysSucceeds(&'static str);

    #[async_trait]
    impl LlmClient for AlwaysSucceeds {
        async fn generate(&self, _messages: &[Message]) -> Result<GenerationResponse> {
            Ok(GenerationResponse {
                text: self.0.into(),
                tokens_used: None,
                model: self.0.into(),
                finish_reason: None,
            })
        }

        async fn embed(&self, _text: &str) -> Result<EmbeddingResponse> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn one_retry_recovers_on_primary() {
        let manager = ProviderManager::new(Arc::new(FlakyOnce { calls: AtomicU32::new(0) }), None);
        match manager.generate_with_fallback(&[user_message("oi")]).await {
            FallbackOutcome::Primary(r) => assert_eq!(r.text, "recovered"),
            _ => panic!("expected primary success after one retry"),
        }
    }

    #[tokio::test]
    async fn falls_back_when_primary_exhausted() {
        let manager = ProviderManager::new(Arc::new(AlwaysFails), Some(Arc::new(AlwaysSucceeds("fallback"))));
        match manager.generate_with_fallback(&[user_message("oi")]).await {
            FallbackOutcome::Fallback(r) => assert_eq!(r.text, "fallback"),
            _ => panic!("expected fallback success"),
        }
    }

    #[tokio::test]
    async fn exhausted_when_no_fallback_configured() {
        let manager = ProviderManager::new(Arc::new(AlwaysFails), None);
        assert!(matches!(
            manager.generate_with_fallback(&[user_message("oi")]).await,
            FallbackOutcome::Exhausted
        ));
    }
}
