//! Black-box LLM provider integration (C module referenced throughout
//! §4 as "the LLM provider" — never a concrete vendor).

pub mod client;
pub mod manager;

pub use client::{
    assistant_message, system_message, user_message, EmbeddingResponse, GenerationResponse,
    HttpLlmClient, LlmClient, Message, MessageRole, ProviderConfig,
};
pub use manager::{FallbackOutcome, ProviderManager};
