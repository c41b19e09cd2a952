//! Process entrypoint: loads [`ProcessConfig`], wires every component
//! (§6 "Environment", §9 design note 4: one composition root, no global
//! statics) and serves the Request API (C10).

use pagbank_routing_runtime::abtest::AbTestManager;
use pagbank_routing_runtime::config::ProcessConfig;
use pagbank_routing_runtime::factory::AgentFactory;
use pagbank_routing_runtime::knowledge::csv_loader;
use pagbank_routing_runtime::knowledge::KnowledgeGateway;
use pagbank_routing_runtime::llm::{HttpLlmClient, LlmClient, ProviderConfig};
use pagbank_routing_runtime::memory::MemoryStore;
use pagbank_routing_runtime::router::Router;
use pagbank_routing_runtime::store::ConfigStore;
use pagbank_routing_runtime::{api, api::AppState};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const CORPUS_PATH_ENV: &str = "PAGBANK_KNOWLEDGE_CORPUS";
const DEFAULT_CORPUS_PATH: &str = "config/knowledge_corpus.csv";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ProcessConfig::load()?;
    info!(bind_addr = %config.bind_addr, "starting pagbank-runtime");

    let store = Arc::new(ConfigStore::connect(&config.database_url).await?);
    let memory = Arc::new(MemoryStore::connect(&config.memory_database_url).await?);
    let ab_tests = Arc::new(AbTestManager::new());

    let llm: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::new(ProviderConfig {
        base_url: config.llm_base_url.clone(),
        model_id: "default".to_string(),
        api_key: Some(config.model_provider_key.clone()),
        temperature: 0.3,
        max_tokens: 1024,
        timeout_secs: config.turn_soft_timeout_secs,
    })?);

    let corpus_path = std::env::var(CORPUS_PATH_ENV).unwrap_or_else(|_| DEFAULT_CORPUS_PATH.to_string());
    let records = match csv_loader::load_corpus_file(&corpus_path).await {
        Ok(records) => records,
        Err(err) => {
            tracing::warn!(%err, corpus_path, "knowledge corpus unavailable at startup, serving with an empty index");
            Vec::new()
        }
    };
    let knowledge = Arc::new(KnowledgeGateway::new(records, llm.clone()));
    if let Err(err) = knowledge.reindex().await {
        tracing::warn!(%err, "knowledge corpus embedding failed at startup, search will degrade until retried");
    }

    let factory = Arc::new(AgentFactory::new(store.clone(), llm.clone(), ab_tests.clone()));

    let router = Arc::new(Router::new(
        factory.clone(),
        knowledge.clone(),
        memory.clone(),
        ab_tests.clone(),
        Duration::from_secs(config.turn_soft_timeout_secs),
        Duration::from_secs(config.turn_hard_timeout_secs),
    ));

    let state = AppState::new(factory, store, knowledge, memory, ab_tests, llm, router);
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(bind_addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
