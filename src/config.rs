//! Agent configuration documents (§6) and process-level settings
//!
//! Two different things are called "config" in this runtime and they must
//! not be confused:
//!
//! - [`ConfigDocument`] is the versioned, per-agent document the Config
//!   Store persists (agent identity, model parameters, instructions, tool
//!   list, knowledge filter, storage binding, memory policy, escalation
//!   triggers). It is authored as YAML or JSON and is the unit `C1` creates
//!   and activates.
//! - [`ProcessConfig`] is the one-per-process runtime configuration (the
//!   config-store database URL, the memory-store database URL, the
//!   model-provider key and LLM base URL, the HTTP bind address) loaded
//!   once at startup via the `config` crate.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

/// A versioned agent/team/workflow configuration document (§6).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConfigDocument {
    pub agent: AgentIdentity,
    pub model: ModelParams,
    pub instructions: String,
    #[serde(default)]
    pub tools: Vec<String>,
    pub knowledge_filter: KnowledgeFilter,
    pub storage: StorageBinding,
    pub memory: MemoryPolicy,
    #[serde(default)]
    pub escalation_triggers: EscalationTriggers,
}

impl ConfigDocument {
    /// Parse a config document from a YAML source.
    pub fn from_yaml(source: &str) -> Result<Self> {
        serde_yml::from_str(source)
            .map_err(|e| ConfigError::InvalidDocument(e.to_string()).into())
    }

    /// Parse a config document from a JSON source.
    pub fn from_json(source: &str) -> Result<Self> {
        serde_json::from_str(source)
            .map_err(|e| ConfigError::InvalidDocument(e.to_string()).into())
    }

    /// Validate the document against the mandatory-field and range
    /// constraints from §6. `version` is validated separately by the
    /// Config Store, since it is not part of the document body.
    pub fn validate(&self) -> Result<()> {
        if self.agent.agent_id.is_empty() {
            return Err(ConfigError::InvalidDocument("agent.agent_id is required".into()).into());
        }
        if self.agent.name.is_empty() {
            return Err(ConfigError::InvalidDocument("agent.name is required".into()).into());
        }
        if self.instructions.trim().is_empty() {
            return Err(ConfigError::InvalidDocument("instructions must not be empty".into()).into());
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::InvalidDocument(
                "model.temperature must be between 0.0 and 2.0".into(),
            )
            .into());
        }
        if self.model.max_tokens == 0 {
            return Err(ConfigError::InvalidDocument("model.max_tokens must be > 0".into()).into());
        }
        if self.storage.table_name.trim().is_empty() {
            return Err(ConfigError::InvalidDocument("storage.table_name is required".into()).into());
        }
        Ok(())
    }
}

/// `config_document.agent` — identity fields.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub version: i64,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub description: String,
}

/// `config_document.model` — LLM call parameters.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ModelParams {
    pub provider: String,
    pub id: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    1024
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            provider: String::new(),
            id: String::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// `config_document.knowledge_filter` — narrows Knowledge Gateway search.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct KnowledgeFilter {
    #[serde(default)]
    pub business_unit: Vec<String>,
    #[serde(default)]
    pub product_type: Vec<String>,
    #[serde(default)]
    pub complexity: Vec<String>,
    #[serde(default)]
    pub audience: Vec<String>,
}

/// `config_document.storage` — where this agent's session data lives.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StorageBinding {
    #[serde(rename = "type")]
    pub kind: String,
    pub table_name: String,
    #[serde(default)]
    pub auto_upgrade_schema: bool,
}

/// `config_document.memory` — conversation-history memory policy.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MemoryPolicy {
    #[serde(default = "default_true")]
    pub add_history_to_messages: bool,
    #[serde(default = "default_num_history_runs")]
    pub num_history_runs: u32,
}

fn default_true() -> bool {
    true
}

fn default_num_history_runs() -> u32 {
    5
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        Self {
            add_history_to_messages: default_true(),
            num_history_runs: default_num_history_runs(),
        }
    }
}

/// `config_document.escalation_triggers` — numeric thresholds that must
/// match the YAML-sourced values referenced in §4.7 (e.g. high-value PIX).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct EscalationTriggers {
    #[serde(default)]
    pub thresholds: HashMap<String, f64>,
}

impl EscalationTriggers {
    pub fn threshold(&self, key: &str, default: f64) -> f64 {
        self.thresholds.get(key).copied().unwrap_or(default)
    }
}

/// One-per-process runtime configuration (§6 "Environment").
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessConfig {
    pub database_url: String,
    pub memory_database_url: String,
    pub model_provider_key: String,
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_soft_timeout")]
    pub turn_soft_timeout_secs: u64,
    #[serde(default = "default_hard_timeout")]
    pub turn_hard_timeout_secs: u64,
}

fn default_llm_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_soft_timeout() -> u64 {
    60
}

fn default_hard_timeout() -> u64 {
    180
}

impl ProcessConfig {
    /// Load from environment variables (`PAGBANK_` prefix) with an
    /// optional `config/runtime.toml` overlay, the teacher's `config`-crate
    /// layering idiom.
    pub fn load() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/runtime").required(false))
            .add_source(config::Environment::with_prefix("PAGBANK"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}
