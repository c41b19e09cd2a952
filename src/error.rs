//! Error handling for the routing runtime

use thiserror::Error;

/// Result type alias used across the runtime
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Top-level error type returned by every public component
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("config store error: {0}")]
    Config(#[from] ConfigError),

    #[error("knowledge gateway error: {0}")]
    Knowledge(#[from] KnowledgeError),

    #[error("memory store error: {0}")]
    Memory(#[from] MemoryError),

    #[error("router error: {0}")]
    Router(#[from] RouterError),

    #[error("typification error: {0}")]
    Typification(#[from] TypificationError),

    #[error("a/b test error: {0}")]
    ABTest(#[from] ABTestError),

    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Errors from the Config Store (C1)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("version {version} of agent '{agent_id}' already exists")]
    VersionExists { agent_id: String, version: i64 },

    #[error("agent '{agent_id}' has no active version")]
    NoActiveVersion { agent_id: String },

    #[error("agent '{agent_id}' version {version} not found")]
    VersionNotFound { agent_id: String, version: i64 },

    #[error("invalid config document: {0}")]
    InvalidDocument(String),
}

/// Errors from the Knowledge Gateway (C2)
#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error("knowledge corpus unavailable")]
    Unavailable,

    #[error("failed to load corpus: {0}")]
    CorpusLoad(String),

    #[error("unknown business unit: {0}")]
    UnknownBusinessUnit(String),

    #[error("unknown product type: {0}")]
    UnknownProductType(String),
}

/// Errors from the Memory Store (C3)
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("store not initialized")]
    NotInitialized,

    #[error("session '{0}' not found")]
    SessionNotFound(String),

    #[error("storage failed: {0}")]
    StorageFailed(String),
}

/// Errors from the Router (C6)
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("specialist failure: {0}")]
    SpecialistFailure(String),

    #[error("fraud detected: {0}")]
    FraudDetected(String),

    #[error("turn cancelled")]
    CancelledTurn,

    #[error("turn timed out after {0}s")]
    TimeoutEscalation(u64),

    #[error("ambiguous utterance matched {0} specialists")]
    Ambiguous(usize),
}

/// Errors from the Typification Workflow (C8)
#[derive(Error, Debug)]
pub enum TypificationError {
    #[error("invalid typification at level '{level}': '{value}' is not valid under the current path")]
    InvalidTypification { level: String, value: String },

    #[error("hierarchy table not loaded")]
    HierarchyNotLoaded,
}

/// Errors from the A/B Test Manager (C9)
#[derive(Error, Debug)]
pub enum ABTestError {
    #[error("test '{0}' not found")]
    NotFound(String),

    #[error("distribution weights must sum to 100, got {0}")]
    InvalidWeights(i64),

    #[error("cannot change distribution of a running test")]
    DistributionLocked,

    #[error("test '{0}' is not running")]
    NotRunning(String),
}

/// Errors from the LLM black-box client
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("timeout: operation took too long")]
    Timeout,

    #[error("all providers failed")]
    AllProvidersFailed,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl RuntimeError {
    /// Whether the failure is worth retrying per the §7 error policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RuntimeError::Llm(LlmError::Timeout)
                | RuntimeError::Llm(LlmError::ConnectionFailed(_))
                | RuntimeError::Knowledge(KnowledgeError::Unavailable)
        )
    }

    /// Error category, used for logging and metrics tags.
    pub fn category(&self) -> &'static str {
        match self {
            RuntimeError::Config(_) => "config",
            RuntimeError::Knowledge(_) => "knowledge",
            RuntimeError::Memory(_) => "memory",
            RuntimeError::Router(_) => "router",
            RuntimeError::Typification(_) => "typification",
            RuntimeError::ABTest(_) => "ab_test",
            RuntimeError::Llm(_) => "llm",
            RuntimeError::Database(_) => "database",
            RuntimeError::Serialization(_) => "serialization",
            RuntimeError::Io(_) => "io",
            RuntimeError::NotFound(_) => "not_found",
        }
    }
}

/// A small retry budget shared by the Router (§7 LLMFailure) and the
/// Typification Workflow (§7 InvalidTypification) so both express "retry
/// N times, then fall back" without duplicating loop-counting logic.
#[derive(Debug, Clone, Copy)]
pub struct RetryBudget {
    attempts: u32,
    max_attempts: u32,
}

impl RetryBudget {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts,
        }
    }

    /// Record an attempt and report whether another one is allowed.
    pub fn record_attempt(&mut self) -> bool {
        self.attempts += 1;
        self.attempts <= self.max_attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}
