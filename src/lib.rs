//! Agent Routing and Versioned-Configuration Runtime
//!
//! The backbone that lets PagBank's customer-service specialists evolve
//! independently: a Config Store holds every version of every agent's
//! configuration, a Knowledge Gateway serves filtered semantic search
//! over the help-center corpus, an Agent Factory resolves the effective
//! version for a request (explicit override, A/B assignment, or active
//! version) into a ready-to-run handle, and a Router drives each
//! conversation turn through normalization, frustration scoring,
//! keyword-based specialist dispatch, and escalation.
//!
//! ```rust,no_run
//! use pagbank_routing_runtime::config::ProcessConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let _config = ProcessConfig::load()?;
//!     Ok(())
//! }
//! ```

pub mod abtest;
pub mod api;
pub mod config;
pub mod error;
pub mod factory;
pub mod frustration;
pub mod knowledge;
pub mod llm;
pub mod memory;
pub mod normalize;
pub mod protocol;
pub mod router;
pub mod session_tools;
pub mod specialists;
pub mod store;
pub mod typification;

pub use abtest::{AbTest, AbTestManager, AnalysisSummary, Arm, ArmSummary, TestStatus};
pub use error::{Result, RuntimeError};
pub use factory::{AgentFactory, AgentHandle, AgentKind};
pub use knowledge::{BusinessUnit, KnowledgeGateway, SearchFilter, SearchResult};
pub use llm::{HttpLlmClient, LlmClient, ProviderConfig};
pub use memory::{MemoryStore, SessionState};
pub use router::{Router, TurnResult};
pub use store::ConfigStore;
pub use typification::{Ticket, TypificationWorkflow};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
