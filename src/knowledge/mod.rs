//! Knowledge Gateway (C2)

pub mod csv_loader;
pub mod gateway;
pub mod types;

pub use gateway::{cosine_similarity, KnowledgeGateway};
pub use types::{BusinessUnit, Complexity, InfoType, KnowledgeRecord, SearchFilter, SearchResult};
