//! Memory Store (C3)

pub mod session;
pub mod store;

pub use session::{
    CustomerContext, EscalationFlag, FrustrationLevel, Message, MessageRole, RoutingEvent,
    SessionState, SharedWorkspace, TeamDecision,
};
pub use store::{compute_patterns, MemoryStore, PatternReport, UserMemory};
