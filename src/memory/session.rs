//! Session state (§3, §4.5)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

/// One turn of conversation, kept append-only in `message_history` (§5
/// ordering guarantee: strictly monotonic, wall-clock arrival order).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub role: MessageRole,
    /// Original text, unmodified (§4.6 step 1 never discards information).
    pub raw_text: String,
    pub normalized_text: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    Customer,
    Assistant,
}

/// One routing decision, appended every turn (§4.6 step 7).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoutingEvent {
    pub specialist: String,
    pub at: DateTime<Utc>,
    pub fraud_detected: bool,
}

/// `customer_context` (§3).
#[derive(Debug, Clone, Serialize, Deserialize, Default, ToSchema)]
pub struct CustomerContext {
    pub education_level: Option<String>,
    pub communication_style: Option<String>,
    pub channel: Option<String>,
}

/// `shared` team-workspace scratch space (§3, §4.5 `record_team_decision`,
/// `set_escalation_flag`, `update_customer_insight`).
#[derive(Debug, Clone, Serialize, Deserialize, Default, ToSchema)]
pub struct SharedWorkspace {
    pub research_findings: Vec<String>,
    pub team_decisions: Vec<TeamDecision>,
    pub escalation_flags: Vec<EscalationFlag>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TeamDecision {
    pub decision: String,
    pub reasoning: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EscalationFlag {
    pub kind: String,
    pub details: String,
    pub at: DateTime<Utc>,
}

/// `frustration_level` is clamped to 0..=3 everywhere it is constructed
/// (§3 invariant, §4.6 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default, ToSchema)]
pub struct FrustrationLevel(u8);

impl FrustrationLevel {
    pub fn new(level: u8) -> Self {
        Self(level.min(3))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn add(&mut self, delta: u8) {
        self.0 = (self.0 + delta).min(3);
    }

    pub fn is_escalation_threshold(&self) -> bool {
        self.0 >= 3
    }
}

/// The full per-session conversation state (§3).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionState {
    pub session_id: String,
    pub customer_id: String,
    pub customer_name: Option<String>,
    pub interaction_count: u32,
    pub clarification_count: HashMap<String, u32>,
    pub frustration_level: FrustrationLevel,
    pub message_history: Vec<Message>,
    pub routing_history: Vec<RoutingEvent>,
    pub current_topic: Option<String>,
    pub last_topic: Option<String>,
    pub resolved: bool,
    pub awaiting_human: bool,
    pub tickets: Vec<String>,
    pub protocols: Vec<String>,
    pub satisfaction_score: Option<f32>,
    pub resolution_time: Option<DateTime<Utc>>,
    pub customer_context: CustomerContext,
    pub ab_assignments: HashMap<String, i64>,
    pub shared: SharedWorkspace,
    pub created_at: DateTime<Utc>,
    pub cancelled: bool,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, customer_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            customer_id: customer_id.into(),
            customer_name: None,
            interaction_count: 0,
            clarification_count: HashMap::new(),
            frustration_level: FrustrationLevel::default(),
            message_history: Vec::new(),
            routing_history: Vec::new(),
            current_topic: None,
            last_topic: None,
            resolved: false,
            awaiting_human: false,
            tickets: Vec::new(),
            protocols: Vec::new(),
            satisfaction_score: None,
            resolution_time: None,
            customer_context: CustomerContext::default(),
            ab_assignments: HashMap::new(),
            shared: SharedWorkspace::default(),
            created_at: Utc::now(),
            cancelled: false,
        }
    }

    /// Append a turn. `message_history.len()` strictly increases by 1 and
    /// `interaction_count` increments by 1 (§8 invariant 2).
    pub fn record_message(&mut self, role: MessageRole, raw_text: String, normalized_text: String) {
        if role == MessageRole::Customer {
            self.interaction_count += 1;
            self.last_topic = self.current_topic.clone();
        }
        self.message_history.push(Message {
            role,
            raw_text,
            normalized_text,
            at: Utc::now(),
        });
    }

    pub fn record_routing(&mut self, specialist: &str, fraud_detected: bool) {
        self.current_topic = Some(specialist.to_string());
        self.routing_history.push(RoutingEvent {
            specialist: specialist.to_string(),
            at: Utc::now(),
            fraud_detected,
        });
    }

    pub fn clarifications_for(&self, topic: &str) -> u32 {
        self.clarification_count.get(topic).copied().unwrap_or(0)
    }

    pub fn bump_clarification(&mut self, topic: &str) {
        *self.clarification_count.entry(topic.to_string()).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_a_customer_message_increments_both_counters_together() {
        let mut session = SessionState::new("s1", "c1");
        session.record_message(MessageRole::Customer, "Oi".into(), "oi".into());
        assert_eq!(session.message_history.len(), 1);
        assert_eq!(session.interaction_count, 1);
    }

    #[test]
    fn frustration_level_clamps_at_three() {
        let mut level = FrustrationLevel::new(2);
        level.add(5);
        assert_eq!(level.value(), 3);
        assert!(level.is_escalation_threshold());
    }

    #[test]
    fn clarification_count_is_per_topic() {
        let mut session = SessionState::new("s1", "c1");
        session.bump_clarification("cards");
        session.bump_clarification("cards");
        session.bump_clarification("credit");
        assert_eq!(session.clarifications_for("cards"), 2);
        assert_eq!(session.clarifications_for("credit"), 1);
        assert_eq!(session.clarifications_for("investments"), 0);
    }
}
