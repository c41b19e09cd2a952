//! Session State tools (C5): typed operations a specialist or team can
//! call against the shared per-session state, last-writer-wins within a
//! turn (§4.5).

use crate::memory::session::{EscalationFlag, SessionState, TeamDecision};
use chrono::Utc;

/// Typed mutation surface over one turn's already-locked [`SessionState`],
/// handed to specialists instead of poking `shared` fields directly.
pub struct SessionTools<'a> {
    state: &'a mut SessionState,
}

impl<'a> SessionTools<'a> {
    pub fn new(state: &'a mut SessionState) -> Self {
        Self { state }
    }

    pub fn record_team_decision(&mut self, decision: impl Into<String>, reasoning: impl Into<String>) {
        self.state.shared.team_decisions.push(TeamDecision {
            decision: decision.into(),
            reasoning: reasoning.into(),
            at: Utc::now(),
        });
    }

    pub fn set_escalation_flag(&mut self, kind: impl Into<String>, details: impl Into<String>) {
        self.state.shared.escalation_flags.push(EscalationFlag {
            kind: kind.into(),
            details: details.into(),
            at: Utc::now(),
        });
    }

    /// Appends a free-text finding to the shared workspace. Last write for
    /// a given key wins within a turn by design — there is no merge logic,
    /// matching the append-then-read pattern specialists use (§4.5).
    pub fn update_customer_insight(&mut self, finding: impl Into<String>) {
        self.state.shared.research_findings.push(finding.into());
    }

    pub fn get_team_context(&self) -> TeamContextSnapshot {
        TeamContextSnapshot {
            research_findings: self.state.shared.research_findings.clone(),
            team_decisions: self.state.shared.team_decisions.clone(),
            escalation_flags: self.state.shared.escalation_flags.clone(),
            frustration_level: self.state.frustration_level.value(),
            current_topic: self.state.current_topic.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TeamContextSnapshot {
    pub research_findings: Vec<String>,
    pub team_decisions: Vec<TeamDecision>,
    pub escalation_flags: Vec<EscalationFlag>,
    pub frustration_level: u8,
    pub current_topic: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decisions_and_flags_accumulate_in_order() {
        let mut state = SessionState::new("s1", "c1");
        let mut tools = SessionTools::new(&mut state);

        tools.record_team_decision("encaminhar ao humano", "frustração alta");
        tools.set_escalation_flag("fraud_suspected", "cliente mencionou antecipação");
        tools.update_customer_insight("cliente prefere comunicação objetiva");

        let context = tools.get_team_context();
        assert_eq!(context.team_decisions.len(), 1);
        assert_eq!(context.escalation_flags.len(), 1);
        assert_eq!(context.research_findings.len(), 1);
    }

    #[test]
    fn last_writer_wins_is_just_last_append() {
        let mut state = SessionState::new("s1", "c1");
        let mut tools = SessionTools::new(&mut state);

        tools.update_customer_insight("primeira observação");
        tools.update_customer_insight("observação atualizada");

        let context = tools.get_team_context();
        assert_eq!(context.research_findings.last().unwrap(), "observação atualizada");
    }
}
