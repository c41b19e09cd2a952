//! Protocol number generation (§4.7, §8 invariant 8): `PGB-`, `TECH-` and
//! `FRAUDE-` prefixed identifiers, unique within a 24h window with
//! overwhelming probability.

use chrono::{DateTime, Utc};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolKind {
    /// Human handoff / general service protocol.
    Standard,
    /// Technical Escalation ticket.
    Technical,
    /// Fraud alert ticket.
    Fraud,
}

impl ProtocolKind {
    fn prefix(self) -> &'static str {
        match self {
            ProtocolKind::Standard => "PGB",
            ProtocolKind::Technical => "TECH",
            ProtocolKind::Fraud => "FRAUDE",
        }
    }
}

/// `{PREFIX}-{YYYYMMDDHHMMSS}-{4 hex digits}`. The suffix is derived from a
/// session-scoped random tag hashed together with the timestamp, so two
/// protocols minted in the same second for different sessions still
/// diverge.
pub fn generate(kind: ProtocolKind, at: DateTime<Utc>) -> String {
    generate_with_seed(kind, at, &Uuid::new_v4().to_string())
}

/// Seeded variant for deterministic tests.
pub fn generate_with_seed(kind: ProtocolKind, at: DateTime<Utc>, seed: &str) -> String {
    let timestamp = at.format("%Y%m%d%H%M%S").to_string();

    let mut hasher = DefaultHasher::new();
    timestamp.hash(&mut hasher);
    seed.hash(&mut hasher);
    let hash = hasher.finish();
    let suffix = format!("{:04X}", (hash & 0xFFFF) as u16);

    format!("{}-{}-{}", kind.prefix(), timestamp, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    #[test]
    fn standard_protocol_has_expected_prefix_and_shape() {
        let at = Utc.with_ymd_and_hms(2026, 8, 1, 12, 30, 0).unwrap();
        let protocol = generate_with_seed(ProtocolKind::Standard, at, "session-1");
        assert!(protocol.starts_with("PGB-20260801123000-"));
        assert_eq!(protocol.len(), "PGB-20260801123000-XXXX".len());
    }

    #[test]
    fn technical_and_fraud_prefixes_differ() {
        let at = Utc::now();
        assert!(generate_with_seed(ProtocolKind::Technical, at, "s").starts_with("TECH-"));
        assert!(generate_with_seed(ProtocolKind::Fraud, at, "s").starts_with("FRAUDE-"));
    }

    #[test]
    fn distinct_seeds_are_unique_across_a_simulated_day() {
        let base = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        let mut seen = HashSet::new();
        for second in 0..86_400i64 {
            let at = base + chrono::Duration::seconds(second);
            let protocol = generate_with_seed(ProtocolKind::Standard, at, &format!("session-{second}"));
            assert!(seen.insert(protocol), "duplicate protocol generated");
        }
    }
}
