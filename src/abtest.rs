//! A/B Test Manager (C9): sticky version assignment and significance
//! testing for agent-version experiments (§4.9).

use crate::error::{ABTestError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::RwLock;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum TestStatus {
    Draft,
    Running,
    Stopped,
}

/// One experiment arm: an agent version and its traffic weight.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Arm {
    pub version: i64,
    pub weight: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AbTest {
    pub test_id: String,
    pub agent_id: String,
    pub arms: Vec<Arm>,
    pub status: TestStatus,
    pub min_sample: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct ArmOutcomes {
    total: u64,
    success: u64,
    satisfaction_sum: f64,
    satisfaction_count: u64,
}

/// Per-arm aggregate plus the overall significance verdict (§4.9).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ArmSummary {
    pub version: i64,
    pub total: u64,
    pub success_rate: f64,
    pub avg_satisfaction: Option<f64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnalysisSummary {
    pub test_id: String,
    pub arms: Vec<ArmSummary>,
    pub significant: bool,
    pub winning_version: Option<i64>,
    pub should_promote: bool,
}

const PROMOTE_MIN_IMPROVEMENT: f64 = 0.05;
const Z_SIGNIFICANCE_THRESHOLD: f64 = 1.96;

struct TestRecord {
    test: AbTest,
    outcomes: HashMap<i64, ArmOutcomes>,
    assignments: HashMap<String, i64>,
}

pub struct AbTestManager {
    tests: Arc<RwLock<HashMap<String, TestRecord>>>,
}

impl Default for AbTestManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AbTestManager {
    pub fn new() -> Self {
        Self {
            tests: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn create_test(&self, test_id: &str, agent_id: &str, arms: Vec<Arm>, min_sample: u64) -> Result<AbTest> {
        let total_weight: i64 = arms.iter().map(|a| a.weight).sum();
        if total_weight != 100 {
            return Err(ABTestError::InvalidWeights(total_weight).into());
        }

        let test = AbTest {
            test_id: test_id.to_string(),
            agent_id: agent_id.to_string(),
            arms,
            status: TestStatus::Draft,
            min_sample,
            created_at: Utc::now(),
        };

        let mut tests = self.tests.write().await;
        tests.insert(
            test_id.to_string(),
            TestRecord {
                test: test.clone(),
                outcomes: HashMap::new(),
                assignments: HashMap::new(),
            },
        );
        Ok(test)
    }

    pub async fn start_test(&self, test_id: &str) -> Result<()> {
        let mut tests = self.tests.write().await;
        let record = tests.get_mut(test_id).ok_or_else(|| ABTestError::NotFound(test_id.to_string()))?;
        record.test.status = TestStatus::Running;
        Ok(())
    }

    /// Changing arm weights of a running test is disallowed (§4.9
    /// invariant — assignments already made must stay consistent).
    pub async fn update_weights(&self, test_id: &str, arms: Vec<Arm>) -> Result<()> {
        let total_weight: i64 = arms.iter().map(|a| a.weight).sum();
        if total_weight != 100 {
            return Err(ABTestError::InvalidWeights(total_weight).into());
        }

        let mut tests = self.tests.write().await;
        let record = tests.get_mut(test_id).ok_or_else(|| ABTestError::NotFound(test_id.to_string()))?;
        if record.test.status == TestStatus::Running {
            return Err(ABTestError::DistributionLocked.into());
        }
        record.test.arms = arms;
        Ok(())
    }

    /// Deterministic, sticky bucketing: the same `user_id` always lands in
    /// the same arm for a given test, computed from a stable hash rather
    /// than stored random state, and then cached so weight changes after
    /// the fact never reassign an existing user (§4.9).
    pub async fn assign(&self, test_id: &str, user_id: &str) -> Result<i64> {
        let mut tests = self.tests.write().await;
        let record = tests.get_mut(test_id).ok_or_else(|| ABTestError::NotFound(test_id.to_string()))?;

        if record.test.status != TestStatus::Running {
            return Err(ABTestError::NotRunning(test_id.to_string()).into());
        }

        if let Some(version) = record.assignments.get(user_id) {
            return Ok(*version);
        }

        let version = bucket(&record.test.arms, test_id, user_id);
        record.assignments.insert(user_id.to_string(), version);
        Ok(version)
    }

    pub async fn record(&self, test_id: &str, version: i64, success: bool, satisfaction: Option<f64>) -> Result<()> {
        let mut tests = self.tests.write().await;
        let record = tests.get_mut(test_id).ok_or_else(|| ABTestError::NotFound(test_id.to_string()))?;
        let outcomes = record.outcomes.entry(version).or_default();
        outcomes.total += 1;
        if success {
            outcomes.success += 1;
        }
        if let Some(score) = satisfaction {
            outcomes.satisfaction_sum += score;
            outcomes.satisfaction_count += 1;
        }
        Ok(())
    }

    /// Two-proportion z-test over success rate between the two best-sampled
    /// arms; promotion requires a statistically significant, >=5% absolute
    /// improvement with both arms past `min_sample` (§4.9).
    pub async fn analyze(&self, test_id: &str) -> Result<AnalysisSummary> {
        let tests = self.tests.read().await;
        let record = tests.get(test_id).ok_or_else(|| ABTestError::NotFound(test_id.to_string()))?;

        let mut arms: Vec<ArmSummary> = record
            .test
            .arms
            .iter()
            .map(|arm| {
                let outcomes = record.outcomes.get(&arm.version).cloned().unwrap_or_default();
                ArmSummary {
                    version: arm.version,
                    total: outcomes.total,
                    success_rate: if outcomes.total > 0 {
                        outcomes.success as f64 / outcomes.total as f64
                    } else {
                        0.0
                    },
                    avg_satisfaction: if outcomes.satisfaction_count > 0 {
                        Some(outcomes.satisfaction_sum / outcomes.satisfaction_count as f64)
                    } else {
                        None
                    },
                }
            })
            .collect();

        arms.sort_by(|a, b| b.success_rate.partial_cmp(&a.success_rate).unwrap_or(std::cmp::Ordering::Equal));

        let (significant, winning_version, should_promote) = if arms.len() >= 2 {
            let best = &arms[0];
            let rest = &arms[1];
            let z = two_proportion_z(best, rest);
            let improvement = best.success_rate - rest.success_rate;
            let enough_samples = best.total >= record.test.min_sample && rest.total >= record.test.min_sample;
            let significant = z.abs() >= Z_SIGNIFICANCE_THRESHOLD;
            let promote = significant && improvement >= PROMOTE_MIN_IMPROVEMENT && enough_samples;
            (significant, Some(best.version), promote)
        } else {
            (false, arms.first().map(|a| a.version), false)
        };

        Ok(AnalysisSummary {
            test_id: test_id.to_string(),
            arms,
            significant,
            winning_version,
            should_promote,
        })
    }
}

fn bucket(arms: &[Arm], test_id: &str, user_id: &str) -> i64 {
    let mut hasher = DefaultHasher::new();
    test_id.hash(&mut hasher);
    user_id.hash(&mut hasher);
    let bucket = (hasher.finish() % 100) as i64;

    let mut cumulative = 0;
    for arm in arms {
        cumulative += arm.weight;
        if bucket < cumulative {
            return arm.version;
        }
    }
    arms.last().map(|a| a.version).unwrap_or_default()
}

/// Two-proportion z-test statistic, computed directly with no external
/// stats dependency: `z = (p1 - p2) / sqrt(p_pool*(1-p_pool)*(1/n1+1/n2))`.
fn two_proportion_z(a: &ArmSummary, b: &ArmSummary) -> f64 {
    if a.total == 0 || b.total == 0 {
        return 0.0;
    }
    let n1 = a.total as f64;
    let n2 = b.total as f64;
    let p1 = a.success_rate;
    let p2 = b.success_rate;
    let pooled = (p1 * n1 + p2 * n2) / (n1 + n2);
    let denom = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        (p1 - p2) / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arms() -> Vec<Arm> {
        vec![Arm { version: 1, weight: 50 }, Arm { version: 2, weight: 50 }]
    }

    #[tokio::test]
    async fn weights_must_sum_to_100() {
        let manager = AbTestManager::new();
        let err = manager
            .create_test("t1", "pagbank-specialist", vec![Arm { version: 1, weight: 60 }], 10)
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn assignment_is_sticky_for_the_same_user() {
        let manager = AbTestManager::new();
        manager.create_test("t1", "pagbank-specialist", arms(), 10).await.unwrap();
        manager.start_test("t1").await.unwrap();

        let first = manager.assign("t1", "user-42").await.unwrap();
        let second = manager.assign("t1", "user-42").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn cannot_assign_before_test_starts() {
        let manager = AbTestManager::new();
        manager.create_test("t1", "pagbank-specialist", arms(), 10).await.unwrap();
        assert!(manager.assign("t1", "user-1").await.is_err());
    }

    #[tokio::test]
    async fn cannot_change_weights_of_running_test() {
        let manager = AbTestManager::new();
        manager.create_test("t1", "pagbank-specialist", arms(), 10).await.unwrap();
        manager.start_test("t1").await.unwrap();
        let err = manager.update_weights("t1", arms()).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn clear_improvement_with_enough_samples_is_promoted() {
        let manager = AbTestManager::new();
        manager.create_test("t1", "pagbank-specialist", arms(), 10).await.unwrap();
        manager.start_test("t1").await.unwrap();

        for _ in 0..100 {
            manager.record("t1", 1, true, Some(4.5)).await.unwrap();
        }
        for _ in 0..100 {
            manager.record("t1", 2, false, Some(2.0)).await.unwrap();
        }

        let analysis = manager.analyze("t1").await.unwrap();
        assert!(analysis.significant);
        assert!(analysis.should_promote);
        assert_eq!(analysis.winning_version, Some(1));
    }

    #[tokio::test]
    async fn insufficient_samples_block_promotion() {
        let manager = AbTestManager::new();
        manager.create_test("t1", "pagbank-specialist", arms(), 1000).await.unwrap();
        manager.start_test("t1").await.unwrap();

        manager.record("t1", 1, true, None).await.unwrap();
        manager.record("t1", 2, false, None).await.unwrap();

        let analysis = manager.analyze("t1").await.unwrap();
        assert!(!analysis.should_promote);
    }
}
