use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Signal;

/// Score used whenever the external scorer is unavailable or misbehaves.
pub const NEUTRAL_SCORE: u8 = 50;

/// Outcome of scoring one signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub score: u8,
    pub reasoning: String,
    /// True when `score` is the neutral fallback rather than a real answer.
    pub fallback: bool,
}

impl ScoreResult {
    pub fn neutral(reason: impl Into<String>) -> Self {
        Self {
            score: NEUTRAL_SCORE,
            reasoning: reason.into(),
            fallback: true,
        }
    }
}

/// Abstraction over the external probabilistic scorer.
///
/// Implementations never fail: every error path resolves to
/// [`ScoreResult::neutral`], so a slow or broken scorer cannot stall the
/// pipeline beyond its own timeout.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, signal: &Signal) -> ScoreResult;
}

/// Scorer used when no credentials are configured.
pub struct NeutralScorer;

#[async_trait]
impl Scorer for NeutralScorer {
    async fn score(&self, _signal: &Signal) -> ScoreResult {
        ScoreResult::neutral("scorer not configured")
    }
}
