//! Persisted record types for the pipeline stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Validated score for one rubric criterion.
///
/// `score` is `None` when the scorer's response omitted the criterion or
/// returned something non-numeric or negative; a missing score is never
/// collapsed into `0.0`, which is a legitimate score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CriterionScore {
    pub score: Option<f64>,
    /// Declared maximum from the rubric, the authoritative bound.
    pub max: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// False when the criterion was missing, non-numeric or negative.
    pub valid: bool,
    /// The scorer exceeded the declared maximum and the score was clamped.
    #[serde(default)]
    pub exceeded_max: bool,
    /// Pre-clamp value, kept for audit when `exceeded_max` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_score: Option<f64>,
}

/// One persisted evaluation per submission identifier, immutable once
/// written. Invalid criteria are retained inside the record rather than
/// invalidating it wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub repo: String,
    pub model: String,
    /// Fingerprint of the rubric the record was scored against; a
    /// mismatch with the current rubric marks the artifact stale.
    pub rubric_fingerprint: String,
    pub evaluated_at: DateTime<Utc>,
    /// Criterion name to validated score, every declared criterion present.
    pub criteria: BTreeMap<String, CriterionScore>,
    /// Response keys outside the rubric, preserved verbatim; they may
    /// indicate rubric drift worth surfacing.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
    /// True when every declared criterion is present and in range.
    pub valid: bool,
}

impl ScoreRecord {
    /// Sum of the valid scores (post-clamping).
    pub fn total(&self) -> f64 {
        self.criteria
            .values()
            .filter_map(|c| if c.valid { c.score } else { None })
            .sum()
    }
}

/// Pipeline stage a per-submission failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Score,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Score => "score",
        }
    }
}

/// Recorded, non-fatal failure for one submission at one stage. Failures
/// never cross submission boundaries; they surface later as a
/// missing-content or missing-score aggregate row.
#[derive(Debug, Clone)]
pub struct StageFailure {
    pub repo: String,
    pub stage: Stage,
    pub error: String,
}
