//! Evaluation stage: rubric-constrained scoring with defensive validation.
//!
//! The scorer is an untrusted, occasionally-erroneous component, so its
//! response is validated field by field: every field is optional until
//! proven present and type-correct. An out-of-range score is corrected by
//! clamping and flagged rather than discarded; a missing or malformed
//! score becomes a `missing` marker for that criterion only. A transport
//! or envelope failure produces a score failure for that submission
//! without touching the rest of the batch.

use crate::records::{CriterionScore, ScoreRecord, Stage, StageFailure};
use crate::rubric::Rubric;
use crate::scorer::Scorer;
use crate::store::WorkStore;
use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct EvalOptions {
    /// Maximum scorer calls in flight at once.
    pub parallel: usize,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self { parallel: 4 }
    }
}

#[derive(Debug, Default)]
pub struct EvalReport {
    /// Identifiers scored by this run.
    pub scored: Vec<String>,
    /// Identifiers skipped because a score artifact already existed.
    pub cached: Vec<String>,
    pub failures: Vec<StageFailure>,
}

/// Turn the scorer's raw response document into a validated record.
///
/// Every declared criterion ends up in the record: valid with a score in
/// range, clamped-and-flagged when over the maximum, or a missing marker.
/// Keys outside the rubric are carried verbatim in `extra`.
pub fn validate_response(
    rubric: &Rubric,
    document: &serde_json::Value,
    repo: &str,
    model: &str,
) -> ScoreRecord {
    let empty = serde_json::Map::new();
    let object = document.as_object().unwrap_or(&empty);

    let mut criteria = BTreeMap::new();
    let mut all_valid = true;

    for c in &rubric.criteria {
        let entry = object.get(&c.name);
        let score = entry
            .and_then(|e| e.get("score"))
            .and_then(|s| s.as_f64())
            .filter(|s| s.is_finite());
        let reason = entry
            .and_then(|e| e.get("reason"))
            .and_then(|r| r.as_str())
            .map(|r| r.to_string());

        let validated = match score {
            None => CriterionScore {
                score: None,
                max: c.max,
                reason,
                valid: false,
                exceeded_max: false,
                raw_score: None,
            },
            Some(s) if s < 0.0 => CriterionScore {
                // negative is treated identically to missing
                score: None,
                max: c.max,
                reason,
                valid: false,
                exceeded_max: false,
                raw_score: Some(s),
            },
            Some(s) if s > c.max => CriterionScore {
                score: Some(c.max),
                max: c.max,
                reason,
                valid: true,
                exceeded_max: true,
                raw_score: Some(s),
            },
            Some(s) => CriterionScore {
                score: Some(s),
                max: c.max,
                reason,
                valid: true,
                exceeded_max: false,
                raw_score: None,
            },
        };
        // A clamp keeps the criterion usable but taints the record.
        all_valid = all_valid && validated.valid && !validated.exceeded_max;
        criteria.insert(c.name.clone(), validated);
    }

    let extra: serde_json::Map<String, serde_json::Value> = object
        .iter()
        .filter(|(name, _)| rubric.criterion(name).is_none())
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    ScoreRecord {
        repo: repo.to_string(),
        model: model.to_string(),
        rubric_fingerprint: rubric.fingerprint.clone(),
        evaluated_at: chrono::Utc::now(),
        criteria,
        extra,
        valid: all_valid,
    }
}

/// Score every fetched identifier that has no score artifact yet, with a
/// bounded pool. Mirrors the fetch stage: workers only make the external
/// call; artifact and failure-log writes happen in the driver loop.
pub async fn run_evaluate(
    ids: &[String],
    rubric: &Rubric,
    scorer: Arc<dyn Scorer>,
    store: &WorkStore,
    opts: &EvalOptions,
) -> Result<EvalReport> {
    let mut report = EvalReport::default();

    let rubric = Arc::new(rubric.clone());
    let sem = Arc::new(Semaphore::new(opts.parallel.max(1)));
    let mut join_set: JoinSet<(String, Result<ScoreRecord, String>)> = JoinSet::new();

    let mut pending = 0usize;
    for id in ids {
        if store.has_score(id) {
            report.cached.push(id.clone());
            continue;
        }
        let content = match store.read_content(id) {
            Ok(content) => content,
            Err(e) => {
                // evaluated without content only via direct CLI use; skip
                warn!(repo = %id, error = %format!("{:#}", e), "no content artifact, skipping");
                continue;
            }
        };

        let permit = sem.clone().acquire_owned().await?;
        let scorer = scorer.clone();
        let rubric = rubric.clone();
        let id = id.clone();
        pending += 1;
        join_set.spawn(async move {
            let _permit = permit;
            let result = match scorer.score(&rubric, &content).await {
                Ok(document) => Ok(validate_response(
                    &rubric,
                    &document,
                    &id,
                    scorer.model(),
                )),
                Err(e) => Err(format!("{:#}", e)),
            };
            (id, result)
        });
    }

    let mut done = 0usize;
    while let Some(joined) = join_set.join_next().await {
        let (id, result) = joined?;
        done += 1;
        match result {
            Ok(record) => {
                store.put_score(&id, &record)?;
                store.clear_failure(Stage::Score, &id)?;
                info!(repo = %id, done, total = pending, valid = record.valid, "scored");
                report.scored.push(id);
            }
            Err(error) => {
                store.record_failure(Stage::Score, &id, &error)?;
                warn!(repo = %id, %error, "scoring failed");
                report.failures.push(StageFailure {
                    repo: id,
                    stage: Stage::Score,
                    error,
                });
            }
        }
    }

    report.scored.sort();
    Ok(report)
}
