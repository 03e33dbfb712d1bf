//! Aggregation: one output row per input submission, always.
//!
//! The aggregate joins by identifier, not by position or completion
//! order, and never drops a row. A submission that failed at any stage
//! appears with explicit missing markers and a status naming the failing
//! stage. Rows sharing metadata are not merged; deduplication is a
//! reporting-layer concern.

use crate::records::ScoreRecord;
use crate::rubric::Rubric;
use crate::store::WorkStore;
use crate::submission::Roster;
use anyhow::{Context, Result};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Ok,
    InvalidSource,
    FetchFailed,
    ScoreFailed,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Ok => "ok",
            RowStatus::InvalidSource => "invalid_source",
            RowStatus::FetchFailed => "fetch_failed",
            RowStatus::ScoreFailed => "score_failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregateRow {
    /// Input position; rows are emitted in this order.
    pub index: usize,
    pub repo: Option<String>,
    /// Per-criterion scores in rubric order; `None` is an explicit
    /// missing marker, never conflated with a scored `0.0`.
    pub scores: Vec<Option<f64>>,
    /// Sum of the valid scores; `None` when no score record exists.
    pub total: Option<f64>,
    /// True only when every criterion in the record came back valid and
    /// in range.
    pub complete: bool,
    pub status: RowStatus,
}

fn row_for_record(index: usize, repo: String, rubric: &Rubric, record: &ScoreRecord) -> AggregateRow {
    let scores = rubric
        .criteria
        .iter()
        .map(|c| {
            record
                .criteria
                .get(&c.name)
                .filter(|cs| cs.valid)
                .and_then(|cs| cs.score)
        })
        .collect();
    AggregateRow {
        index,
        repo: Some(repo),
        scores,
        total: Some(record.total()),
        complete: record.valid,
        status: RowStatus::Ok,
    }
}

fn missing_row(index: usize, repo: Option<String>, rubric: &Rubric, status: RowStatus) -> AggregateRow {
    AggregateRow {
        index,
        repo,
        scores: vec![None; rubric.criteria.len()],
        total: None,
        complete: false,
        status,
    }
}

/// Join submissions with whatever artifacts exist. Invariant: the result
/// has exactly one row per input submission, in input order, regardless
/// of upstream failures.
pub fn aggregate(roster: &Roster, rubric: &Rubric, store: &WorkStore) -> Vec<AggregateRow> {
    roster
        .submissions
        .iter()
        .map(|sub| {
            let Some(repo) = &sub.repo else {
                return missing_row(sub.index, None, rubric, RowStatus::InvalidSource);
            };
            let key = repo.key();
            if !store.has_content(&key) {
                return missing_row(sub.index, Some(key), rubric, RowStatus::FetchFailed);
            }
            match store.read_score(&key) {
                Some(record) => row_for_record(sub.index, key, rubric, &record),
                None => missing_row(sub.index, Some(key), rubric, RowStatus::ScoreFailed),
            }
        })
        .collect()
}

/// Write the aggregate CSV: passthrough columns first, then `repo`, one
/// column per criterion, `total`, `complete` and `status`. Missing scores
/// are empty cells.
pub fn write_csv(
    path: &Path,
    roster: &Roster,
    rubric: &Rubric,
    rows: &[AggregateRow],
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    let mut header: Vec<String> = roster.headers.clone();
    header.push("repo".to_string());
    for c in &rubric.criteria {
        header.push(c.name.clone());
    }
    header.push("total".to_string());
    header.push("complete".to_string());
    header.push("status".to_string());
    writer.write_record(&header)?;

    for row in rows {
        let sub = &roster.submissions[row.index];
        let mut cells: Vec<String> = sub.values.clone();
        cells.push(row.repo.clone().unwrap_or_default());
        for score in &row.scores {
            cells.push(score.map(|s| s.to_string()).unwrap_or_default());
        }
        cells.push(row.total.map(|t| t.to_string()).unwrap_or_default());
        cells.push(row.complete.to_string());
        cells.push(row.status.as_str().to_string());
        writer.write_record(&cells)?;
    }

    writer.flush()?;
    Ok(())
}
