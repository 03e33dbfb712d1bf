//! Human-readable summaries printed at the end of each stage.

use crate::aggregate::{AggregateRow, RowStatus};
use crate::evaluate::EvalReport;
use crate::fetch::FetchReport;

pub fn print_fetch_summary(report: &FetchReport) {
    println!("\n--- Fetch Summary ---");
    println!("Fetched: {}", report.fetched.len());
    println!("Cached: {}", report.cached.len());
    println!("Invalid source: {}", report.invalid_source);
    println!("Failed: {}", report.failures.len());
    for failure in &report.failures {
        println!("  {} - {}", failure.repo, first_line(&failure.error));
    }
}

pub fn print_eval_summary(report: &EvalReport) {
    println!("\n--- Evaluation Summary ---");
    println!("Scored: {}", report.scored.len());
    println!("Cached: {}", report.cached.len());
    println!("Failed: {}", report.failures.len());
    for failure in &report.failures {
        println!("  {} - {}", failure.repo, first_line(&failure.error));
    }
}

pub fn print_aggregate_summary(rows: &[AggregateRow]) {
    let count = |status: RowStatus| rows.iter().filter(|r| r.status == status).count();
    let complete = rows.iter().filter(|r| r.complete).count();

    println!("\n--- Aggregate Summary ---");
    println!("Rows: {}", rows.len());
    println!("Scored: {} ({} complete)", count(RowStatus::Ok), complete);
    println!("Invalid source: {}", count(RowStatus::InvalidSource));
    println!("Fetch failed: {}", count(RowStatus::FetchFailed));
    println!("Score failed: {}", count(RowStatus::ScoreFailed));
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("")
}
