//! Command handlers: wire the config, rubric, roster and store together
//! and drive the pipeline stages.

use crate::aggregate;
use crate::cli::PipelineArgs;
use crate::config::Config;
use crate::evaluate::{self, EvalOptions};
use crate::fetch::{self, FetchOptions};
use crate::output;
use crate::records::Stage;
use crate::rubric::{load_rubric, Rubric};
use crate::scorer::{OpenAiScorer, Scorer};
use crate::source::{ContentSource, GitingestSource};
use crate::store::WorkStore;
use crate::submission::{load_roster, Roster};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug)]
struct PipelineContext {
    config: Config,
    rubric: Rubric,
    roster: Roster,
    store: WorkStore,
}

/// Fatal pre-flight: the rubric and roster must be loadable before any
/// external work starts.
fn prepare(args: &PipelineArgs) -> Result<PipelineContext> {
    let config = Config::load_or_default(args.config.as_deref())?;
    let rubric = load_rubric(&args.rubric)?;
    let url_column = args
        .column
        .clone()
        .unwrap_or_else(|| config.input.url_column.clone());
    let roster = load_roster(&args.roster, &url_column)?;
    let store = WorkStore::new(&args.workdir)?;
    Ok(PipelineContext {
        config,
        rubric,
        roster,
        store,
    })
}

fn content_source(config: &Config) -> Arc<dyn ContentSource> {
    Arc::new(GitingestSource::new(
        &config.fetch.command,
        &config.fetch.args,
    ))
}

fn build_scorer(config: &Config, model: Option<&str>) -> Result<Arc<dyn Scorer>> {
    let api_key = OpenAiScorer::api_key_from_env()?;
    Ok(Arc::new(OpenAiScorer::new(
        &config.scorer.api_base,
        &api_key,
        model.unwrap_or(&config.scorer.model),
        config.scorer.timeout_secs,
    )?))
}

/// Identifiers that have content and therefore qualify for evaluation,
/// restricted to the roster so foreign artifacts in a shared workdir are
/// ignored.
fn evaluable_ids(roster: &Roster, store: &WorkStore) -> Vec<String> {
    roster
        .unique_repos()
        .iter()
        .map(|r| r.key())
        .filter(|id| store.has_content(id))
        .collect()
}

pub async fn handle_run(
    args: &PipelineArgs,
    out: &Path,
    fetch_parallel: Option<usize>,
    timeout_secs: Option<u64>,
    eval_parallel: Option<usize>,
    model: Option<&str>,
) -> Result<()> {
    let ctx = prepare(args)?;
    // The scorer key is resolved up front so a missing key aborts before
    // hours of fetching, not after.
    let scorer = build_scorer(&ctx.config, model)?;

    let fetch_opts = FetchOptions {
        parallel: fetch_parallel.unwrap_or(ctx.config.fetch.parallel),
        timeout_secs: timeout_secs.unwrap_or(ctx.config.fetch.timeout_secs),
    };
    let fetch_report =
        fetch::run_fetch(&ctx.roster, content_source(&ctx.config), &ctx.store, &fetch_opts).await?;
    output::print_fetch_summary(&fetch_report);

    let eval_opts = EvalOptions {
        parallel: eval_parallel.unwrap_or(ctx.config.scorer.parallel),
    };
    let ids = evaluable_ids(&ctx.roster, &ctx.store);
    let eval_report =
        evaluate::run_evaluate(&ids, &ctx.rubric, scorer, &ctx.store, &eval_opts).await?;
    output::print_eval_summary(&eval_report);

    let rows = aggregate::aggregate(&ctx.roster, &ctx.rubric, &ctx.store);
    aggregate::write_csv(out, &ctx.roster, &ctx.rubric, &rows)?;
    output::print_aggregate_summary(&rows);
    println!("\nScores written to: {}", out.display());
    Ok(())
}

pub async fn handle_fetch(
    args: &PipelineArgs,
    parallel: Option<usize>,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let ctx = prepare(args)?;
    let opts = FetchOptions {
        parallel: parallel.unwrap_or(ctx.config.fetch.parallel),
        timeout_secs: timeout_secs.unwrap_or(ctx.config.fetch.timeout_secs),
    };
    let report =
        fetch::run_fetch(&ctx.roster, content_source(&ctx.config), &ctx.store, &opts).await?;
    output::print_fetch_summary(&report);
    Ok(())
}

pub async fn handle_evaluate(
    args: &PipelineArgs,
    parallel: Option<usize>,
    model: Option<&str>,
) -> Result<()> {
    let ctx = prepare(args)?;
    let scorer = build_scorer(&ctx.config, model)?;
    let opts = EvalOptions {
        parallel: parallel.unwrap_or(ctx.config.scorer.parallel),
    };
    let ids = evaluable_ids(&ctx.roster, &ctx.store);
    let report = evaluate::run_evaluate(&ids, &ctx.rubric, scorer, &ctx.store, &opts).await?;
    output::print_eval_summary(&report);
    Ok(())
}

pub async fn handle_aggregate(args: &PipelineArgs, out: &Path) -> Result<()> {
    let ctx = prepare(args)?;
    let rows = aggregate::aggregate(&ctx.roster, &ctx.rubric, &ctx.store);
    aggregate::write_csv(out, &ctx.roster, &ctx.rubric, &rows)?;
    output::print_aggregate_summary(&rows);
    println!("\nScores written to: {}", out.display());
    Ok(())
}

pub async fn handle_status(args: &PipelineArgs) -> Result<()> {
    let ctx = prepare(args)?;
    let repos = ctx.roster.unique_repos();
    let fetched = repos.iter().filter(|r| ctx.store.has_content(&r.key())).count();
    let scored = repos.iter().filter(|r| ctx.store.has_score(&r.key())).count();
    let invalid = ctx
        .roster
        .submissions
        .iter()
        .filter(|s| s.repo.is_none())
        .count();

    println!("Submissions: {} ({} unique repos)", ctx.roster.submissions.len(), repos.len());
    println!("Invalid source: {}", invalid);
    println!("Fetched: {}/{}", fetched, repos.len());
    println!("Scored: {}/{}", scored, repos.len());

    let fetch_failures = ctx.store.failed_ids(Stage::Fetch);
    if !fetch_failures.is_empty() {
        println!("Fetch failures ({}):", fetch_failures.len());
        for id in &fetch_failures {
            println!("  {}", id);
        }
    }
    let score_failures = ctx.store.failed_ids(Stage::Score);
    if !score_failures.is_empty() {
        println!("Score failures ({}):", score_failures.len());
        for id in &score_failures {
            println!("  {}", id);
        }
    }

    let stale: Vec<String> = repos
        .iter()
        .filter_map(|r| ctx.store.read_score(&r.key()))
        .filter(|rec| rec.rubric_fingerprint != ctx.rubric.fingerprint)
        .map(|rec| rec.repo)
        .collect();
    if !stale.is_empty() {
        println!(
            "Warning: {} score artifact(s) were produced by a different rubric:",
            stale.len()
        );
        for id in &stale {
            println!("  {}", id);
        }
        println!("Run 'repo-grader clean --scores-only' to re-score them.");
    }
    Ok(())
}

pub fn handle_clean(workdir: &PathBuf, scores_only: bool) -> Result<()> {
    let store = WorkStore::new(workdir)?;
    store.clear(scores_only)?;
    if scores_only {
        println!("Cleared score artifacts, kept raw content");
    } else {
        println!("Cleared all artifacts");
    }
    Ok(())
}
