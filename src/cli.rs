use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Path to the submissions roster CSV
    #[arg(long)]
    pub roster: PathBuf,

    /// Roster column holding repository URLs (overrides config)
    #[arg(long)]
    pub column: Option<String>,

    /// Path to the rubric TOML
    #[arg(long, default_value = "rubric.toml")]
    pub rubric: PathBuf,

    /// Directory for cached artifacts and failure logs
    #[arg(long, default_value = "./work")]
    pub workdir: PathBuf,

    /// Optional config file (defaults to ./repo-grader.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline: fetch, evaluate, aggregate
    Run {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Path to write the aggregated scores CSV
        #[arg(long, default_value = "scores.csv")]
        out: PathBuf,

        /// Maximum concurrent fetches (overrides config)
        #[arg(long)]
        fetch_parallel: Option<usize>,

        /// Per-fetch timeout in seconds (overrides config)
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Maximum concurrent scorer calls (overrides config)
        #[arg(long)]
        eval_parallel: Option<usize>,

        /// Scorer model (overrides config)
        #[arg(long)]
        model: Option<String>,
    },
    /// Fetch repository contents only
    Fetch {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Maximum concurrent fetches (overrides config)
        #[arg(long)]
        parallel: Option<usize>,

        /// Per-fetch timeout in seconds (overrides config)
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Score already-fetched submissions only
    Evaluate {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Maximum concurrent scorer calls (overrides config)
        #[arg(long)]
        parallel: Option<usize>,

        /// Scorer model (overrides config)
        #[arg(long)]
        model: Option<String>,
    },
    /// Aggregate whatever artifacts exist into the scores CSV
    Aggregate {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Path to write the aggregated scores CSV
        #[arg(long, default_value = "scores.csv")]
        out: PathBuf,
    },
    /// Show cache inventory and stale-rubric warnings
    Status {
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    /// Remove cached artifacts
    Clean {
        /// Directory for cached artifacts and failure logs
        #[arg(long, default_value = "./work")]
        workdir: PathBuf,

        /// Keep raw content, remove only score artifacts
        #[arg(long)]
        scores_only: bool,
    },
}
