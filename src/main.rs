use clap::Parser;
use repo_grader::cli::{Cli, Commands};
use repo_grader::commands;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("repo_grader=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Run {
            pipeline,
            out,
            fetch_parallel,
            timeout_secs,
            eval_parallel,
            model,
        } => {
            commands::handle_run(
                pipeline,
                out,
                *fetch_parallel,
                *timeout_secs,
                *eval_parallel,
                model.as_deref(),
            )
            .await
        }
        Commands::Fetch {
            pipeline,
            parallel,
            timeout_secs,
        } => commands::handle_fetch(pipeline, *parallel, *timeout_secs).await,
        Commands::Evaluate {
            pipeline,
            parallel,
            model,
        } => commands::handle_evaluate(pipeline, *parallel, model.as_deref()).await,
        Commands::Aggregate { pipeline, out } => commands::handle_aggregate(pipeline, out).await,
        Commands::Status { pipeline } => commands::handle_status(pipeline).await,
        Commands::Clean {
            workdir,
            scores_only,
        } => commands::handle_clean(workdir, *scores_only),
    }
}
