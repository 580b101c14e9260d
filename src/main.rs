//! reddit-harvest: builds a comment dataset from Reddit search results.

use anyhow::Context;
use clap::{Parser, Subcommand};
use harvest_core::{CancelSignal, CoreError, ErrorReporter, HarvestConfig};
use harvest_pipeline::{default_output_path, export_dataset, HarvestEvent, Harvester};
use reddit_client::RedditClient;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "reddit_harvest=info,harvest_pipeline=info,reddit_client=info";

#[derive(Parser, Debug)]
#[command(
    name = "reddit-harvest",
    version,
    about = "Collect Reddit posts and comment threads into a JSON dataset"
)]
struct Cli {
    /// TOML configuration file. Credentials may also come from REDDIT_* variables.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search, fetch comments and export the dataset
    Run {
        /// Search query, overrides the config file
        #[arg(short = 'Q', long)]
        query: Option<String>,
        #[arg(long)]
        subreddit: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Global comment budget
        #[arg(long)]
        budget: Option<usize>,
        #[arg(long)]
        max_pages: Option<usize>,
        /// Comments kept per post
        #[arg(long)]
        per_post: Option<usize>,
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Validate the configuration and print the fetch policy
    Validate,
    /// Check that the credentials yield an access token
    Auth,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet);

    let mut config =
        HarvestConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let reporter = ErrorReporter::new();

    match cli.command {
        Command::Run {
            query,
            subreddit,
            output,
            budget,
            max_pages,
            per_post,
            batch_size,
        } => {
            if let Some(query) = query {
                config.search.query = query;
            }
            if subreddit.is_some() {
                config.search.subreddit = subreddit;
            }
            if let Some(budget) = budget {
                config.comments.target_comment_budget = budget;
            }
            if let Some(max_pages) = max_pages {
                config.search.max_pages = max_pages;
            }
            if let Some(per_post) = per_post {
                config.comments.comments_per_post_cap = per_post;
            }
            if let Some(batch_size) = batch_size {
                config.schedule.batch_size = batch_size;
            }

            run_harvest(config, output).await.map_err(|e| {
                reporter.report_error(&e);
                anyhow::Error::new(e)
            })?;
        }
        Command::Validate => {
            config.validate().context("invalid configuration")?;
            println!("Configuration OK");
            println!("Policy: {}", config.strategy_tag());
        }
        Command::Auth => {
            let client = RedditClient::from_config(&config)?;
            let token = client.tokens().get_token().await.map_err(|e| {
                let e = CoreError::from(e);
                reporter.report_error(&e);
                anyhow::Error::new(e)
            })?;
            println!(
                "Authenticated; token usable for {:?}",
                token.expires_at().saturating_duration_since(std::time::Instant::now())
            );
        }
    }

    Ok(())
}

fn init_logging(quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_harvest(config: HarvestConfig, output: Option<PathBuf>) -> Result<(), CoreError> {
    let mut harvester = Harvester::new(config)?;
    let mut events = harvester.subscribe();

    let cancel = CancelSignal::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing with a partial dataset");
            on_interrupt.cancel();
        }
    });

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                HarvestEvent::PostsDiscovered { posts, pages } => {
                    tracing::info!("Discovered {} posts across {} pages", posts, pages)
                }
                HarvestEvent::BudgetExhausted { target } => {
                    tracing::info!("Comment budget of {} reached", target)
                }
                HarvestEvent::PhaseChanged { .. } | HarvestEvent::BatchCompleted { .. } => {}
            }
        }
    });

    let report = harvester.run(&cancel).await?;
    let metadata = report.dataset.metadata();
    let path = output.unwrap_or_else(|| default_output_path(&metadata.query, metadata.fetched_at));
    export_dataset(&report.dataset, &path)?;

    println!(
        "{} posts, {} comments ({}) -> {}",
        metadata.total_posts,
        metadata.total_comments,
        if report.dataset.is_partial() {
            "partial"
        } else {
            "complete"
        },
        path.display()
    );
    tracing::debug!(
        "API requests: {} ({} rate limited), token refreshes: {}",
        report.api_metrics.total_requests,
        report.api_metrics.rate_limited_requests,
        report.token_refreshes
    );
    Ok(())
}
