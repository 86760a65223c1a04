//! Rhizome CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "rhizome")]
#[command(about = "Code knowledge graphs with documentation and provenance", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Repository root path (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Graph backend: memory or neo4j
    #[arg(long, default_value = "memory")]
    store: String,

    /// Tenancy: repository identifier
    #[arg(long, default_value = "default_repo")]
    repo_id: String,

    /// Tenancy: entity identifier
    #[arg(long, default_value = "default_user")]
    entity_id: String,

    /// Logical environment prefix for node paths
    #[arg(long, default_value = "main")]
    environment: String,

    /// Diff overlay tag; "0" is the base graph
    #[arg(long, default_value = "0")]
    diff_identifier: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the repository and persist its folder/file skeleton
    Ingest,
    /// Generate documentation recursively from a root node
    Describe {
        /// Node id to start from
        #[arg(long)]
        node_id: String,

        /// Maximum parallel LLM calls
        #[arg(long, default_value = "5")]
        concurrency: usize,
    },
    /// Generate documentation with the store-driven batch scheduler
    DescribeBatch {
        /// Nodes claimed per wavefront round
        #[arg(long, default_value = "50")]
        batch_size: usize,
    },
    /// Attach commit and PR provenance to stored code nodes
    Blame {
        /// GitHub repository owner
        #[arg(long)]
        owner: String,

        /// GitHub repository name
        #[arg(long)]
        repo: String,

        /// Ref to blame at: branch, tag, or commit SHA
        #[arg(long, default_value = "HEAD")]
        reference: String,

        /// Node ids to resolve provenance for
        #[arg(long = "node-id", required = true)]
        node_ids: Vec<String>,
    },
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("rhizome={}", log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Rhizome v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Repository root: {}", cli.root.display());

    let context = commands::Context {
        root: cli.root,
        store: cli.store,
        repo_id: cli.repo_id,
        entity_id: cli.entity_id,
        environment: cli.environment,
        diff_identifier: cli.diff_identifier,
    };

    match cli.command {
        Commands::Ingest => commands::ingest(context).await,
        Commands::Describe {
            node_id,
            concurrency,
        } => commands::describe(context, node_id, concurrency).await,
        Commands::DescribeBatch { batch_size } => {
            commands::describe_batch(context, batch_size).await
        }
        Commands::Blame {
            owner,
            repo,
            reference,
            node_ids,
        } => commands::blame(context, owner, repo, reference, node_ids).await,
        Commands::Version => {
            println!("Rhizome v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
