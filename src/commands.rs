//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;

use rhizome_ai::providers::create_provider;
use rhizome_ai::{FallbackClient, LlmClient, StaticClient, TemplateRegistry};
use rhizome_core::{CodeNodeDescriptor, GraphEnvironment, NodeLabel, Tenancy, walk_repository};
use rhizome_docs::{
    BatchConfig, BatchScheduler, DescriberConfig, RecursiveDescriber, persist_documentation,
};
use rhizome_store::{GraphStore, MemoryStore, Neo4jConfig, Neo4jStore};
use rhizome_vcs::{BlameResolver, GitHubClient, VersionControl, integration_batch};

pub struct Context {
    pub root: PathBuf,
    pub store: String,
    pub repo_id: String,
    pub entity_id: String,
    pub environment: String,
    pub diff_identifier: String,
}

impl Context {
    fn tenancy(&self) -> Tenancy {
        Tenancy::new(self.repo_id.clone(), self.entity_id.clone())
    }

    fn graph_environment(&self) -> GraphEnvironment {
        GraphEnvironment::new(
            self.environment.clone(),
            self.diff_identifier.clone(),
            self.root.to_string_lossy(),
        )
    }

    async fn open_store(&self) -> anyhow::Result<Arc<dyn GraphStore>> {
        match self.store.as_str() {
            "memory" => Ok(Arc::new(MemoryStore::new(self.tenancy()))),
            "neo4j" => {
                let config = Neo4jConfig {
                    uri: std::env::var("NEO4J_URI").context("NEO4J_URI is not set")?,
                    user: std::env::var("NEO4J_USERNAME").context("NEO4J_USERNAME is not set")?,
                    password: std::env::var("NEO4J_PASSWORD").context("NEO4J_PASSWORD is not set")?,
                };
                let store = Neo4jStore::connect(&config, self.tenancy()).await?;
                Ok(Arc::new(store))
            }
            other => anyhow::bail!("unknown store backend: {other}"),
        }
    }
}

/// Provider chain from the environment: Anthropic first, OpenAI as the
/// fallback, a deterministic stub when no key is configured.
fn llm_from_env() -> anyhow::Result<Arc<dyn LlmClient>> {
    let anthropic = std::env::var("ANTHROPIC_API_KEY").ok();
    let openai = std::env::var("OPENAI_API_KEY").ok();

    match (anthropic, openai) {
        (Some(primary), Some(secondary)) => Ok(Arc::new(FallbackClient::new(
            create_provider("anthropic", Some(primary))?,
            create_provider("openai", Some(secondary))?,
        ))),
        (Some(key), None) => Ok(create_provider("anthropic", Some(key))?),
        (None, Some(key)) => Ok(create_provider("openai", Some(key))?),
        (None, None) => {
            tracing::warn!("no provider API key configured, using static descriptions");
            Ok(Arc::new(StaticClient::new(
                "No description generated: no LLM provider configured.",
            )))
        }
    }
}

pub async fn ingest(context: Context) -> anyhow::Result<()> {
    let store = context.open_store().await?;
    let layout = walk_repository(
        &context.root,
        &context.graph_environment(),
        &context.tenancy(),
    )?;

    tracing::info!(
        nodes = layout.nodes.len(),
        edges = layout.edges.len(),
        "ingesting repository layout"
    );
    store.upsert_nodes(&layout.nodes).await?;
    store.upsert_edges(&layout.edges).await?;

    Ok(())
}

pub async fn describe(context: Context, node_id: String, concurrency: usize) -> anyhow::Result<()> {
    let store = context.open_store().await?;
    let llm = llm_from_env()?;

    let describer = RecursiveDescriber::new(
        store.clone(),
        llm,
        TemplateRegistry::default(),
        DescriberConfig {
            max_concurrent_llm_calls: concurrency,
            ..DescriberConfig::default()
        },
    );

    let run = describer.describe(&node_id).await?;
    tracing::info!(
        described = run.descriptions.len(),
        llm_calls = run.stats.llm_calls,
        fallbacks = run.stats.fallbacks,
        stubs = run.stats.stubs,
        "documentation run finished"
    );

    persist_documentation(
        store.as_ref(),
        &context.tenancy(),
        &context.diff_identifier,
        &run.descriptions,
    )
    .await?;
    Ok(())
}

pub async fn describe_batch(context: Context, batch_size: usize) -> anyhow::Result<()> {
    let store = context.open_store().await?;
    let llm = llm_from_env()?;

    let scheduler = BatchScheduler::new(
        store,
        llm,
        TemplateRegistry::default(),
        context.tenancy(),
        context.diff_identifier.clone(),
        BatchConfig {
            batch_size,
            ..BatchConfig::default()
        },
    );

    let report = scheduler.run().await?;
    tracing::info!(
        run_id = %report.run_id,
        described = report.described,
        leaf_rounds = report.leaf_rounds,
        parent_rounds = report.parent_rounds,
        pending = report.pending_at_exit,
        "batch run finished"
    );
    Ok(())
}

pub async fn blame(
    context: Context,
    owner: String,
    repo: String,
    reference: String,
    node_ids: Vec<String>,
) -> anyhow::Result<()> {
    let store = context.open_store().await?;
    let github = GitHubClient::new(std::env::var("GITHUB_TOKEN").ok(), owner, repo, reference);

    // Project the requested nodes into blame descriptors.
    let mut descriptors = Vec::with_capacity(node_ids.len());
    for node_id in &node_ids {
        let Some(content) = store.node_content(node_id).await? else {
            tracing::warn!(node_id, "node not found, skipping");
            continue;
        };
        let label = content
            .labels
            .first()
            .and_then(|l| NodeLabel::parse(l))
            .unwrap_or(NodeLabel::File);
        descriptors.push(CodeNodeDescriptor::new(
            content.id,
            content.name,
            label,
            content.path,
            content.start_line.unwrap_or(1),
            content.end_line.unwrap_or(1),
        ));
    }

    let resolver = BlameResolver::new(Some(github.repo_name().to_string()));
    let provenance = resolver.resolve(&descriptors, &github).await;

    // Persist the PR -> commit trees behind the blamed commits.
    let env = context.graph_environment();
    let tenancy = context.tenancy();
    let prs = github.fetch_pull_requests(50, None).await?;
    for pr in &prs {
        let commits = github
            .fetch_commits(rhizome_vcs::CommitScope::PullRequest(pr.number), None, 100)
            .await?;
        let (nodes, edges) = integration_batch(pr, &commits, &env, &tenancy);
        store.upsert_nodes(&nodes).await?;
        store.upsert_edges(&edges).await?;
    }

    for (node_id, commits) in &provenance {
        tracing::info!(
            node_id = %node_id,
            commits = commits.len(),
            "resolved provenance for node"
        );
    }
    Ok(())
}
