//! Store-driven documentation scheduler
//!
//! Instead of holding traversal state in memory, the scheduler stamps
//! run-scoped status columns on the stored nodes and advances a
//! leaf-first wavefront: claim, describe, complete, repeat.

use std::sync::Arc;

use uuid::Uuid;

use rhizome_ai::{LlmClient, TemplateRegistry, TemplateVars, generate, templates};
use rhizome_core::Tenancy;
use rhizome_store::{ChildDescription, GraphStore, NodeContent, ReadyNode};

use crate::error::DocsError;
use crate::persist::persist_documentation;
use crate::types::NodeDescription;

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub batch_size: usize,
    /// Safety valve against a wavefront that stops advancing (cyclic
    /// call graphs leave nodes that never become ready).
    pub max_rounds: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            batch_size: 50,
            max_rounds: 10_000,
        }
    }
}

/// What a run did, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchRunReport {
    pub run_id: String,
    pub leaf_rounds: u64,
    pub parent_rounds: u64,
    pub described: u64,
    pub stubs: u64,
    /// Nodes still pending when the run stopped; non-zero means the
    /// wavefront could not reach them.
    pub pending_at_exit: u64,
}

pub struct BatchScheduler {
    store: Arc<dyn GraphStore>,
    llm: Arc<dyn LlmClient>,
    registry: TemplateRegistry,
    tenancy: Tenancy,
    diff_identifier: String,
    config: BatchConfig,
}

impl BatchScheduler {
    pub fn new(
        store: Arc<dyn GraphStore>,
        llm: Arc<dyn LlmClient>,
        registry: TemplateRegistry,
        tenancy: Tenancy,
        diff_identifier: impl Into<String>,
        config: BatchConfig,
    ) -> Self {
        BatchScheduler {
            store,
            llm,
            registry,
            tenancy,
            diff_identifier: diff_identifier.into(),
            config,
        }
    }

    /// Release claims a crashed run left `in_progress`, so its nodes
    /// re-enter the wavefront.
    pub async fn reset_stale(&self, run_id: &str) -> Result<u64, DocsError> {
        let reset = self.store.reset_run(run_id).await?;
        if reset > 0 {
            tracing::info!(run_id, reset, "released stale claims");
        }
        Ok(reset)
    }

    /// Run the wavefront to exhaustion. Every node is processed at most
    /// once per run; termination is reached when no pending nodes
    /// remain or the wavefront stops advancing.
    pub async fn run(&self) -> Result<BatchRunReport, DocsError> {
        let run_id = Uuid::new_v4().to_string();
        let mut report = BatchRunReport {
            run_id: run_id.clone(),
            ..BatchRunReport::default()
        };
        tracing::info!(run_id, "starting batch documentation run");

        // Leaf wavefront: self-content only.
        loop {
            let batch = self
                .store
                .claim_leaf_batch(&run_id, self.config.batch_size)
                .await?;
            if batch.is_empty() {
                break;
            }
            report.leaf_rounds += 1;
            self.complete_batch(&run_id, &mut report, leaf_descriptions(self, &batch).await)
                .await?;
            if report.leaf_rounds + report.parent_rounds >= self.config.max_rounds {
                break;
            }
        }

        // Parent wavefront: children are completed, their descriptions
        // come along in the claim.
        loop {
            let batch = self
                .store
                .claim_ready_batch(&run_id, self.config.batch_size)
                .await?;
            if batch.is_empty() {
                break;
            }
            report.parent_rounds += 1;
            self.complete_batch(&run_id, &mut report, parent_descriptions(self, &batch).await)
                .await?;
            if report.leaf_rounds + report.parent_rounds >= self.config.max_rounds {
                break;
            }
        }

        report.pending_at_exit = self.store.count_pending().await?;
        if report.pending_at_exit > 0 {
            tracing::warn!(
                run_id,
                pending = report.pending_at_exit,
                "wavefront stopped with pending nodes"
            );
        }
        tracing::info!(
            run_id,
            described = report.described,
            leaf_rounds = report.leaf_rounds,
            parent_rounds = report.parent_rounds,
            "batch documentation run finished"
        );
        Ok(report)
    }

    async fn complete_batch(
        &self,
        run_id: &str,
        report: &mut BatchRunReport,
        descriptions: Vec<NodeDescription>,
    ) -> Result<(), DocsError> {
        report.described += descriptions.len() as u64;
        report.stubs += descriptions.iter().filter(|d| d.stub).count() as u64;

        persist_documentation(
            self.store.as_ref(),
            &self.tenancy,
            &self.diff_identifier,
            &descriptions,
        )
        .await?;

        let ids: Vec<String> = descriptions.into_iter().map(|d| d.node_id).collect();
        self.store.mark_completed(run_id, &ids).await?;
        Ok(())
    }

    async fn describe(
        &self,
        node: &NodeContent,
        template: &'static str,
        mut vars: TemplateVars,
    ) -> NodeDescription {
        vars.insert("node_name".to_string(), node.name.clone());
        vars.insert("node_labels".to_string(), node.labels.join(", "));
        vars.insert("node_path".to_string(), node.node_path.clone());
        vars.insert("node_content".to_string(), node.content.clone());

        match generate(self.llm.as_ref(), &self.registry, template, &vars).await {
            Ok(text) => NodeDescription {
                node_id: node.id.clone(),
                node_name: node.name.clone(),
                node_path: node.node_path.clone(),
                description: text,
                template,
                stub: false,
            },
            Err(e) => {
                tracing::warn!(node = %node.id, template, error = %e, "LLM call failed");
                NodeDescription {
                    node_id: node.id.clone(),
                    node_name: node.name.clone(),
                    node_path: node.node_path.clone(),
                    description: "Description unavailable: provider failure.".to_string(),
                    template,
                    stub: true,
                }
            }
        }
    }
}

async fn leaf_descriptions(
    scheduler: &BatchScheduler,
    batch: &[NodeContent],
) -> Vec<NodeDescription> {
    let mut out = Vec::with_capacity(batch.len());
    for node in batch {
        out.push(
            scheduler
                .describe(node, templates::LEAF_NODE_ANALYSIS.name, TemplateVars::new())
                .await,
        );
    }
    out
}

async fn parent_descriptions(
    scheduler: &BatchScheduler,
    batch: &[ReadyNode],
) -> Vec<NodeDescription> {
    let mut out = Vec::with_capacity(batch.len());
    for ready in batch {
        let context: Vec<&ChildDescription> = ready
            .hierarchy_context
            .iter()
            .chain(ready.call_context.iter())
            .collect();

        if context.is_empty() {
            out.push(
                scheduler
                    .describe(&ready.node, templates::LEAF_NODE_ANALYSIS.name, TemplateVars::new())
                    .await,
            );
            continue;
        }

        let child_descriptions = context
            .iter()
            .map(|child| {
                format!(
                    "- {}: {}",
                    child.name,
                    child.description.as_deref().unwrap_or("(no description)")
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let vars = TemplateVars::from([(
            "child_descriptions".to_string(),
            child_descriptions,
        )]);
        out.push(
            scheduler
                .describe(&ready.node, templates::PARENT_NODE_WITH_CONTEXT.name, vars)
                .await,
        );
    }
    out
}
