//! The backend-neutral graph store capability set

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use rhizome_core::{Edge, Node, NodeMatch, NodeSearchResult, env::normalize_node_path};

use crate::error::StoreError;

/// One result row of a parameterised query.
pub type Row = HashMap<String, serde_json::Value>;

/// Out-of-band query parameters. Never string-interpolate values into a
/// statement.
pub type Params = HashMap<String, serde_json::Value>;

/// Nodes and edges are written in chunks of this size.
pub const NODE_BATCH_SIZE: usize = 100;

/// Text and path searches overflow past this many collapsed results.
pub const TEXT_SEARCH_LIMIT: usize = 20;

/// Name + type searches overflow past this many collapsed results.
pub const NAME_TYPE_SEARCH_LIMIT: usize = 15;

/// Result of a capped search: either the hits, or a sentinel telling the
/// caller to refine the query instead of streaming unbounded results.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome<T> {
    Hits(Vec<T>),
    Overflow { count: usize },
}

impl<T> SearchOutcome<T> {
    pub fn is_overflow(&self) -> bool {
        matches!(self, SearchOutcome::Overflow { .. })
    }
}

/// The readable content of a node, as fed to the documentation engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeContent {
    pub id: String,
    pub name: String,
    pub labels: Vec<String>,
    pub path: String,
    pub node_path: String,
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
    #[serde(default)]
    pub content: String,
}

impl NodeContent {
    pub fn is_function(&self) -> bool {
        self.labels.iter().any(|l| l == "FUNCTION")
    }
}

/// A child node plus its already-generated description, fetched in the
/// same store operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildDescription {
    pub id: String,
    pub name: String,
    pub labels: Vec<String>,
    pub path: String,
    pub description: Option<String>,
}

/// A wavefront node whose children are all completed, with their
/// descriptions as generation context.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyNode {
    pub node: NodeContent,
    pub hierarchy_context: Vec<ChildDescription>,
    pub call_context: Vec<ChildDescription>,
}

/// Capability set every graph backend provides. All operations are
/// scoped by the tenancy the store was opened with; searches and
/// traversals exclude tombstoned nodes (incoming `MODIFIED` or outgoing
/// `DELETED`).
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Merge nodes on `(repo_id, entity_id, node_id)` in chunks of
    /// [`NODE_BATCH_SIZE`]: attributes overwrite, extra labels union.
    /// A chunk that fails mid-flight surfaces to the caller; upserts are
    /// idempotent, so the caller may re-run it.
    async fn upsert_nodes(&self, nodes: &[Node]) -> Result<(), StoreError>;

    /// Merge edges, idempotent on `(source_id, target_id, type)`.
    async fn upsert_edges(&self, edges: &[Edge]) -> Result<(), StoreError>;

    /// Execute a parameterised query. Backends without a query dialect
    /// return [`StoreError::Unsupported`].
    async fn query(&self, statement: &str, params: Params) -> Result<Vec<Row>, StoreError>;

    /// Hard delete every node at the given locator, detaching its edges.
    /// Returns the number of deleted nodes.
    async fn delete_by_path(&self, path: &str) -> Result<u64, StoreError>;

    async fn get_node_by_id(&self, node_id: &str) -> Result<Option<NodeSearchResult>, StoreError>;

    /// Exact-name search filtered by label, capped at
    /// [`NAME_TYPE_SEARCH_LIMIT`].
    async fn find_by_name_and_type(
        &self,
        name: &str,
        label: &str,
        diff_identifier: &str,
    ) -> Result<SearchOutcome<NodeMatch>, StoreError>;

    /// Substring search over node text and paths, capped at
    /// [`TEXT_SEARCH_LIMIT`].
    async fn find_by_text(
        &self,
        needle: &str,
        diff_identifier: &str,
    ) -> Result<SearchOutcome<NodeMatch>, StoreError>;

    // ── Traversal (recursive documentation engine) ──────────

    async fn node_content(&self, node_id: &str) -> Result<Option<NodeContent>, StoreError>;

    /// Children through `CONTAINS` / `FUNCTION_DEFINITION` /
    /// `CLASS_DEFINITION` edges.
    async fn hierarchy_children(&self, node_id: &str) -> Result<Vec<NodeContent>, StoreError>;

    /// Children through `CALLS` / `USES` edges.
    async fn call_children(&self, node_id: &str) -> Result<Vec<NodeContent>, StoreError>;

    // ── Wavefront (batch documentation scheduler) ───────────

    /// Atomically claim up to `batch_size` unprocessed leaves (functions
    /// with no outgoing calls, files with no definitions and no calls),
    /// stamping them `in_progress` with the run id.
    async fn claim_leaf_batch(
        &self,
        run_id: &str,
        batch_size: usize,
    ) -> Result<Vec<NodeContent>, StoreError>;

    /// Atomically claim up to `batch_size` nodes whose hierarchy
    /// children (and call children, for functions) are all `completed`,
    /// returning the children's descriptions alongside.
    async fn claim_ready_batch(
        &self,
        run_id: &str,
        batch_size: usize,
    ) -> Result<Vec<ReadyNode>, StoreError>;

    /// Mark claimed nodes of this run `completed`. Returns how many
    /// nodes changed.
    async fn mark_completed(&self, run_id: &str, node_ids: &[String]) -> Result<u64, StoreError>;

    /// Number of code nodes not yet claimed by any run.
    async fn count_pending(&self) -> Result<u64, StoreError>;

    /// Release `in_progress` claims left behind by a crashed run.
    async fn reset_run(&self, run_id: &str) -> Result<u64, StoreError>;
}

/// Collapse search hits that share a normalised node path, keeping one
/// per path: the row whose diff identifier matches the active one wins
/// over the base graph; among equals the lexicographically smallest
/// node id wins, so the outcome is deterministic across backends.
pub fn collapse_duplicates(mut hits: Vec<NodeMatch>, active_diff: &str) -> Vec<NodeMatch> {
    hits.sort_by(|a, b| a.node_id.cmp(&b.node_id));

    let mut by_path: HashMap<String, NodeMatch> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for hit in hits {
        let key = normalize_node_path(&hit.node_path).to_string();
        match by_path.get(&key) {
            None => {
                order.push(key.clone());
                by_path.insert(key, hit);
            }
            Some(existing) => {
                let existing_active = existing.diff_identifier == active_diff;
                let hit_active = hit.diff_identifier == active_diff;
                if hit_active && !existing_active {
                    by_path.insert(key, hit);
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| by_path.remove(&key))
        .collect()
}
