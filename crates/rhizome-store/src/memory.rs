//! In-memory graph backend on petgraph, for tests and offline runs

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;

use rhizome_core::{
    Edge, EdgeType, Layer, Node, NodeLabel, NodeMatch, NodeSearchResult, ProcessingStatus, Tenancy,
    is_valid_node_id,
};

use crate::error::StoreError;
use crate::store::{
    ChildDescription, GraphStore, NodeContent, Params, ReadyNode, Row, SearchOutcome,
    collapse_duplicates, NAME_TYPE_SEARCH_LIMIT, NODE_BATCH_SIZE, TEXT_SEARCH_LIMIT,
};

/// Process-local backend with full trait support. Raw parameterised
/// queries are a Cypher concern and return [`StoreError::Unsupported`];
/// the typed operations cover everything the engines drive through the
/// store.
pub struct MemoryStore {
    tenancy: Tenancy,
    inner: Mutex<Inner>,
}

struct Inner {
    graph: StableDiGraph<Node, Edge>,
    by_id: HashMap<String, NodeIndex>,
}

impl MemoryStore {
    pub fn new(tenancy: Tenancy) -> Self {
        MemoryStore {
            tenancy,
            inner: Mutex::new(Inner {
                graph: StableDiGraph::new(),
                by_id: HashMap::new(),
            }),
        }
    }

    pub fn tenancy(&self) -> &Tenancy {
        &self.tenancy
    }

    /// Total node count, for diagnostics.
    pub fn node_count(&self) -> usize {
        self.inner.lock().unwrap().graph.node_count()
    }

    /// Total edge count, for diagnostics.
    pub fn edge_count(&self) -> usize {
        self.inner.lock().unwrap().graph.edge_count()
    }
}

impl Inner {
    /// A node with an incoming `MODIFIED` or outgoing `DELETED` edge is
    /// a tombstone and is excluded from searches and traversals.
    fn is_tombstone(&self, idx: NodeIndex) -> bool {
        let deleted = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .any(|e| e.weight().edge_type == EdgeType::Deleted);
        if deleted {
            return true;
        }
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .any(|e| e.weight().edge_type == EdgeType::Modified)
    }

    fn children_by(&self, idx: NodeIndex, filter: fn(&EdgeType) -> bool) -> Vec<NodeIndex> {
        let mut out: Vec<NodeIndex> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .filter(|e| filter(&e.weight().edge_type))
            .map(|e| e.target())
            .filter(|&t| {
                self.graph
                    .node_weight(t)
                    .map_or(false, |n| n.layer == Layer::Code)
            })
            .filter(|&t| !self.is_tombstone(t))
            .collect();
        out.sort();
        out.dedup();
        out
    }

    fn content_of(&self, idx: NodeIndex) -> Option<NodeContent> {
        let node = self.graph.node_weight(idx)?;
        Some(NodeContent {
            id: node.node_id.clone(),
            name: node.name.clone(),
            labels: labels_of(node),
            path: node.path.clone(),
            node_path: node.node_path.clone(),
            start_line: node.start_line,
            end_line: node.end_line,
            content: node.text.clone().unwrap_or_default(),
        })
    }

    /// The active description of a node, through its incoming
    /// `DESCRIBES` edge.
    fn description_of(&self, idx: NodeIndex) -> Option<String> {
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .filter(|e| e.weight().edge_type == EdgeType::Describes)
            .filter_map(|e| self.graph.node_weight(e.source()))
            .filter_map(|doc| doc.attributes.get("content"))
            .filter_map(|v| v.as_str().map(str::to_string))
            .next()
    }

    fn child_description(&self, idx: NodeIndex) -> Option<ChildDescription> {
        let node = self.graph.node_weight(idx)?;
        Some(ChildDescription {
            id: node.node_id.clone(),
            name: node.name.clone(),
            labels: labels_of(node),
            path: node.path.clone(),
            description: self.description_of(idx),
        })
    }

    /// Leaves of the documentation wavefront: functions with no calls,
    /// files with no definitions and no calls.
    fn is_wavefront_leaf(&self, idx: NodeIndex) -> bool {
        let Some(node) = self.graph.node_weight(idx) else {
            return false;
        };
        match node.label {
            NodeLabel::Function => self.children_by(idx, EdgeType::is_call).is_empty(),
            NodeLabel::File => {
                self.children_by(idx, is_definition).is_empty()
                    && self.children_by(idx, EdgeType::is_call).is_empty()
            }
            _ => false,
        }
    }

    fn children_completed(&self, children: &[NodeIndex]) -> bool {
        children.iter().all(|&c| {
            self.graph
                .node_weight(c)
                .map_or(true, |n| n.processing_status == Some(ProcessingStatus::Completed))
        })
    }

    /// Code nodes eligible for documentation runs, sorted by node id for
    /// deterministic claim order.
    fn pending_code_nodes(&self) -> Vec<NodeIndex> {
        let mut out: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&idx| {
                self.graph.node_weight(idx).map_or(false, |n| {
                    n.layer == Layer::Code && n.processing_status.is_none()
                }) && !self.is_tombstone(idx)
            })
            .collect();
        out.sort_by(|&a, &b| {
            let a_id = self.graph.node_weight(a).map(|n| n.node_id.as_str());
            let b_id = self.graph.node_weight(b).map(|n| n.node_id.as_str());
            a_id.cmp(&b_id)
        });
        out
    }

    fn matches(&self, idx: NodeIndex) -> Option<NodeMatch> {
        let node = self.graph.node_weight(idx)?;
        Some(NodeMatch {
            node_id: node.node_id.clone(),
            name: node.name.clone(),
            label: node.label.as_str().to_string(),
            node_path: node.node_path.clone(),
            diff_identifier: node.diff_identifier.clone(),
            text: node.text.clone(),
            diff_text: node.diff_text.clone(),
        })
    }
}

fn labels_of(node: &Node) -> Vec<String> {
    let mut labels = vec![node.label.as_str().to_string()];
    labels.extend(node.extra_labels.iter().cloned());
    labels
}

fn is_definition(edge_type: &EdgeType) -> bool {
    matches!(edge_type, EdgeType::FunctionDefinition | EdgeType::ClassDefinition)
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn upsert_nodes(&self, nodes: &[Node]) -> Result<(), StoreError> {
        for chunk in nodes.chunks(NODE_BATCH_SIZE) {
            let mut inner = self.inner.lock().unwrap();
            for node in chunk {
                if !is_valid_node_id(&node.node_id) {
                    return Err(StoreError::InvalidNodeId(node.node_id.clone()));
                }
                match inner.by_id.get(&node.node_id).copied() {
                    Some(idx) => {
                        let existing = inner
                            .graph
                            .node_weight_mut(idx)
                            .ok_or_else(|| StoreError::Query("stale node index".into()))?;
                        // Merge: attributes overwrite, extra labels union.
                        let mut merged = node.clone();
                        for label in &existing.extra_labels {
                            if !merged.extra_labels.contains(label) {
                                merged.extra_labels.push(label.clone());
                            }
                        }
                        for (key, value) in &existing.attributes {
                            merged.attributes.entry(key.clone()).or_insert(value.clone());
                        }
                        *existing = merged;
                    }
                    None => {
                        let id = node.node_id.clone();
                        let idx = inner.graph.add_node(node.clone());
                        inner.by_id.insert(id, idx);
                    }
                }
            }
            tracing::debug!(chunk = chunk.len(), "upserted node chunk");
        }
        Ok(())
    }

    async fn upsert_edges(&self, edges: &[Edge]) -> Result<(), StoreError> {
        for chunk in edges.chunks(NODE_BATCH_SIZE) {
            let mut inner = self.inner.lock().unwrap();
            for edge in chunk {
                let (Some(&source), Some(&target)) = (
                    inner.by_id.get(&edge.source_id),
                    inner.by_id.get(&edge.target_id),
                ) else {
                    tracing::warn!(
                        source = %edge.source_id,
                        target = %edge.target_id,
                        "skipping edge with unknown endpoint"
                    );
                    continue;
                };

                let existing = inner
                    .graph
                    .edges_connecting(source, target)
                    .find(|e| e.weight().edge_type == edge.edge_type)
                    .map(|e| e.id());
                match existing {
                    Some(edge_idx) => {
                        if let Some(weight) = inner.graph.edge_weight_mut(edge_idx) {
                            *weight = edge.clone();
                        }
                    }
                    None => {
                        inner.graph.add_edge(source, target, edge.clone());
                    }
                }
            }
            tracing::debug!(chunk = chunk.len(), "upserted edge chunk");
        }
        Ok(())
    }

    async fn query(&self, _statement: &str, _params: Params) -> Result<Vec<Row>, StoreError> {
        Err(StoreError::Unsupported(
            "raw queries require a Cypher backend",
        ))
    }

    async fn delete_by_path(&self, path: &str) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let doomed: Vec<NodeIndex> = inner
            .graph
            .node_indices()
            .filter(|&idx| {
                inner
                    .graph
                    .node_weight(idx)
                    .map_or(false, |n| n.path == path)
            })
            .collect();

        let mut deleted = 0;
        for idx in doomed {
            if let Some(node) = inner.graph.remove_node(idx) {
                inner.by_id.remove(&node.node_id);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn get_node_by_id(&self, node_id: &str) -> Result<Option<NodeSearchResult>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let Some(&idx) = inner.by_id.get(node_id) else {
            return Ok(None);
        };
        let node = inner
            .graph
            .node_weight(idx)
            .ok_or_else(|| StoreError::Query("stale node index".into()))?;
        Ok(Some(NodeSearchResult {
            node_id: node.node_id.clone(),
            name: node.name.clone(),
            labels: labels_of(node),
            path: node.path.clone(),
            node_path: node.node_path.clone(),
            diff_identifier: node.diff_identifier.clone(),
            code: node.text.clone(),
            diff_text: node.diff_text.clone(),
        }))
    }

    async fn find_by_name_and_type(
        &self,
        name: &str,
        label: &str,
        diff_identifier: &str,
    ) -> Result<SearchOutcome<NodeMatch>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let hits: Vec<NodeMatch> = inner
            .graph
            .node_indices()
            .filter(|&idx| {
                inner.graph.node_weight(idx).map_or(false, |n| {
                    n.name == name
                        && labels_of(n).iter().any(|l| l == label)
                        && (n.diff_identifier == diff_identifier || n.diff_identifier == "0")
                }) && !inner.is_tombstone(idx)
            })
            .filter_map(|idx| inner.matches(idx))
            .collect();

        let collapsed = collapse_duplicates(hits, diff_identifier);
        if collapsed.len() > NAME_TYPE_SEARCH_LIMIT {
            return Ok(SearchOutcome::Overflow {
                count: collapsed.len(),
            });
        }
        Ok(SearchOutcome::Hits(collapsed))
    }

    async fn find_by_text(
        &self,
        needle: &str,
        diff_identifier: &str,
    ) -> Result<SearchOutcome<NodeMatch>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let hits: Vec<NodeMatch> = inner
            .graph
            .node_indices()
            .filter(|&idx| {
                inner.graph.node_weight(idx).map_or(false, |n| {
                    n.layer == Layer::Code
                        && (n.diff_identifier == diff_identifier || n.diff_identifier == "0")
                        && (n.text.as_deref().is_some_and(|t| t.contains(needle))
                            || n.node_path.contains(needle))
                }) && !inner.is_tombstone(idx)
            })
            .filter_map(|idx| inner.matches(idx))
            .collect();

        let collapsed = collapse_duplicates(hits, diff_identifier);
        if collapsed.len() > TEXT_SEARCH_LIMIT {
            return Ok(SearchOutcome::Overflow {
                count: collapsed.len(),
            });
        }
        Ok(SearchOutcome::Hits(collapsed))
    }

    async fn node_content(&self, node_id: &str) -> Result<Option<NodeContent>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.by_id.get(node_id).and_then(|&idx| inner.content_of(idx)))
    }

    async fn hierarchy_children(&self, node_id: &str) -> Result<Vec<NodeContent>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let Some(&idx) = inner.by_id.get(node_id) else {
            return Ok(Vec::new());
        };
        Ok(inner
            .children_by(idx, EdgeType::is_hierarchy)
            .into_iter()
            .filter_map(|c| inner.content_of(c))
            .collect())
    }

    async fn call_children(&self, node_id: &str) -> Result<Vec<NodeContent>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let Some(&idx) = inner.by_id.get(node_id) else {
            return Ok(Vec::new());
        };
        Ok(inner
            .children_by(idx, EdgeType::is_call)
            .into_iter()
            .filter_map(|c| inner.content_of(c))
            .collect())
    }

    async fn claim_leaf_batch(
        &self,
        run_id: &str,
        batch_size: usize,
    ) -> Result<Vec<NodeContent>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let candidates: Vec<NodeIndex> = inner
            .pending_code_nodes()
            .into_iter()
            .filter(|&idx| inner.is_wavefront_leaf(idx))
            .take(batch_size)
            .collect();

        let mut claimed = Vec::with_capacity(candidates.len());
        for idx in candidates {
            if let Some(content) = inner.content_of(idx) {
                claimed.push(content);
            }
            if let Some(node) = inner.graph.node_weight_mut(idx) {
                node.processing_status = Some(ProcessingStatus::InProgress);
                node.processing_run_id = Some(run_id.to_string());
            }
        }
        Ok(claimed)
    }

    async fn claim_ready_batch(
        &self,
        run_id: &str,
        batch_size: usize,
    ) -> Result<Vec<ReadyNode>, StoreError> {
        let mut inner = self.inner.lock().unwrap();

        let mut ready = Vec::new();
        for idx in inner.pending_code_nodes() {
            if ready.len() >= batch_size {
                break;
            }
            let hierarchy = inner.children_by(idx, EdgeType::is_hierarchy);
            if !inner.children_completed(&hierarchy) {
                continue;
            }
            let is_function = inner
                .graph
                .node_weight(idx)
                .map_or(false, |n| n.label == NodeLabel::Function);
            let calls = if is_function {
                let calls = inner.children_by(idx, EdgeType::is_call);
                if !inner.children_completed(&calls) {
                    continue;
                }
                calls
            } else {
                Vec::new()
            };

            let Some(node) = inner.content_of(idx) else {
                continue;
            };
            ready.push((idx, node, hierarchy, calls));
        }

        let mut out = Vec::with_capacity(ready.len());
        for (idx, node, hierarchy, calls) in ready {
            let hierarchy_context = hierarchy
                .iter()
                .filter_map(|&c| inner.child_description(c))
                .collect();
            let call_context = calls
                .iter()
                .filter_map(|&c| inner.child_description(c))
                .collect();
            if let Some(weight) = inner.graph.node_weight_mut(idx) {
                weight.processing_status = Some(ProcessingStatus::InProgress);
                weight.processing_run_id = Some(run_id.to_string());
            }
            out.push(ReadyNode {
                node,
                hierarchy_context,
                call_context,
            });
        }
        Ok(out)
    }

    async fn mark_completed(&self, run_id: &str, node_ids: &[String]) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let mut changed = 0;
        for node_id in node_ids {
            let Some(&idx) = inner.by_id.get(node_id) else {
                continue;
            };
            if let Some(node) = inner.graph.node_weight_mut(idx) {
                if node.processing_run_id.as_deref() == Some(run_id) {
                    node.processing_status = Some(ProcessingStatus::Completed);
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn count_pending(&self) -> Result<u64, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.pending_code_nodes().len() as u64)
    }

    async fn reset_run(&self, run_id: &str) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let mut reset = 0;
        let indices: Vec<NodeIndex> = inner.graph.node_indices().collect();
        for idx in indices {
            if let Some(node) = inner.graph.node_weight_mut(idx) {
                if node.processing_run_id.as_deref() == Some(run_id)
                    && node.processing_status == Some(ProcessingStatus::InProgress)
                {
                    node.processing_status = None;
                    node.processing_run_id = None;
                    reset += 1;
                }
            }
        }
        Ok(reset)
    }
}
