//! Core data structures for the knowledge graph

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::env::GraphEnvironment;
use crate::identity;

/// Discriminates what kind of entity a node represents.
///
/// Auxiliary tags (e.g. a language-specific marker) travel as
/// `extra_labels` on the node, not as additional variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeLabel {
    File,
    Folder,
    Class,
    Function,
    Documentation,
    Integration,
}

impl NodeLabel {
    /// Wire name as stored in the graph (`FILE`, `FOLDER`, …).
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::File => "FILE",
            NodeLabel::Folder => "FOLDER",
            NodeLabel::Class => "CLASS",
            NodeLabel::Function => "FUNCTION",
            NodeLabel::Documentation => "DOCUMENTATION",
            NodeLabel::Integration => "INTEGRATION",
        }
    }

    pub fn parse(s: &str) -> Option<NodeLabel> {
        match s {
            "FILE" => Some(NodeLabel::File),
            "FOLDER" => Some(NodeLabel::Folder),
            "CLASS" => Some(NodeLabel::Class),
            "FUNCTION" => Some(NodeLabel::Function),
            "DOCUMENTATION" => Some(NodeLabel::Documentation),
            "INTEGRATION" => Some(NodeLabel::Integration),
            _ => None,
        }
    }

    /// Symbol labels carry their declaration range in the identity hash.
    pub fn is_symbol(&self) -> bool {
        matches!(self, NodeLabel::Class | NodeLabel::Function)
    }
}

/// Which of the three graph layers a node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layer {
    Code,
    Documentation,
    Integrations,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Code => "code",
            Layer::Documentation => "documentation",
            Layer::Integrations => "integrations",
        }
    }
}

/// What kind of relationship an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeType {
    // ── Hierarchy ───────────────────────────────────────────
    Contains,
    FunctionDefinition,
    ClassDefinition,

    // ── Call graph / references ─────────────────────────────
    Calls,
    Uses,
    Imports,
    Inherits,

    // ── Documentation layer ─────────────────────────────────
    Describes,

    // ── Diff overlay lifecycle ──────────────────────────────
    Deleted,
    Modified,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Contains => "CONTAINS",
            EdgeType::FunctionDefinition => "FUNCTION_DEFINITION",
            EdgeType::ClassDefinition => "CLASS_DEFINITION",
            EdgeType::Calls => "CALLS",
            EdgeType::Uses => "USES",
            EdgeType::Imports => "IMPORTS",
            EdgeType::Inherits => "INHERITS",
            EdgeType::Describes => "DESCRIBES",
            EdgeType::Deleted => "DELETED",
            EdgeType::Modified => "MODIFIED",
        }
    }

    /// Edges that define the containment forest.
    pub fn is_hierarchy(&self) -> bool {
        matches!(
            self,
            EdgeType::Contains | EdgeType::FunctionDefinition | EdgeType::ClassDefinition
        )
    }

    /// Edges that extend a function's context through the call graph.
    pub fn is_call(&self) -> bool {
        matches!(self, EdgeType::Calls | EdgeType::Uses)
    }
}

/// Run-scoped documentation lifecycle stage stamped on code nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingStatus {
    InProgress,
    Completed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::InProgress => "in_progress",
            ProcessingStatus::Completed => "completed",
        }
    }
}

/// Tenancy keys scoping every node and every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenancy {
    pub repo_id: String,
    pub entity_id: String,
}

impl Tenancy {
    pub fn new(repo_id: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Tenancy {
            repo_id: repo_id.into(),
            entity_id: entity_id.into(),
        }
    }
}

/// A vertex in the knowledge graph — the shared base record for all
/// layers. Label-specific payload (documentation content, integration
/// metadata) lives in the open `attributes` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// 32-character lowercase hex content hash, see [`crate::identity`].
    pub node_id: String,
    pub name: String,
    pub label: NodeLabel,
    pub extra_labels: Vec<String>,
    pub layer: Layer,
    /// URI-like locator: `file://…` for code, `integration://…` for
    /// integration nodes.
    pub path: String,
    /// `/<environment>/<diff_identifier>/<path relative to repo root>`.
    pub node_path: String,
    /// Depth in the hierarchy tree.
    pub level: u32,
    pub repo_id: String,
    pub entity_id: String,
    /// `"0"` for the base graph, otherwise an opaque overlay tag.
    pub diff_identifier: String,
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
    /// Source text slice for code nodes.
    pub text: Option<String>,
    /// Line-marked unified diff, see [`crate::diff::mark_diff_lines`].
    pub diff_text: Option<String>,
    pub processing_status: Option<ProcessingStatus>,
    pub processing_run_id: Option<String>,
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Node {
    /// Normalised node path with the environment prefix stripped.
    pub fn normalized_path(&self) -> &str {
        crate::env::normalize_node_path(&self.node_path)
    }
}

/// A directed relation between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source_id: String,
    pub target_id: String,
    pub edge_type: EdgeType,
    pub scope_text: String,
    /// Line where a call is expressed; call edges only.
    pub start_line: Option<u32>,
    /// Column of the reference; call edges only.
    pub reference_character: Option<u32>,
}

impl Edge {
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>, edge_type: EdgeType) -> Self {
        Edge {
            source_id: source_id.into(),
            target_id: target_id.into(),
            edge_type,
            scope_text: String::new(),
            start_line: None,
            reference_character: None,
        }
    }

    pub fn with_scope(mut self, scope_text: impl Into<String>) -> Self {
        self.scope_text = scope_text.into();
        self
    }

    /// A call edge with its source location.
    pub fn call(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        start_line: u32,
        reference_character: u32,
    ) -> Self {
        let mut edge = Edge::new(source_id, target_id, EdgeType::Calls);
        edge.start_line = Some(start_line);
        edge.reference_character = Some(reference_character);
        edge
    }
}

/// Raw ingest form of a code node, before identity is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDescriptor {
    pub name: String,
    pub label: NodeLabel,
    pub layer: Layer,
    /// Path relative to the repository root, no leading slash.
    pub relative_path: String,
    pub level: u32,
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
    pub text: Option<String>,
}

impl NodeDescriptor {
    pub fn file(relative_path: impl Into<String>, name: impl Into<String>, level: u32) -> Self {
        NodeDescriptor {
            name: name.into(),
            label: NodeLabel::File,
            layer: Layer::Code,
            relative_path: relative_path.into(),
            level,
            start_line: None,
            end_line: None,
            text: None,
        }
    }

    pub fn folder(relative_path: impl Into<String>, name: impl Into<String>, level: u32) -> Self {
        NodeDescriptor {
            label: NodeLabel::Folder,
            ..NodeDescriptor::file(relative_path, name, level)
        }
    }

    pub fn symbol(
        label: NodeLabel,
        relative_path: impl Into<String>,
        name: impl Into<String>,
        level: u32,
        start_line: u32,
        end_line: u32,
    ) -> Self {
        NodeDescriptor {
            name: name.into(),
            label,
            layer: Layer::Code,
            relative_path: relative_path.into(),
            level,
            start_line: Some(start_line),
            end_line: Some(end_line),
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Produce the final persisted form of a descriptor, including its
/// content-addressed `node_id`. Identity is a pure function of the
/// canonical fields: same descriptor, same environment, same id.
pub fn canonical_node(desc: &NodeDescriptor, env: &GraphEnvironment, tenancy: &Tenancy) -> Node {
    let node_path = env.node_path(&desc.relative_path);
    let range = if desc.label.is_symbol() {
        desc.start_line.zip(desc.end_line)
    } else {
        None
    };
    let node_id = identity::node_id(desc.layer, desc.label, &node_path, range);

    Node {
        node_id,
        name: desc.name.clone(),
        label: desc.label,
        extra_labels: Vec::new(),
        layer: desc.layer,
        path: env.file_uri(&desc.relative_path),
        node_path,
        level: desc.level,
        repo_id: tenancy.repo_id.clone(),
        entity_id: tenancy.entity_id.clone(),
        diff_identifier: env.diff_identifier.clone(),
        start_line: desc.start_line,
        end_line: desc.end_line,
        text: desc.text.clone(),
        diff_text: None,
        processing_status: None,
        processing_run_id: None,
        attributes: BTreeMap::new(),
    }
}
