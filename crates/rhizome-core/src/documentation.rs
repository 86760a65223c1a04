//! Documentation node construction

use std::collections::BTreeMap;

use serde_json::json;

use crate::identity;
use crate::model::{Edge, EdgeType, Layer, Node, NodeLabel, Tenancy};

/// The fields of a code node a description attaches to. Engines that
/// only hold a read projection of the source node build this directly.
#[derive(Debug, Clone, PartialEq)]
pub struct DocSource {
    pub node_id: String,
    pub node_path: String,
    pub path: String,
    pub level: u32,
}

impl From<&Node> for DocSource {
    fn from(node: &Node) -> Self {
        DocSource {
            node_id: node.node_id.clone(),
            node_path: node.node_path.clone(),
            path: node.path.clone(),
            level: node.level,
        }
    }
}

/// Build a documentation node for a code node plus its `DESCRIBES` edge.
///
/// The documentation node's identity derives from the source node's path
/// (with the documentation layer and label mixed in), so a later run
/// upserts over the previous description instead of accumulating stale
/// ones: at most one active documentation node per code node.
pub fn documentation_node(
    source: &Node,
    content: impl Into<String>,
    title: impl Into<String>,
    info_type: impl Into<String>,
) -> (Node, Edge) {
    let tenancy = Tenancy::new(source.repo_id.clone(), source.entity_id.clone());
    documentation_node_parts(
        &DocSource::from(source),
        &tenancy,
        &source.diff_identifier,
        content,
        title,
        info_type,
    )
}

/// Same as [`documentation_node`], from a read projection.
pub fn documentation_node_parts(
    source: &DocSource,
    tenancy: &Tenancy,
    diff_identifier: &str,
    content: impl Into<String>,
    title: impl Into<String>,
    info_type: impl Into<String>,
) -> (Node, Edge) {
    let title = title.into();
    let content: String = content.into();
    let info_type: String = info_type.into();
    let node_id = identity::node_id(
        Layer::Documentation,
        NodeLabel::Documentation,
        &source.node_path,
        None,
    );

    let mut attributes = BTreeMap::new();
    attributes.insert("content".to_string(), json!(content));
    attributes.insert("title".to_string(), json!(title));
    attributes.insert("info_type".to_string(), json!(info_type));
    attributes.insert("source_id".to_string(), json!(source.node_id));

    let node = Node {
        node_id: node_id.clone(),
        name: title,
        label: NodeLabel::Documentation,
        extra_labels: Vec::new(),
        layer: Layer::Documentation,
        path: source.path.clone(),
        node_path: source.node_path.clone(),
        level: source.level,
        repo_id: tenancy.repo_id.clone(),
        entity_id: tenancy.entity_id.clone(),
        diff_identifier: diff_identifier.to_string(),
        start_line: None,
        end_line: None,
        text: None,
        diff_text: None,
        processing_status: None,
        processing_run_id: None,
        attributes,
    };

    let edge = Edge::new(node_id, source.node_id.clone(), EdgeType::Describes);
    (node, edge)
}
