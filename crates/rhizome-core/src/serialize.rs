//! Wire forms written by the graph store

use serde_json::{Map, Value, json};

use crate::model::{Edge, Node};

/// Serialise a node into the record the store upserts:
/// `{type, extra_labels, attributes}`. Attribute ordering is not
/// significant; only the identity hash is order-defined.
pub fn node_record(node: &Node) -> Value {
    let mut attributes = Map::new();
    attributes.insert("node_id".into(), json!(node.node_id));
    attributes.insert("name".into(), json!(node.name));
    attributes.insert("label".into(), json!(node.label.as_str()));
    attributes.insert("layer".into(), json!(node.layer.as_str()));
    attributes.insert("path".into(), json!(node.path));
    attributes.insert("node_path".into(), json!(node.node_path));
    attributes.insert("level".into(), json!(node.level));
    attributes.insert("repo_id".into(), json!(node.repo_id));
    attributes.insert("entity_id".into(), json!(node.entity_id));
    attributes.insert("diff_identifier".into(), json!(node.diff_identifier));

    if let Some(start) = node.start_line {
        attributes.insert("start_line".into(), json!(start));
    }
    if let Some(end) = node.end_line {
        attributes.insert("end_line".into(), json!(end));
    }
    if let Some(text) = &node.text {
        attributes.insert("text".into(), json!(text));
    }
    if let Some(diff_text) = &node.diff_text {
        attributes.insert("diff_text".into(), json!(diff_text));
    }
    if let Some(status) = node.processing_status {
        attributes.insert("processing_status".into(), json!(status.as_str()));
    }
    if let Some(run_id) = &node.processing_run_id {
        attributes.insert("processing_run_id".into(), json!(run_id));
    }
    for (key, value) in &node.attributes {
        attributes.insert(key.clone(), value.clone());
    }

    json!({
        "type": node.label.as_str(),
        "extra_labels": node.extra_labels,
        "attributes": Value::Object(attributes),
    })
}

/// Serialise an edge into the record the store upserts. Call-site fields
/// are present only when set.
pub fn edge_record(edge: &Edge) -> Value {
    let mut record = Map::new();
    record.insert("sourceId".into(), json!(edge.source_id));
    record.insert("targetId".into(), json!(edge.target_id));
    record.insert("type".into(), json!(edge.edge_type.as_str()));
    record.insert("scopeText".into(), json!(edge.scope_text));

    if let Some(start_line) = edge.start_line {
        record.insert("startLine".into(), json!(start_line));
    }
    if let Some(reference_character) = edge.reference_character {
        record.insert("referenceCharacter".into(), json!(reference_character));
    }

    Value::Object(record)
}
