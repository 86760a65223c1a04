//! Integration nodes — external events projected into the graph

use std::collections::BTreeMap;

use serde_json::json;

use crate::env::GraphEnvironment;
use crate::identity;
use crate::model::{Layer, Node, NodeLabel, Tenancy};

/// A commit, pull request, alert, or other external event. Creation is
/// idempotent: two integration nodes with the same
/// `(source, source_type, external_id)` share a derived path and
/// therefore the same node id.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationNode {
    /// Origin system, e.g. `github`, `sentry`.
    pub source: String,
    /// Event kind within the source: `pull_request`, `commit`, `error`, …
    pub source_type: String,
    pub external_id: String,
    pub title: String,
    pub content: String,
    /// RFC 3339 timestamp as reported by the source.
    pub timestamp: String,
    pub author: String,
    pub url: String,
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Tier in an integration tree: 0 for a PR, 1 for its commits.
    pub level: u32,
}

impl IntegrationNode {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: impl Into<String>,
        source_type: impl Into<String>,
        external_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        timestamp: impl Into<String>,
        author: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        IntegrationNode {
            source: source.into(),
            source_type: source_type.into(),
            external_id: external_id.into(),
            title: title.into(),
            content: content.into(),
            timestamp: timestamp.into(),
            author: author.into(),
            url: url.into(),
            metadata: BTreeMap::new(),
            level: 0,
        }
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    /// Derived locator, globally unique by construction.
    pub fn path(&self) -> String {
        format!(
            "integration://{}/{}/{}",
            self.source, self.source_type, self.external_id
        )
    }

    /// Project into the persisted node form.
    pub fn into_node(self, env: &GraphEnvironment, tenancy: &Tenancy) -> Node {
        let path = self.path();
        let relative = format!("{}/{}/{}", self.source, self.source_type, self.external_id);
        let node_path = env.node_path(&relative);
        let node_id = identity::node_id(Layer::Integrations, NodeLabel::Integration, &node_path, None);

        let mut attributes = BTreeMap::new();
        attributes.insert("source".to_string(), json!(self.source));
        attributes.insert("source_type".to_string(), json!(self.source_type));
        attributes.insert("external_id".to_string(), json!(self.external_id));
        attributes.insert("title".to_string(), json!(self.title.clone()));
        attributes.insert("content".to_string(), json!(self.content));
        attributes.insert("timestamp".to_string(), json!(self.timestamp));
        attributes.insert("author".to_string(), json!(self.author));
        attributes.insert("url".to_string(), json!(self.url));
        attributes.insert("metadata".to_string(), json!(self.metadata));

        Node {
            node_id,
            name: self.title,
            label: NodeLabel::Integration,
            extra_labels: Vec::new(),
            layer: Layer::Integrations,
            path,
            node_path,
            level: self.level,
            repo_id: tenancy.repo_id.clone(),
            entity_id: tenancy.entity_id.clone(),
            diff_identifier: env.diff_identifier.clone(),
            start_line: None,
            end_line: None,
            text: None,
            diff_text: None,
            processing_status: None,
            processing_run_id: None,
            attributes,
        }
    }
}
