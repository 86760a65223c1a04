//! Read-only projections exchanged with the store and the blame engine

use serde::{Deserialize, Serialize};

use crate::model::NodeLabel;

/// Full read form of a single node, as returned by id lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSearchResult {
    pub node_id: String,
    pub name: String,
    pub labels: Vec<String>,
    pub path: String,
    pub node_path: String,
    pub diff_identifier: String,
    pub code: Option<String>,
    pub diff_text: Option<String>,
}

/// Compact search hit returned by name/type and text searches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMatch {
    pub node_id: String,
    pub name: String,
    pub label: String,
    pub node_path: String,
    pub diff_identifier: String,
    pub text: Option<String>,
    pub diff_text: Option<String>,
}

/// Projection of a code node consumed by the blame engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeNodeDescriptor {
    pub id: String,
    pub name: String,
    pub label: NodeLabel,
    /// `file://` locator as stored on the node.
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
}

impl CodeNodeDescriptor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        label: NodeLabel,
        path: impl Into<String>,
        start_line: u32,
        end_line: u32,
    ) -> Self {
        CodeNodeDescriptor {
            id: id.into(),
            name: name.into(),
            label,
            path: path.into(),
            start_line,
            end_line,
        }
    }
}
