//! Repository layout ingestion: directories and files into graph nodes
//!
//! No assumption is made about programming language here; symbol
//! extraction is an external concern layered on top of these nodes.

use std::fs;
use std::path::Path;

use crate::env::GraphEnvironment;
use crate::model::{Edge, EdgeType, Node, NodeDescriptor, Tenancy, canonical_node};

/// Files larger than this keep their node but drop the `text` slice.
const MAX_TEXT_BYTES: u64 = 1024 * 1024;

/// The folder/file skeleton of a repository.
#[derive(Debug, Default)]
pub struct RepositoryLayout {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Walk a repository root (gitignore-aware, hidden files skipped) into
/// `FOLDER`/`FILE` nodes joined by `CONTAINS` edges.
pub fn walk_repository(
    root: &Path,
    env: &GraphEnvironment,
    tenancy: &Tenancy,
) -> std::io::Result<RepositoryLayout> {
    fs::metadata(root)?;

    let mut layout = RepositoryLayout::default();
    // Absolute directory path -> node id, for CONTAINS edges.
    let mut dir_ids: std::collections::HashMap<std::path::PathBuf, String> =
        std::collections::HashMap::new();

    let root_name = root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "root".to_string());
    let root_node = canonical_node(&NodeDescriptor::folder("", root_name, 0), env, tenancy);
    dir_ids.insert(root.to_path_buf(), root_node.node_id.clone());
    layout.nodes.push(root_node);

    for entry in ignore::WalkBuilder::new(root).follow_links(false).build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }

        let path = entry.path();
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");
        let name = entry.file_name().to_string_lossy().to_string();
        let level = entry.depth() as u32;

        let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
        let node = if is_dir {
            canonical_node(&NodeDescriptor::folder(relative, name, level), env, tenancy)
        } else {
            let mut descriptor = NodeDescriptor::file(relative, name, level);
            descriptor.text = read_text(path);
            canonical_node(&descriptor, env, tenancy)
        };

        if let Some(parent) = path.parent() {
            if let Some(parent_id) = dir_ids.get(parent) {
                layout
                    .edges
                    .push(Edge::new(parent_id, &node.node_id, EdgeType::Contains));
            }
        }
        if is_dir {
            dir_ids.insert(path.to_path_buf(), node.node_id.clone());
        }
        layout.nodes.push(node);
    }

    tracing::info!(
        nodes = layout.nodes.len(),
        edges = layout.edges.len(),
        root = %root.display(),
        "walked repository layout"
    );
    Ok(layout)
}

fn read_text(path: &Path) -> Option<String> {
    let size = fs::metadata(path).ok()?.len();
    if size > MAX_TEXT_BYTES {
        return None;
    }
    // Binary files fail UTF-8 validation and keep no text slice.
    fs::read_to_string(path).ok()
}
