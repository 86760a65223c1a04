//! Mapping code nodes to the commits that authored their lines

use std::collections::HashMap;

use rhizome_core::{CodeNodeDescriptor, env::normalize_node_path};

use crate::client::VersionControl;
use crate::dto::BlameCommit;

/// Ranges whose gap is at most this many lines merge into one blame
/// query.
pub const MERGE_WINDOW: u32 = 5;

/// A coalesced line interval remembering which nodes produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRange {
    pub start: u32,
    pub end: u32,
    /// Indices into the caller's node slice.
    pub nodes: Vec<usize>,
}

/// Normalise a node locator into a repository-relative path: strip the
/// `file://` scheme and any environment prefix, then restore the
/// repository-name prefix when it appears in the remaining path.
pub fn normalize_file_path(file_path: &str, repo_name: Option<&str>) -> String {
    let mut clean = file_path.strip_prefix("file://").unwrap_or(file_path);

    // Environment-prefixed node paths carry /<env>/<diff>/ components.
    if !clean.starts_with('/') {
        return clean.to_string();
    }
    if let Some(repo) = repo_name {
        let marker = format!("/{repo}/");
        if let Some(index) = clean.find(&marker) {
            // Keep the repo name itself as the leading component.
            return clean[index + 1..].to_string();
        }
    }
    // No repository marker; fall back to the environment-stripped form.
    let stripped = normalize_node_path(clean);
    if !stripped.is_empty() {
        return stripped.to_string();
    }
    clean = clean.trim_start_matches('/');
    clean.to_string()
}

/// Coalesce node line ranges: sorted by start line, two ranges merge
/// when the next starts within [`MERGE_WINDOW`] lines of the current
/// end. Merging an already-merged list is a no-op.
pub fn merge_line_ranges(nodes: &[CodeNodeDescriptor]) -> Vec<MergedRange> {
    if nodes.is_empty() {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..nodes.len()).collect();
    order.sort_by_key(|&i| nodes[i].start_line);

    let first = order[0];
    let mut merged = Vec::new();
    let mut current = MergedRange {
        start: nodes[first].start_line,
        end: nodes[first].end_line,
        nodes: vec![first],
    };

    for &index in &order[1..] {
        let node = &nodes[index];
        if node.start_line <= current.end + MERGE_WINDOW {
            current.end = current.end.max(node.end_line);
            current.nodes.push(index);
        } else {
            merged.push(current);
            current = MergedRange {
                start: node.start_line,
                end: node.end_line,
                nodes: vec![index],
            };
        }
    }
    merged.push(current);

    tracing::debug!(nodes = nodes.len(), ranges = merged.len(), "coalesced line ranges");
    merged
}

/// The provenance engine: groups nodes per file, amortises blame calls
/// over merged ranges, and attributes commits back to each node by
/// line overlap.
pub struct BlameResolver {
    repo_name: Option<String>,
}

impl BlameResolver {
    pub fn new(repo_name: Option<String>) -> Self {
        BlameResolver { repo_name }
    }

    /// Resolve blame for a batch of code nodes. A failing range skips
    /// only that range; the rest of the batch continues. The commit set
    /// attributed to a node is always a subset of the commits of the
    /// merged range containing it.
    pub async fn resolve(
        &self,
        nodes: &[CodeNodeDescriptor],
        vcs: &dyn VersionControl,
    ) -> HashMap<String, Vec<BlameCommit>> {
        let mut results: HashMap<String, Vec<BlameCommit>> = HashMap::new();

        // Group nodes by normalised file path.
        let mut by_file: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, node) in nodes.iter().enumerate() {
            let file = normalize_file_path(&node.path, self.repo_name.as_deref());
            by_file.entry(file).or_default().push(index);
        }

        for (file, indices) in by_file {
            let file_nodes: Vec<CodeNodeDescriptor> =
                indices.iter().map(|&i| nodes[i].clone()).collect();

            for range in merge_line_ranges(&file_nodes) {
                let commits = match vcs.blame_range(&file, range.start, range.end).await {
                    Ok(commits) => commits,
                    Err(e) => {
                        tracing::error!(
                            file = %file,
                            start = range.start,
                            end = range.end,
                            error = %e,
                            "blame fetch failed, skipping range"
                        );
                        continue;
                    }
                };

                for &local in &range.nodes {
                    let node = &file_nodes[local];
                    let node_commits: Vec<BlameCommit> = commits
                        .iter()
                        .filter(|commit| commit.touches(node.start_line, node.end_line))
                        .cloned()
                        .collect();
                    results.insert(node.id.clone(), node_commits);
                }
            }
        }

        tracing::info!(nodes = nodes.len(), "resolved blame provenance");
        results
    }
}
