//! Logical environment and node path handling

use serde::{Deserialize, Serialize};

/// The logical environment a graph is built under. Node paths are
/// prefixed with `/<environment>/<diff_identifier>/` so a base graph and
/// pending-change overlays can coexist in the same store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEnvironment {
    pub environment: String,
    /// `"0"` for the base graph, otherwise an opaque overlay tag
    /// (e.g. `pr-42`).
    pub diff_identifier: String,
    /// Absolute path of the repository root on disk.
    pub root_path: String,
}

impl GraphEnvironment {
    pub fn new(
        environment: impl Into<String>,
        diff_identifier: impl Into<String>,
        root_path: impl Into<String>,
    ) -> Self {
        GraphEnvironment {
            environment: environment.into(),
            diff_identifier: diff_identifier.into(),
            root_path: root_path.into(),
        }
    }

    /// Base-graph environment, diff identifier `"0"`.
    pub fn base(environment: impl Into<String>, root_path: impl Into<String>) -> Self {
        GraphEnvironment::new(environment, "0", root_path)
    }

    /// Build the environment-prefixed node path for a repo-relative path.
    pub fn node_path(&self, relative: &str) -> String {
        format!(
            "/{}/{}/{}",
            self.environment,
            self.diff_identifier,
            relative.trim_start_matches('/')
        )
    }

    /// `file://` locator for a repo-relative path.
    pub fn file_uri(&self, relative: &str) -> String {
        format!(
            "file://{}/{}",
            self.root_path.trim_end_matches('/'),
            relative.trim_start_matches('/')
        )
    }
}

/// Strip the environment prefix from a node path: the first three
/// `/`-separated components (empty leader, environment, diff identifier)
/// are dropped before any path comparison.
pub fn normalize_node_path(node_path: &str) -> &str {
    let mut parts = node_path.splitn(4, '/');
    parts.next(); // empty leader before the first slash
    parts.next(); // environment
    parts.next(); // diff identifier
    parts.next().unwrap_or("")
}
