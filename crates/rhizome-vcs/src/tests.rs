//! Unit tests for rhizome-vcs

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use rhizome_core::{CodeNodeDescriptor, GraphEnvironment, NodeLabel, Tenancy};

use crate::blame::{BlameResolver, merge_line_ranges, normalize_file_path};
use crate::client::{CommitScope, VersionControl};
use crate::dto::{BlameCommit, BlameLineRange, Commit, FileChange, PullRequest};
use crate::error::VcsError;
use crate::github::parse_blame_response;
use crate::nodes::integration_batch;
use crate::patch::extract_relevant_patch;

fn node(id: &str, path: &str, start: u32, end: u32) -> CodeNodeDescriptor {
    CodeNodeDescriptor::new(id, id, NodeLabel::Function, path, start, end)
}

fn commit(sha: &str, ranges: &[(u32, u32)]) -> BlameCommit {
    BlameCommit {
        sha: sha.to_string(),
        message: format!("commit {sha}"),
        author: "jane".to_string(),
        author_email: Some("jane@example.com".to_string()),
        author_login: Some("jane".to_string()),
        timestamp: "2024-01-01T00:00:00Z".to_string(),
        url: format!("https://github.com/acme/demo/commit/{sha}"),
        additions: Some(4),
        deletions: Some(1),
        line_ranges: ranges
            .iter()
            .map(|&(start, end)| BlameLineRange::new(start, end))
            .collect(),
        pr_info: None,
    }
}

// ── Path normalisation ──────────────────────────────────

#[test]
fn normalize_strips_scheme_and_restores_repo_prefix() {
    assert_eq!(
        normalize_file_path("file:///home/user/work/demo/src/a.py", Some("demo")),
        "demo/src/a.py"
    );
    assert_eq!(
        normalize_file_path("/env/0/src/a.py", None),
        "src/a.py"
    );
    assert_eq!(normalize_file_path("src/a.py", Some("demo")), "src/a.py");
}

// ── Range coalescing (S3) ───────────────────────────────

#[test]
fn overlapping_and_adjacent_ranges_merge_into_one_query() {
    let nodes = [
        node("n1", "file:///r/demo/a.py", 10, 20),
        node("n2", "file:///r/demo/a.py", 14, 24),
        node("n3", "file:///r/demo/a.py", 25, 29),
    ];

    let merged = merge_line_ranges(&nodes);
    assert_eq!(merged.len(), 1);
    assert_eq!((merged[0].start, merged[0].end), (10, 29));
    assert_eq!(merged[0].nodes.len(), 3);
}

#[test]
fn distant_ranges_stay_separate() {
    let nodes = [
        node("n1", "a.py", 1, 5),
        node("n2", "a.py", 11, 15),
        node("n3", "a.py", 40, 50),
    ];

    let merged = merge_line_ranges(&nodes);
    // 11 <= 5 + 5 fails by one line; 40 is far away.
    assert_eq!(merged.len(), 3);
}

#[test]
fn merging_is_idempotent() {
    let nodes = [
        node("n1", "a.py", 10, 20),
        node("n2", "a.py", 14, 24),
        node("n3", "a.py", 25, 29),
    ];
    let merged = merge_line_ranges(&nodes);

    // Re-merge the merged intervals as synthetic nodes.
    let as_nodes: Vec<CodeNodeDescriptor> = merged
        .iter()
        .map(|r| node("m", "a.py", r.start, r.end))
        .collect();
    let again = merge_line_ranges(&as_nodes);
    assert_eq!(again.len(), merged.len());
    assert_eq!((again[0].start, again[0].end), (merged[0].start, merged[0].end));
}

#[test]
fn unsorted_input_is_sorted_before_merging() {
    let nodes = [
        node("n2", "a.py", 25, 29),
        node("n1", "a.py", 10, 20),
        node("n3", "a.py", 14, 24),
    ];
    let merged = merge_line_ranges(&nodes);
    assert_eq!(merged.len(), 1);
    assert_eq!((merged[0].start, merged[0].end), (10, 29));
}

// ── Attribution via a scripted provider ─────────────────

struct ScriptedVcs {
    /// Blame answer per file, plus a log of queried ranges.
    blame: HashMap<String, Vec<BlameCommit>>,
    queries: Mutex<Vec<(String, u32, u32)>>,
}

#[async_trait]
impl VersionControl for ScriptedVcs {
    async fn fetch_pull_requests(
        &self,
        _limit: usize,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PullRequest>, VcsError> {
        Ok(Vec::new())
    }

    async fn fetch_commits(
        &self,
        _scope: CommitScope,
        _since: Option<DateTime<Utc>>,
        _limit: usize,
    ) -> Result<Vec<Commit>, VcsError> {
        Ok(Vec::new())
    }

    async fn fetch_commit_changes(&self, _sha: &str) -> Result<Vec<FileChange>, VcsError> {
        Ok(Vec::new())
    }

    async fn fetch_commit_patch(&self, _sha: &str) -> Result<String, VcsError> {
        Ok(String::new())
    }

    async fn fetch_file_at_ref(
        &self,
        _file_path: &str,
        _reference: &str,
    ) -> Result<Option<String>, VcsError> {
        Ok(None)
    }

    async fn blame_range(
        &self,
        file_path: &str,
        start_line: u32,
        end_line: u32,
    ) -> Result<Vec<BlameCommit>, VcsError> {
        self.queries
            .lock()
            .unwrap()
            .push((file_path.to_string(), start_line, end_line));
        self.blame
            .get(file_path)
            .cloned()
            .ok_or_else(|| VcsError::Parse(format!("no blame scripted for {file_path}")))
    }
}

#[tokio::test]
async fn blame_attribution_partitions_by_overlap() {
    let nodes = [
        node("n1", "file:///r/demo/a.py", 10, 20),
        node("n2", "file:///r/demo/a.py", 14, 24),
        node("n3", "file:///r/demo/a.py", 25, 29),
    ];

    let range_commits = vec![
        commit("aaa1111", &[(10, 15)]),
        commit("bbb2222", &[(16, 24)]),
        commit("ccc3333", &[(25, 29)]),
    ];
    let vcs = ScriptedVcs {
        blame: HashMap::from([("demo/a.py".to_string(), range_commits.clone())]),
        queries: Mutex::new(Vec::new()),
    };

    let resolver = BlameResolver::new(Some("demo".to_string()));
    let results = resolver.resolve(&nodes, &vcs).await;

    // One coalesced query for the whole file group.
    let queries = vcs.queries.lock().unwrap().clone();
    assert_eq!(queries, vec![("demo/a.py".to_string(), 10, 29)]);

    let shas = |id: &str| -> Vec<String> {
        results[id].iter().map(|c| c.sha.clone()).collect()
    };
    assert_eq!(shas("n1"), ["aaa1111", "bbb2222"]);
    assert_eq!(shas("n2"), ["aaa1111", "bbb2222"]);
    assert_eq!(shas("n3"), ["ccc3333"]);

    // Partitioning: every node's commits come from the merged range.
    for id in ["n1", "n2", "n3"] {
        for c in &results[id] {
            assert!(range_commits.iter().any(|rc| rc.sha == c.sha));
        }
    }
}

#[tokio::test]
async fn blame_failure_skips_only_the_failing_file() {
    let nodes = [
        node("n1", "file:///r/demo/a.py", 1, 5),
        node("n2", "file:///r/demo/b.py", 1, 5),
    ];
    let vcs = ScriptedVcs {
        // Only b.py has scripted blame; a.py fails.
        blame: HashMap::from([("demo/b.py".to_string(), vec![commit("ddd4444", &[(1, 5)])])]),
        queries: Mutex::new(Vec::new()),
    };

    let resolver = BlameResolver::new(Some("demo".to_string()));
    let results = resolver.resolve(&nodes, &vcs).await;

    assert!(!results.contains_key("n1"));
    assert_eq!(results["n2"].len(), 1);
}

// ── GraphQL response parsing ────────────────────────────

fn blame_response(shape: &str) -> serde_json::Value {
    let blame = json!({
        "ranges": [
            {
                "startingLine": 1,
                "endingLine": 10,
                "commit": {
                    "oid": "abc123def",
                    "committedDate": "2024-01-01T00:00:00Z",
                    "message": "Add parser",
                    "additions": 100,
                    "deletions": 2,
                    "url": "https://github.com/acme/demo/commit/abc123def",
                    "author": {"name": "Jane", "email": "jane@example.com", "user": {"login": "jane"}},
                    "associatedPullRequests": {"nodes": [{
                        "number": 42,
                        "title": "Add parser",
                        "bodyText": "Implements the parser.",
                        "url": "https://github.com/acme/demo/pull/42",
                        "author": {"login": "jane"},
                        "mergedAt": "2024-01-02T00:00:00Z",
                        "state": "MERGED"
                    }]}
                }
            },
            {
                "startingLine": 11,
                "endingLine": 14,
                "commit": {
                    "oid": "ffff0000",
                    "committedDate": "2024-02-01T00:00:00Z",
                    "message": "Fix parser edge case",
                    "additions": 3,
                    "deletions": 1,
                    "url": "https://github.com/acme/demo/commit/ffff0000",
                    "author": {"name": "Sam", "email": null, "user": null},
                    "associatedPullRequests": {"nodes": []}
                }
            },
            {
                "startingLine": 20,
                "endingLine": 25,
                "commit": {
                    "oid": "abc123def",
                    "committedDate": "2024-01-01T00:00:00Z",
                    "message": "Add parser",
                    "additions": 100,
                    "deletions": 2,
                    "url": "https://github.com/acme/demo/commit/abc123def",
                    "author": {"name": "Jane", "email": "jane@example.com", "user": {"login": "jane"}},
                    "associatedPullRequests": {"nodes": []}
                }
            }
        ]
    });

    match shape {
        "ref" => json!({"data": {"repository": {"ref": {"target": {"blame": blame}}}}}),
        _ => json!({"data": {"repository": {"object": {"blame": blame}}}}),
    }
}

#[test]
fn parse_blame_consolidates_repeated_shas() {
    for shape in ["ref", "object"] {
        let commits = parse_blame_response(&blame_response(shape)).unwrap();
        assert_eq!(commits.len(), 2, "shape {shape}");

        let parser = commits.iter().find(|c| c.sha == "abc123def").unwrap();
        assert_eq!(
            parser.line_ranges,
            vec![BlameLineRange::new(1, 10), BlameLineRange::new(20, 25)]
        );
        let pr = parser.pr_info.as_ref().unwrap();
        assert_eq!(pr.number, 42);
        assert_eq!(pr.body_text, "Implements the parser.");

        let fix = commits.iter().find(|c| c.sha == "ffff0000").unwrap();
        assert_eq!(fix.author, "Sam");
        assert_eq!(fix.author_email, None);
        assert_eq!(fix.author_login, None);
        assert!(fix.pr_info.is_none());
    }
}

#[test]
fn parse_blame_rejects_malformed_responses() {
    let err = parse_blame_response(&json!({"data": {"repository": {}}})).unwrap_err();
    assert!(matches!(err, VcsError::Parse(_)));
}

// ── Patch extraction ────────────────────────────────────

const PATCH: &str = "\
diff --git a/src/parser.py b/src/parser.py
index 111..222 100644
--- a/src/parser.py
+++ b/src/parser.py
@@ -1,4 +1,6 @@
 import os
+import re
+
 def parse():
     pass
@@ -40,3 +42,4 @@ def validate():
     if ok:
         return True
+    return False
diff --git a/src/other.py b/src/other.py
index 333..444 100644
--- a/src/other.py
+++ b/src/other.py
@@ -1,2 +1,3 @@
 import sys
+import json
";

#[test]
fn extract_keeps_only_overlapping_hunks() {
    let extracted = extract_relevant_patch(PATCH, "src/parser.py", 1, 10, None);

    assert!(extracted.contains("diff --git a/src/parser.py b/src/parser.py"));
    assert!(extracted.contains("@@ -1,4 +1,6 @@"));
    assert!(extracted.contains("+import re"));
    // The second hunk starts at new line 42, outside [1, 10].
    assert!(!extracted.contains("@@ -40,3 +42,4 @@"));
    // The other file never appears.
    assert!(!extracted.contains("other.py"));
}

#[test]
fn extract_preserves_header_once_for_later_hunks() {
    let extracted = extract_relevant_patch(PATCH, "src/parser.py", 42, 45, None);

    assert!(extracted.contains("@@ -40,3 +42,4 @@"));
    assert!(!extracted.contains("@@ -1,4 +1,6 @@"));
    assert_eq!(extracted.matches("diff --git").count(), 1);
    assert!(extracted.contains("+++ b/src/parser.py"));
}

#[test]
fn extract_returns_empty_for_untouched_ranges() {
    assert_eq!(extract_relevant_patch(PATCH, "src/parser.py", 500, 600, None), "");
    assert_eq!(extract_relevant_patch("", "src/parser.py", 1, 10, None), "");
    assert_eq!(extract_relevant_patch(PATCH, "", 1, 10, None), "");
}

// ── Integration batches ─────────────────────────────────

#[test]
fn integration_batch_builds_a_pr_commit_tree() {
    let env = GraphEnvironment::base("env", "/repo");
    let tenancy = Tenancy::new("repo-1", "org-1");

    let pr = PullRequest {
        number: 42,
        title: "Add parser".to_string(),
        description: "Implements the parser.".to_string(),
        author: "jane".to_string(),
        created_at: "2024-01-01T00:00:00Z".to_string(),
        updated_at: "2024-01-02T00:00:00Z".to_string(),
        merged_at: Some("2024-01-02T00:00:00Z".to_string()),
        state: "closed".to_string(),
        url: "https://github.com/acme/demo/pull/42".to_string(),
        head_sha: "abc".to_string(),
        base_sha: "def".to_string(),
        labels: vec!["feature".to_string()],
    };
    let commits = vec![
        Commit {
            sha: "abc123".to_string(),
            message: "Add parser\n\nDetails.".to_string(),
            author: "jane".to_string(),
            author_email: "jane@example.com".to_string(),
            timestamp: "2024-01-01T10:00:00Z".to_string(),
            url: "https://github.com/acme/demo/commit/abc123".to_string(),
            pr_number: Some(42),
        },
    ];

    let (nodes, edges) = integration_batch(&pr, &commits, &env, &tenancy);
    assert_eq!(nodes.len(), 2);
    assert_eq!(edges.len(), 1);

    let pr_node = &nodes[0];
    let commit_node = &nodes[1];
    assert_eq!(pr_node.path, "integration://github/pull_request/42");
    assert_eq!(pr_node.level, 0);
    assert_eq!(commit_node.path, "integration://github/commit/abc123");
    assert_eq!(commit_node.level, 1);
    assert_eq!(commit_node.name, "Add parser");
    assert_eq!(edges[0].source_id, pr_node.node_id);
    assert_eq!(edges[0].target_id, commit_node.node_id);

    // Idempotence: rebuilding yields identical node ids.
    let (again, _) = integration_batch(&pr, &commits, &env, &tenancy);
    assert_eq!(nodes[0].node_id, again[0].node_id);
    assert_eq!(nodes[1].node_id, again[1].node_id);
}
