//! Projecting PRs and commits into the integration layer

use std::collections::BTreeMap;

use serde_json::json;

use rhizome_core::{Edge, EdgeType, GraphEnvironment, IntegrationNode, Node, Tenancy};

use crate::dto::{Commit, PullRequest};

/// Build the integration nodes for a pull request and its commits: the
/// PR at level 0, commits at level 1, linked by `CONTAINS` edges.
/// Creation is idempotent on the derived `integration://` paths.
pub fn integration_batch(
    pr: &PullRequest,
    commits: &[Commit],
    env: &GraphEnvironment,
    tenancy: &Tenancy,
) -> (Vec<Node>, Vec<Edge>) {
    let mut metadata = BTreeMap::new();
    metadata.insert("head_sha".to_string(), json!(pr.head_sha));
    metadata.insert("base_sha".to_string(), json!(pr.base_sha));
    metadata.insert("labels".to_string(), json!(pr.labels));

    let pr_node = IntegrationNode::new(
        "github",
        "pull_request",
        pr.number.to_string(),
        pr.title.clone(),
        pr.description.clone(),
        pr.merged_at.clone().unwrap_or_else(|| pr.created_at.clone()),
        pr.author.clone(),
        pr.url.clone(),
    )
    .with_metadata(metadata)
    .into_node(env, tenancy);

    let mut nodes = vec![pr_node.clone()];
    let mut edges = Vec::with_capacity(commits.len());

    for commit in commits {
        let mut metadata = BTreeMap::new();
        metadata.insert("pr_number".to_string(), json!(pr.number));

        let commit_node = IntegrationNode::new(
            "github",
            "commit",
            commit.sha.clone(),
            first_line(&commit.message),
            commit.message.clone(),
            commit.timestamp.clone(),
            commit.author.clone(),
            commit.url.clone(),
        )
        .with_metadata(metadata)
        .with_level(1)
        .into_node(env, tenancy);

        edges.push(Edge::new(
            &pr_node.node_id,
            &commit_node.node_id,
            EdgeType::Contains,
        ));
        nodes.push(commit_node);
    }

    (nodes, edges)
}

fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or_default().to_string()
}
