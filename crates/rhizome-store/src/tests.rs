//! Unit tests for rhizome-store, exercised against the memory backend

use rhizome_core::{
    Edge, EdgeType, GraphEnvironment, NodeDescriptor, NodeLabel, Tenancy, canonical_node,
    documentation_node,
};

use crate::memory::MemoryStore;
use crate::store::{GraphStore, SearchOutcome, collapse_duplicates};

fn tenancy() -> Tenancy {
    Tenancy::new("repo-1", "org-1")
}

fn env() -> GraphEnvironment {
    GraphEnvironment::base("env", "/repo")
}

fn file_node(relative: &str) -> rhizome_core::Node {
    let name = relative.rsplit('/').next().unwrap_or(relative).to_string();
    canonical_node(&NodeDescriptor::file(relative, name, 1), &env(), &tenancy())
}

fn function_node(relative: &str, name: &str, start: u32, end: u32) -> rhizome_core::Node {
    canonical_node(
        &NodeDescriptor::symbol(NodeLabel::Function, relative, name, 2, start, end)
            .with_text(format!("fn {name}() {{}}")),
        &env(),
        &tenancy(),
    )
}

#[tokio::test]
async fn upsert_nodes_is_idempotent() {
    let store = MemoryStore::new(tenancy());
    let node = file_node("src/lib.rs");

    store.upsert_nodes(&[node.clone()]).await.unwrap();
    store.upsert_nodes(&[node.clone()]).await.unwrap();

    assert_eq!(store.node_count(), 1);
    let found = store.get_node_by_id(&node.node_id).await.unwrap().unwrap();
    assert_eq!(found.name, "lib.rs");
}

#[tokio::test]
async fn upsert_merges_attributes_and_unions_labels() {
    let store = MemoryStore::new(tenancy());
    let mut first = file_node("src/lib.rs");
    first.extra_labels.push("RUST".to_string());
    store.upsert_nodes(&[first.clone()]).await.unwrap();

    let mut second = first.clone();
    second.extra_labels = vec!["ENTRYPOINT".to_string()];
    second.text = Some("fn main() {}".to_string());
    store.upsert_nodes(&[second]).await.unwrap();

    assert_eq!(store.node_count(), 1);
    let found = store.get_node_by_id(&first.node_id).await.unwrap().unwrap();
    assert!(found.labels.contains(&"RUST".to_string()));
    assert!(found.labels.contains(&"ENTRYPOINT".to_string()));
    assert_eq!(found.code.as_deref(), Some("fn main() {}"));
}

#[tokio::test]
async fn upsert_rejects_malformed_node_ids() {
    let store = MemoryStore::new(tenancy());
    let mut node = file_node("src/lib.rs");
    node.node_id = "not-a-node-id".to_string();

    let err = store.upsert_nodes(&[node]).await.unwrap_err();
    assert!(matches!(err, crate::error::StoreError::InvalidNodeId(_)));
}

#[tokio::test]
async fn upsert_edges_is_idempotent() {
    let store = MemoryStore::new(tenancy());
    let parent = file_node("src/lib.rs");
    let child = function_node("src/lib.rs", "parse", 1, 10);
    store
        .upsert_nodes(&[parent.clone(), child.clone()])
        .await
        .unwrap();

    let edge = Edge::new(&parent.node_id, &child.node_id, EdgeType::FunctionDefinition);
    store.upsert_edges(&[edge.clone()]).await.unwrap();
    store.upsert_edges(&[edge]).await.unwrap();

    assert_eq!(store.edge_count(), 1);
}

#[tokio::test]
async fn delete_by_path_detaches_edges() {
    let store = MemoryStore::new(tenancy());
    let parent = file_node("src/lib.rs");
    let child = function_node("src/lib.rs", "parse", 1, 10);
    store
        .upsert_nodes(&[parent.clone(), child.clone()])
        .await
        .unwrap();
    store
        .upsert_edges(&[Edge::new(
            &parent.node_id,
            &child.node_id,
            EdgeType::FunctionDefinition,
        )])
        .await
        .unwrap();

    let deleted = store.delete_by_path(&child.path).await.unwrap();
    // Both nodes share the file:// locator of src/lib.rs.
    assert_eq!(deleted, 2);
    assert_eq!(store.edge_count(), 0);
}

#[tokio::test]
async fn mixed_diff_identifiers_prefer_the_active_overlay() {
    let store = MemoryStore::new(tenancy());
    let tenancy = tenancy();
    let base = canonical_node(
        &NodeDescriptor::file("a.py", "a.py", 1).with_text("print('base')"),
        &GraphEnvironment::base("env", "/repo"),
        &tenancy,
    );
    let overlay = canonical_node(
        &NodeDescriptor::file("a.py", "a.py", 1).with_text("print('overlay')"),
        &GraphEnvironment::new("env", "pr-42", "/repo"),
        &tenancy,
    );
    store
        .upsert_nodes(&[base.clone(), overlay.clone()])
        .await
        .unwrap();

    let on_overlay = store.find_by_text("a.py", "pr-42").await.unwrap();
    let SearchOutcome::Hits(hits) = on_overlay else {
        panic!("expected hits");
    };
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].diff_identifier, "pr-42");
    assert_eq!(hits[0].node_id, overlay.node_id);

    let on_base = store.find_by_text("a.py", "0").await.unwrap();
    let SearchOutcome::Hits(hits) = on_base else {
        panic!("expected hits");
    };
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].node_id, base.node_id);
}

#[tokio::test]
async fn text_search_overflows_past_the_cap() {
    let store = MemoryStore::new(tenancy());
    let nodes: Vec<_> = (0..25)
        .map(|i| file_node(&format!("src/module_{i}.rs")))
        .collect();
    store.upsert_nodes(&nodes).await.unwrap();

    let outcome = store.find_by_text("module_", "0").await.unwrap();
    assert!(matches!(outcome, SearchOutcome::Overflow { count: 25 }));

    // A narrower query stays under the cap.
    let outcome = store.find_by_text("module_3", "0").await.unwrap();
    let SearchOutcome::Hits(hits) = outcome else {
        panic!("expected hits");
    };
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn name_type_search_filters_label_and_overflows() {
    let store = MemoryStore::new(tenancy());
    let nodes: Vec<_> = (0..16)
        .map(|i| function_node(&format!("src/m{i}.rs"), "handler", 1, 5))
        .collect();
    store.upsert_nodes(&nodes).await.unwrap();

    let outcome = store
        .find_by_name_and_type("handler", "FUNCTION", "0")
        .await
        .unwrap();
    assert!(outcome.is_overflow());

    let outcome = store
        .find_by_name_and_type("handler", "FILE", "0")
        .await
        .unwrap();
    let SearchOutcome::Hits(hits) = outcome else {
        panic!("expected hits");
    };
    assert!(hits.is_empty());
}

#[tokio::test]
async fn tombstones_are_excluded_from_searches_and_children() {
    let store = MemoryStore::new(tenancy());
    let file = file_node("src/lib.rs");
    let live = function_node("src/lib.rs", "live", 1, 5);
    let dead = function_node("src/lib.rs", "dead", 10, 15);
    store
        .upsert_nodes(&[file.clone(), live.clone(), dead.clone()])
        .await
        .unwrap();
    store
        .upsert_edges(&[
            Edge::new(&file.node_id, &live.node_id, EdgeType::FunctionDefinition),
            Edge::new(&file.node_id, &dead.node_id, EdgeType::FunctionDefinition),
            // Tombstone: outgoing DELETED relation.
            Edge::new(&dead.node_id, &file.node_id, EdgeType::Deleted),
        ])
        .await
        .unwrap();

    let outcome = store
        .find_by_name_and_type("dead", "FUNCTION", "0")
        .await
        .unwrap();
    let SearchOutcome::Hits(hits) = outcome else {
        panic!("expected hits");
    };
    assert!(hits.is_empty());

    let children = store.hierarchy_children(&file.node_id).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].name, "live");
}

#[tokio::test]
async fn wavefront_claims_leaves_then_parents() {
    let store = MemoryStore::new(tenancy());
    let file = file_node("src/lib.rs");
    let f1 = function_node("src/lib.rs", "alpha", 1, 5);
    let f2 = function_node("src/lib.rs", "beta", 10, 15);
    store
        .upsert_nodes(&[file.clone(), f1.clone(), f2.clone()])
        .await
        .unwrap();
    store
        .upsert_edges(&[
            Edge::new(&file.node_id, &f1.node_id, EdgeType::FunctionDefinition),
            Edge::new(&file.node_id, &f2.node_id, EdgeType::FunctionDefinition),
        ])
        .await
        .unwrap();

    assert_eq!(store.count_pending().await.unwrap(), 3);

    // Leaf round: the two functions, not the file.
    let leaves = store.claim_leaf_batch("run-1", 10).await.unwrap();
    assert_eq!(leaves.len(), 2);
    assert!(leaves.iter().all(|n| n.is_function()));

    // The file is not ready until its children complete.
    assert!(store.claim_ready_batch("run-1", 10).await.unwrap().is_empty());

    // Attach descriptions and complete the leaves.
    let mut doc_nodes = Vec::new();
    let mut doc_edges = Vec::new();
    for leaf in [&f1, &f2] {
        let (doc, edge) = documentation_node(leaf, format!("describes {}", leaf.name), &leaf.name, "description");
        doc_nodes.push(doc);
        doc_edges.push(edge);
    }
    store.upsert_nodes(&doc_nodes).await.unwrap();
    store.upsert_edges(&doc_edges).await.unwrap();
    let ids: Vec<String> = leaves.iter().map(|n| n.id.clone()).collect();
    assert_eq!(store.mark_completed("run-1", &ids).await.unwrap(), 2);

    // Parent round: the file arrives with its children's descriptions.
    let ready = store.claim_ready_batch("run-1", 10).await.unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].node.id, file.node_id);
    assert_eq!(ready[0].hierarchy_context.len(), 2);
    assert!(ready[0]
        .hierarchy_context
        .iter()
        .all(|c| c.description.as_deref().is_some_and(|d| d.starts_with("describes"))));

    store
        .mark_completed("run-1", &[file.node_id.clone()])
        .await
        .unwrap();
    assert_eq!(store.count_pending().await.unwrap(), 0);
}

#[tokio::test]
async fn reset_run_releases_in_progress_claims() {
    let store = MemoryStore::new(tenancy());
    let f = function_node("src/lib.rs", "alpha", 1, 5);
    store.upsert_nodes(&[f.clone()]).await.unwrap();

    let claimed = store.claim_leaf_batch("crashed-run", 10).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(store.count_pending().await.unwrap(), 0);

    assert_eq!(store.reset_run("crashed-run").await.unwrap(), 1);
    assert_eq!(store.count_pending().await.unwrap(), 1);
}

#[test]
fn collapse_prefers_active_diff_and_is_deterministic() {
    let hit = |node_id: &str, diff: &str, node_path: &str| rhizome_core::NodeMatch {
        node_id: node_id.to_string(),
        name: "a.py".to_string(),
        label: "FILE".to_string(),
        node_path: node_path.to_string(),
        diff_identifier: diff.to_string(),
        text: None,
        diff_text: None,
    };

    let hits = vec![
        hit("bbbb", "0", "/env/0/a.py"),
        hit("aaaa", "pr-42", "/env/pr-42/a.py"),
        hit("cccc", "pr-42", "/env/pr-42/a.py"),
    ];
    let collapsed = collapse_duplicates(hits, "pr-42");
    assert_eq!(collapsed.len(), 1);
    // Active overlay wins over base; lowest node id among equals.
    assert_eq!(collapsed[0].node_id, "aaaa");

    let hits = vec![hit("bbbb", "0", "/env/0/a.py")];
    let collapsed = collapse_duplicates(hits, "pr-42");
    assert_eq!(collapsed[0].node_id, "bbbb");
}
