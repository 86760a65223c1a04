//! Cross-crate integration scenarios against the in-memory backend

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use rhizome_ai::{ChatResponse, LlmClient, LlmError, TemplateRegistry, ToolSpec};
use rhizome_core::{
    Edge, EdgeType, GraphEnvironment, IntegrationNode, NodeDescriptor, NodeLabel, Tenancy,
    canonical_node, walk_repository,
};
use rhizome_docs::{
    BatchConfig, BatchScheduler, DescriberConfig, RecursiveDescriber, persist_documentation,
};
use rhizome_store::{GraphStore, MemoryStore, SearchOutcome};

struct CountingLlm {
    calls: AtomicU64,
}

impl CountingLlm {
    fn new() -> Arc<Self> {
        Arc::new(CountingLlm {
            calls: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl LlmClient for CountingLlm {
    async fn chat(
        &self,
        _system: &str,
        _user: &str,
        _tools: &[ToolSpec],
    ) -> Result<ChatResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ChatResponse::text("Generated description."))
    }

    fn name(&self) -> &str {
        "counting"
    }
}

fn tenancy() -> Tenancy {
    Tenancy::new("repo-1", "org-1")
}

fn sample_repository() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/parser.py"), "def parse(): ...").unwrap();
    std::fs::write(dir.path().join("src/writer.py"), "def write(): ...").unwrap();
    std::fs::write(dir.path().join("README.md"), "# demo").unwrap();
    dir
}

#[tokio::test]
async fn ingest_then_recursive_documentation_covers_every_node() {
    let dir = sample_repository();
    let env = GraphEnvironment::base("main", dir.path().to_string_lossy());
    let store = Arc::new(MemoryStore::new(tenancy()));

    let layout = walk_repository(dir.path(), &env, &tenancy()).unwrap();
    let code_nodes = layout.nodes.len();
    store.upsert_nodes(&layout.nodes).await.unwrap();
    store.upsert_edges(&layout.edges).await.unwrap();

    // Ingest is idempotent.
    store.upsert_nodes(&layout.nodes).await.unwrap();
    store.upsert_edges(&layout.edges).await.unwrap();
    assert_eq!(store.node_count(), code_nodes);
    assert_eq!(store.edge_count(), layout.edges.len());

    let root_id = layout.nodes[0].node_id.clone();
    let llm = CountingLlm::new();
    let describer = RecursiveDescriber::new(
        store.clone(),
        llm.clone(),
        TemplateRegistry::default(),
        DescriberConfig::default(),
    );
    let run = describer.describe(&root_id).await.unwrap();

    // Every node under the root got exactly one description.
    assert_eq!(run.descriptions.len(), code_nodes);
    assert_eq!(llm.calls.load(Ordering::SeqCst) as usize, code_nodes);

    persist_documentation(store.as_ref(), &tenancy(), "0", &run.descriptions)
        .await
        .unwrap();
    assert_eq!(store.node_count(), code_nodes * 2);
    assert_eq!(store.edge_count(), layout.edges.len() + code_nodes);

    // Persisting the same run again changes nothing (upsert idempotence).
    persist_documentation(store.as_ref(), &tenancy(), "0", &run.descriptions)
        .await
        .unwrap();
    assert_eq!(store.node_count(), code_nodes * 2);
    assert_eq!(store.edge_count(), layout.edges.len() + code_nodes);
}

#[tokio::test]
async fn batch_scheduler_documents_an_ingested_repository() {
    let dir = sample_repository();
    let env = GraphEnvironment::base("main", dir.path().to_string_lossy());
    let store = Arc::new(MemoryStore::new(tenancy()));

    let layout = walk_repository(dir.path(), &env, &tenancy()).unwrap();
    let code_nodes = layout.nodes.len() as u64;
    store.upsert_nodes(&layout.nodes).await.unwrap();
    store.upsert_edges(&layout.edges).await.unwrap();

    let scheduler = BatchScheduler::new(
        store.clone(),
        CountingLlm::new(),
        TemplateRegistry::default(),
        tenancy(),
        "0",
        BatchConfig {
            batch_size: 2,
            ..BatchConfig::default()
        },
    );

    let report = scheduler.run().await.unwrap();
    assert_eq!(report.described, code_nodes);
    assert_eq!(report.pending_at_exit, 0);
    // Three file leaves at batch size two.
    assert_eq!(report.leaf_rounds, 2);
    // Folders complete within the hierarchy depth.
    assert!(report.parent_rounds <= 3);
    assert_eq!(store.count_pending().await.unwrap(), 0);
}

#[tokio::test]
async fn mixed_diff_identifiers_resolve_to_their_overlay() {
    let store = MemoryStore::new(tenancy());
    let base = canonical_node(
        &NodeDescriptor::file("a.py", "a.py", 1).with_text("print('base')"),
        &GraphEnvironment::base("env", "/repo"),
        &tenancy(),
    );
    let overlay = canonical_node(
        &NodeDescriptor::file("a.py", "a.py", 1).with_text("print('overlay')"),
        &GraphEnvironment::new("env", "pr-42", "/repo"),
        &tenancy(),
    );
    store
        .upsert_nodes(&[base.clone(), overlay.clone()])
        .await
        .unwrap();

    let SearchOutcome::Hits(hits) = store.find_by_text("a.py", "pr-42").await.unwrap() else {
        panic!("expected hits");
    };
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].node_id, overlay.node_id);

    let SearchOutcome::Hits(hits) = store.find_by_text("a.py", "0").await.unwrap() else {
        panic!("expected hits");
    };
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].node_id, base.node_id);
}

#[tokio::test]
async fn integration_nodes_are_idempotent_in_the_store() {
    let store = MemoryStore::new(tenancy());
    let env = GraphEnvironment::base("env", "/repo");

    let make = || {
        IntegrationNode::new(
            "github",
            "pull_request",
            "42",
            "Fix bug",
            "Description",
            "2024-01-01T00:00:00Z",
            "john",
            "https://github.com/acme/demo/pull/42",
        )
        .into_node(&env, &tenancy())
    };

    store.upsert_nodes(&[make()]).await.unwrap();
    store.upsert_nodes(&[make()]).await.unwrap();

    assert_eq!(store.node_count(), 1);
    let node = make();
    let found = store.get_node_by_id(&node.node_id).await.unwrap().unwrap();
    assert_eq!(found.path, "integration://github/pull_request/42");
}

#[tokio::test]
async fn soft_deleted_overlay_nodes_are_invisible_to_documentation() {
    let store = Arc::new(MemoryStore::new(tenancy()));
    let env = GraphEnvironment::base("env", "/repo");
    let file = canonical_node(
        &NodeDescriptor::file("src/m.py", "m.py", 1).with_text("..."),
        &env,
        &tenancy(),
    );
    let live = canonical_node(
        &NodeDescriptor::symbol(NodeLabel::Function, "src/m.py", "live", 2, 1, 5)
            .with_text("def live(): ..."),
        &env,
        &tenancy(),
    );
    let dead = canonical_node(
        &NodeDescriptor::symbol(NodeLabel::Function, "src/m.py", "dead", 2, 10, 15)
            .with_text("def dead(): ..."),
        &env,
        &tenancy(),
    );
    store
        .upsert_nodes(&[file.clone(), live.clone(), dead.clone()])
        .await
        .unwrap();
    store
        .upsert_edges(&[
            Edge::new(&file.node_id, &live.node_id, EdgeType::FunctionDefinition),
            Edge::new(&file.node_id, &dead.node_id, EdgeType::FunctionDefinition),
            Edge::new(&dead.node_id, &file.node_id, EdgeType::Deleted),
        ])
        .await
        .unwrap();

    let llm = CountingLlm::new();
    let describer = RecursiveDescriber::new(
        store.clone(),
        llm.clone(),
        TemplateRegistry::default(),
        DescriberConfig::default(),
    );
    let run = describer.describe(&file.node_id).await.unwrap();

    // The tombstoned function is not part of the traversal input.
    assert_eq!(run.descriptions.len(), 2);
    assert!(run.descriptions.iter().all(|d| d.node_id != dead.node_id));
}
