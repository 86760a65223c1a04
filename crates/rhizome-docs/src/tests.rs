//! Unit tests for rhizome-docs

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use rhizome_ai::{ChatResponse, LlmClient, LlmError, TemplateRegistry, ToolSpec};
use rhizome_core::{
    Edge, EdgeType, GraphEnvironment, Node, NodeDescriptor, NodeLabel, Tenancy, canonical_node,
};
use rhizome_store::{GraphStore, MemoryStore};

use crate::batch::{BatchConfig, BatchScheduler};
use crate::persist::persist_documentation;
use crate::recursive::{DescriberConfig, RecursiveDescriber};
use crate::tracker::DependencyTracker;

/// Deterministic LLM that counts invocations.
struct CountingLlm {
    calls: AtomicU64,
    fail: bool,
}

impl CountingLlm {
    fn ok() -> Arc<Self> {
        Arc::new(CountingLlm {
            calls: AtomicU64::new(0),
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(CountingLlm {
            calls: AtomicU64::new(0),
            fail: true,
        })
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
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
        if self.fail {
            return Err(LlmError::Provider {
                provider: "counting".to_string(),
                message: "synthetic failure".to_string(),
            });
        }
        Ok(ChatResponse::text("Generated description."))
    }

    fn name(&self) -> &str {
        "counting"
    }
}

fn tenancy() -> Tenancy {
    Tenancy::new("repo-1", "org-1")
}

fn env() -> GraphEnvironment {
    GraphEnvironment::base("env", "/repo")
}

fn function(name: &str, start: u32) -> Node {
    canonical_node(
        &NodeDescriptor::symbol(
            NodeLabel::Function,
            format!("src/{name}.py"),
            name,
            2,
            start,
            start + 5,
        )
        .with_text(format!("def {name}(): ...")),
        &env(),
        &tenancy(),
    )
}

fn calls(source: &Node, target: &Node) -> Edge {
    Edge::call(&source.node_id, &target.node_id, 1, 0)
}

async fn seeded_store(nodes: &[Node], edges: &[Edge]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new(tenancy()));
    store.upsert_nodes(nodes).await.unwrap();
    store.upsert_edges(edges).await.unwrap();
    store
}

fn describer(store: Arc<MemoryStore>, llm: Arc<CountingLlm>, workers: usize) -> RecursiveDescriber {
    RecursiveDescriber::new(
        store,
        llm,
        TemplateRegistry::default(),
        DescriberConfig {
            max_concurrent_llm_calls: workers,
            ..DescriberConfig::default()
        },
    )
}

// ── Dependency tracker ──────────────────────────────────

#[test]
fn tracker_allows_wait_on_unowned_node() {
    let tracker = DependencyTracker::new();
    assert!(tracker.try_register_waiter("n1", 1));
}

#[test]
fn tracker_refuses_self_wait() {
    let tracker = DependencyTracker::new();
    tracker.register_processor("n1", 1);
    assert!(!tracker.try_register_waiter("n1", 1));
}

#[test]
fn tracker_refuses_transitive_cycle() {
    let tracker = DependencyTracker::new();
    // Worker 1 owns n1 and waits on n2; worker 2 owns n2 and waits on
    // n3; worker 3 owns n3.
    tracker.register_processor("n1", 1);
    tracker.register_processor("n2", 2);
    tracker.register_processor("n3", 3);
    assert!(tracker.try_register_waiter("n2", 1));
    assert!(tracker.try_register_waiter("n3", 2));
    // Worker 3 waiting on n1 would close the loop.
    assert!(!tracker.try_register_waiter("n1", 3));
    // Waiting on an unrelated node is still fine.
    tracker.register_processor("n4", 4);
    assert!(tracker.try_register_waiter("n4", 3));
}

#[test]
fn tracker_releases_dependencies() {
    let tracker = DependencyTracker::new();
    tracker.register_processor("n1", 1);
    tracker.register_processor("n2", 2);
    assert!(tracker.try_register_waiter("n2", 1));
    assert!(!tracker.try_register_waiter("n1", 2));

    // Once worker 1 stops waiting, the reverse wait becomes safe.
    tracker.unregister_waiter("n2", 1);
    assert!(tracker.try_register_waiter("n1", 2));

    tracker.unregister_processor("n1");
    tracker.unregister_processor("n2");
    assert_eq!(tracker.snapshot().processing, 0);
}

// ── Recursive engine ────────────────────────────────────

#[tokio::test]
async fn simple_cycle_terminates_with_one_worker() {
    // f0 -> f1 -> f2 -> f0
    let f0 = function("f0", 1);
    let f1 = function("f1", 10);
    let f2 = function("f2", 20);
    let store = seeded_store(
        &[f0.clone(), f1.clone(), f2.clone()],
        &[calls(&f0, &f1), calls(&f1, &f2), calls(&f2, &f0)],
    )
    .await;

    let llm = CountingLlm::ok();
    let engine = describer(store.clone(), llm.clone(), 1);

    let run = tokio::time::timeout(Duration::from_secs(10), engine.describe(&f0.node_id))
        .await
        .expect("cycle must not deadlock")
        .unwrap();

    assert_eq!(run.descriptions.len(), 3);
    assert!(run.descriptions.iter().all(|d| !d.description.is_empty()));
    assert!(run.stats.llm_calls <= 6, "made {} calls", run.stats.llm_calls);
    assert!(run.stats.fallbacks >= 1);

    // Exactly one documentation node per cycle participant.
    persist_documentation(store.as_ref(), &tenancy(), "0", &run.descriptions)
        .await
        .unwrap();
    persist_documentation(store.as_ref(), &tenancy(), "0", &run.descriptions)
        .await
        .unwrap();
    assert_eq!(store.node_count(), 6);
    // 3 CALLS + 3 DESCRIBES, unchanged by the second persist.
    assert_eq!(store.edge_count(), 6);
}

#[tokio::test]
async fn simple_cycle_terminates_with_many_workers() {
    let f0 = function("f0", 1);
    let f1 = function("f1", 10);
    let f2 = function("f2", 20);
    let store = seeded_store(
        &[f0.clone(), f1.clone(), f2.clone()],
        &[calls(&f0, &f1), calls(&f1, &f2), calls(&f2, &f0)],
    )
    .await;

    let engine = describer(store, CountingLlm::ok(), 8);
    let run = tokio::time::timeout(Duration::from_secs(10), engine.describe(&f0.node_id))
        .await
        .expect("cycle must not deadlock")
        .unwrap();

    assert_eq!(run.descriptions.len(), 3);
}

#[tokio::test]
async fn shared_dependencies_are_described_once() {
    // Three processors each call the same three utilities.
    let processors: Vec<Node> = (0..3).map(|i| function(&format!("proc_{i}"), 1)).collect();
    let utils: Vec<Node> = (0..3).map(|i| function(&format!("util_{i}"), 50)).collect();

    let mut edges = Vec::new();
    for processor in &processors {
        for util in &utils {
            edges.push(calls(processor, util));
        }
    }
    let mut nodes = processors.clone();
    nodes.extend(utils.clone());
    let store = seeded_store(&nodes, &edges).await;

    let llm = CountingLlm::ok();
    let engine = describer(store, llm.clone(), 4);
    for processor in &processors {
        engine.describe(&processor.node_id).await.unwrap();
    }

    let run = engine.run();
    assert_eq!(run.descriptions.len(), 6);
    // Three utilities plus three processors, cache hits on the repeats.
    assert_eq!(llm.calls(), 6);
    assert_eq!(run.stats.fallbacks, 0);
}

#[tokio::test]
async fn provider_failure_produces_stubs_not_errors() {
    let f0 = function("f0", 1);
    let f1 = function("f1", 10);
    let store = seeded_store(&[f0.clone(), f1.clone()], &[calls(&f0, &f1)]).await;

    let engine = describer(store, CountingLlm::failing(), 2);
    let run = engine.describe(&f0.node_id).await.unwrap();

    assert_eq!(run.descriptions.len(), 2);
    assert!(run.descriptions.iter().all(|d| d.stub));
    assert_eq!(run.stats.stubs, 2);
}

#[tokio::test]
async fn cancellation_stops_expansion() {
    let f0 = function("f0", 1);
    let f1 = function("f1", 10);
    let store = seeded_store(&[f0.clone(), f1.clone()], &[calls(&f0, &f1)]).await;

    let llm = CountingLlm::ok();
    let engine = describer(store, llm.clone(), 2);
    engine.cancellation_token().cancel();

    let run = engine.describe(&f0.node_id).await.unwrap();
    assert!(run.stats.cancelled);
    assert_eq!(llm.calls(), 0);
    assert!(run.descriptions.iter().all(|d| d.stub));
}

#[tokio::test]
async fn hierarchy_parents_get_child_context() {
    let file = canonical_node(
        &NodeDescriptor::file("src/mod.py", "mod.py", 1).with_text("..."),
        &env(),
        &tenancy(),
    );
    let f0 = function("f0", 1);
    let f1 = function("f1", 10);
    let store = seeded_store(
        &[file.clone(), f0.clone(), f1.clone()],
        &[
            Edge::new(&file.node_id, &f0.node_id, EdgeType::FunctionDefinition),
            Edge::new(&file.node_id, &f1.node_id, EdgeType::FunctionDefinition),
        ],
    )
    .await;

    let llm = CountingLlm::ok();
    let engine = describer(store, llm.clone(), 2);
    let run = engine.describe(&file.node_id).await.unwrap();

    assert_eq!(run.descriptions.len(), 3);
    assert_eq!(llm.calls(), 3);
    let parent = run
        .descriptions
        .iter()
        .find(|d| d.node_id == file.node_id)
        .unwrap();
    assert_eq!(parent.template, "parent_node_with_context");
}

// ── Batch scheduler ─────────────────────────────────────

async fn folder_with_files(file_count: usize) -> (Arc<MemoryStore>, Node) {
    let folder = canonical_node(&NodeDescriptor::folder("pkg", "pkg", 1), &env(), &tenancy());
    let mut nodes = vec![folder.clone()];
    let mut edges = Vec::new();
    for i in 0..file_count {
        let file = canonical_node(
            &NodeDescriptor::file(format!("pkg/f{i}.py"), format!("f{i}.py"), 2)
                .with_text("pass"),
            &env(),
            &tenancy(),
        );
        edges.push(Edge::new(&folder.node_id, &file.node_id, EdgeType::Contains));
        nodes.push(file);
    }
    (seeded_store(&nodes, &edges).await, folder)
}

#[tokio::test]
async fn scheduler_terminates_in_expected_rounds() {
    let (store, _folder) = folder_with_files(4).await;
    let scheduler = BatchScheduler::new(
        store.clone(),
        CountingLlm::ok(),
        TemplateRegistry::default(),
        tenancy(),
        "0",
        BatchConfig {
            batch_size: 2,
            ..BatchConfig::default()
        },
    );

    let report = scheduler.run().await.unwrap();
    // Four leaves at batch size two, then the folder.
    assert_eq!(report.leaf_rounds, 2);
    assert_eq!(report.parent_rounds, 1);
    assert_eq!(report.described, 5);
    assert_eq!(report.pending_at_exit, 0);
    assert_eq!(store.count_pending().await.unwrap(), 0);

    // 5 code nodes + 5 documentation nodes.
    assert_eq!(store.node_count(), 10);
    // 4 CONTAINS + 5 DESCRIBES.
    assert_eq!(store.edge_count(), 9);
}

#[tokio::test]
async fn scheduler_processes_each_node_once_per_run() {
    let (store, _folder) = folder_with_files(3).await;
    let llm = CountingLlm::ok();
    let scheduler = BatchScheduler::new(
        store.clone(),
        llm.clone(),
        TemplateRegistry::default(),
        tenancy(),
        "0",
        BatchConfig::default(),
    );

    let report = scheduler.run().await.unwrap();
    assert_eq!(report.described, 4);
    assert_eq!(llm.calls(), 4);

    // A second run finds nothing pending.
    let report = scheduler.run().await.unwrap();
    assert_eq!(report.described, 0);
    assert_eq!(llm.calls(), 4);
}

#[tokio::test]
async fn scheduler_resumes_after_a_crashed_run() {
    let (store, _folder) = folder_with_files(2).await;

    // Simulate a crash: a previous run claimed the leaves and died.
    let stale = store.claim_leaf_batch("dead-run", 10).await.unwrap();
    assert_eq!(stale.len(), 2);

    let scheduler = BatchScheduler::new(
        store.clone(),
        CountingLlm::ok(),
        TemplateRegistry::default(),
        tenancy(),
        "0",
        BatchConfig::default(),
    );
    assert_eq!(scheduler.reset_stale("dead-run").await.unwrap(), 2);

    let report = scheduler.run().await.unwrap();
    assert_eq!(report.described, 3);
    assert_eq!(report.pending_at_exit, 0);
}
