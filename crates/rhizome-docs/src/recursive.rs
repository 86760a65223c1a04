//! Parallel bottom-up documentation over the hierarchy and call graph
//!
//! Every claimed node is processed by its own task. Parents block on
//! their children's completion signals; all waits are mediated by the
//! [`DependencyTracker`], and a wait that would close a dependency loop
//! degrades to the forced-leaf fallback instead. Cycles never raise.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, join_all};
use tokio::sync::{Semaphore, watch};
use tokio_util::sync::CancellationToken;

use rhizome_ai::{LlmClient, TemplateRegistry, TemplateVars, generate, templates};
use rhizome_store::{GraphStore, NodeContent, StoreError};

use crate::error::DocsError;
use crate::tracker::DependencyTracker;
use crate::types::{DescriptionRun, NodeDescription, RunStats, WorkerId};

#[derive(Debug, Clone)]
pub struct DescriberConfig {
    /// Maximum LLM calls in flight at once.
    pub max_concurrent_llm_calls: usize,
    /// Recursion depth guard.
    pub max_depth: u32,
    /// Global LLM call budget; past it, remaining nodes degrade to the
    /// leaf template instead of expanding their children.
    pub call_budget: u64,
    /// Deadline for a single LLM call.
    pub llm_timeout: Duration,
    /// Deadline for a single graph-store call.
    pub store_timeout: Duration,
}

impl Default for DescriberConfig {
    fn default() -> Self {
        DescriberConfig {
            max_concurrent_llm_calls: 5,
            max_depth: 1000,
            call_budget: 100_000,
            llm_timeout: Duration::from_secs(120),
            store_timeout: Duration::from_secs(30),
        }
    }
}

/// The recursive documentation engine. Cheap to clone handles are not
/// needed: one instance drives a whole run, and its cache makes repeated
/// `describe` calls reuse earlier work.
pub struct RecursiveDescriber {
    engine: Arc<Engine>,
}

struct Engine {
    store: Arc<dyn GraphStore>,
    llm: Arc<dyn LlmClient>,
    registry: TemplateRegistry,
    config: DescriberConfig,
    /// Completed descriptions keyed by source node id.
    cache: DashMap<String, NodeDescription>,
    /// In-flight claims keyed by node id.
    claims: DashMap<String, Claim>,
    tracker: DependencyTracker,
    llm_permits: Semaphore,
    cancel: CancellationToken,
    llm_calls: AtomicU64,
    fallbacks: AtomicU64,
    stubs: AtomicU64,
    budget_degraded: AtomicU64,
    next_worker: AtomicU64,
}

#[derive(Clone)]
struct Claim {
    owner: WorkerId,
    done: watch::Receiver<bool>,
}

enum ClaimResult {
    Claimed {
        worker: WorkerId,
        tx: watch::Sender<bool>,
    },
    InFlight {
        done: watch::Receiver<bool>,
    },
}

/// How a child's description was obtained.
enum ChildOutcome {
    /// Published description, from the cache or a completed wait.
    Described(String, String),
    /// Fallback description from directly observable data only.
    Degraded(String, String),
    /// No description could be produced (cancellation, lost owner).
    Missing(String),
}

impl RecursiveDescriber {
    pub fn new(
        store: Arc<dyn GraphStore>,
        llm: Arc<dyn LlmClient>,
        registry: TemplateRegistry,
        config: DescriberConfig,
    ) -> Self {
        let llm_permits = Semaphore::new(config.max_concurrent_llm_calls.max(1));
        RecursiveDescriber {
            engine: Arc::new(Engine {
                store,
                llm,
                registry,
                config,
                cache: DashMap::new(),
                claims: DashMap::new(),
                tracker: DependencyTracker::new(),
                llm_permits,
                cancel: CancellationToken::new(),
                llm_calls: AtomicU64::new(0),
                fallbacks: AtomicU64::new(0),
                stubs: AtomicU64::new(0),
                budget_degraded: AtomicU64::new(0),
                next_worker: AtomicU64::new(1),
            }),
        }
    }

    /// Token observed by all workers; cancelling it makes each stop
    /// after its current LLM call.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.engine.cancel.clone()
    }

    /// Describe the subtree rooted at `root_id`. Repeated calls on the
    /// same engine reuse the shared cache.
    pub async fn describe(&self, root_id: &str) -> Result<DescriptionRun, DocsError> {
        let engine = &self.engine;
        let root = engine
            .store
            .node_content(root_id)
            .await?
            .ok_or_else(|| DocsError::RootNotFound(root_id.to_string()))?;

        if !engine.cache.contains_key(root_id) {
            match engine.try_claim(root_id) {
                ClaimResult::Claimed { worker, tx } => {
                    process_claimed(engine.clone(), root, worker, 0, tx).await;
                }
                ClaimResult::InFlight { mut done } => {
                    // Another describe call owns the root; wait it out.
                    let _ = done.wait_for(|d| *d).await;
                }
            }
        }

        Ok(self.run())
    }

    /// Snapshot of everything described so far, ordered by node path.
    pub fn run(&self) -> DescriptionRun {
        let mut descriptions: Vec<NodeDescription> = self
            .engine
            .cache
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        descriptions.sort_by(|a, b| a.node_path.cmp(&b.node_path));

        DescriptionRun {
            descriptions,
            stats: RunStats {
                llm_calls: self.engine.llm_calls.load(Ordering::Relaxed),
                fallbacks: self.engine.fallbacks.load(Ordering::Relaxed),
                stubs: self.engine.stubs.load(Ordering::Relaxed),
                budget_degraded: self.engine.budget_degraded.load(Ordering::Relaxed),
                cancelled: self.engine.cancel.is_cancelled(),
            },
        }
    }
}

impl Engine {
    /// Claim a node for processing, or learn who already owns it. The
    /// claim and the processor registration happen under the map entry
    /// so two tasks cannot both claim one node.
    fn try_claim(self: &Arc<Self>, node_id: &str) -> ClaimResult {
        match self.claims.entry(node_id.to_string()) {
            Entry::Occupied(entry) => ClaimResult::InFlight {
                done: entry.get().done.clone(),
            },
            Entry::Vacant(entry) => {
                let worker = self.next_worker.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = watch::channel(false);
                entry.insert(Claim {
                    owner: worker,
                    done: rx,
                });
                self.tracker.register_processor(node_id, worker);
                ClaimResult::Claimed { worker, tx }
            }
        }
    }

    fn calls_exhausted(&self) -> bool {
        self.llm_calls.load(Ordering::Relaxed) >= self.config.call_budget
    }

    /// Hierarchy children, plus call children for functions. Each store
    /// call runs under the configured deadline.
    async fn children_of(&self, node: &NodeContent) -> Result<Vec<NodeContent>, StoreError> {
        let mut children = self.store_call(self.store.hierarchy_children(&node.id)).await?;
        if node.is_function() {
            children.extend(self.store_call(self.store.call_children(&node.id)).await?);
        }
        children.sort_by(|a, b| a.id.cmp(&b.id));
        children.dedup_by(|a, b| a.id == b.id);
        children.retain(|c| c.id != node.id);
        Ok(children)
    }

    async fn store_call<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.config.store_timeout, call)
            .await
            .map_err(|_| StoreError::Query("store call deadline exceeded".to_string()))?
    }

    fn base_vars(node: &NodeContent) -> TemplateVars {
        TemplateVars::from([
            ("node_name".to_string(), node.name.clone()),
            ("node_labels".to_string(), node.labels.join(", ")),
            ("node_path".to_string(), node.node_path.clone()),
            ("node_content".to_string(), node.content.clone()),
        ])
    }

    fn stub(&self, node: &NodeContent, template: &'static str, reason: &str) -> NodeDescription {
        self.stubs.fetch_add(1, Ordering::Relaxed);
        NodeDescription {
            node_id: node.id.clone(),
            node_name: node.name.clone(),
            node_path: node.node_path.clone(),
            description: format!("Description unavailable: {reason}."),
            template,
            stub: true,
        }
    }

    /// One bounded, deadline-guarded LLM call. Failure never propagates:
    /// the node gets a stub so dependents can proceed.
    async fn invoke(
        &self,
        node: &NodeContent,
        template: &'static str,
        vars: TemplateVars,
    ) -> NodeDescription {
        if self.cancel.is_cancelled() {
            return self.stub(node, template, "generation cancelled");
        }

        let permit = match self.llm_permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => return self.stub(node, template, "worker pool shut down"),
        };
        self.llm_calls.fetch_add(1, Ordering::Relaxed);

        let result = tokio::time::timeout(
            self.config.llm_timeout,
            generate(self.llm.as_ref(), &self.registry, template, &vars),
        )
        .await;
        drop(permit);

        match result {
            Ok(Ok(text)) => NodeDescription {
                node_id: node.id.clone(),
                node_name: node.name.clone(),
                node_path: node.node_path.clone(),
                description: text,
                template,
                stub: false,
            },
            Ok(Err(e)) => {
                tracing::warn!(node = %node.id, template, error = %e, "LLM call failed");
                self.stub(node, template, "provider failure")
            }
            Err(_) => {
                tracing::warn!(node = %node.id, template, "LLM call timed out");
                self.stub(node, template, "provider deadline exceeded")
            }
        }
    }

    async fn describe_leaf(&self, node: &NodeContent) -> NodeDescription {
        self.invoke(node, templates::LEAF_NODE_ANALYSIS.name, Self::base_vars(node))
            .await
    }

    /// The forced-leaf fallback: only directly observable data.
    async fn describe_fallback(&self, node: &NodeContent, note: &str) -> NodeDescription {
        let mut vars = Self::base_vars(node);
        vars.insert("fallback_note".to_string(), note.to_string());
        self.invoke(node, templates::ENHANCED_LEAF_FALLBACK.name, vars).await
    }
}

/// Run a freshly claimed node to completion: describe it, publish the
/// result, release the claim, and signal waiters.
fn process_claimed(
    engine: Arc<Engine>,
    node: NodeContent,
    worker: WorkerId,
    depth: u32,
    tx: watch::Sender<bool>,
) -> BoxFuture<'static, ()> {
    async move {
        // A claim can race a just-published description; don't pay for
        // a second generation.
        if !engine.cache.contains_key(&node.id) {
            let description = describe_node(&engine, &node, worker, depth).await;
            engine.cache.insert(node.id.clone(), description);
        }
        engine.tracker.unregister_processor(&node.id);
        engine.claims.remove(&node.id);
        let _ = tx.send(true);
    }
    .boxed()
}

/// Bottom-up description of one node: children first (in parallel, up to
/// the global budget), then a template chosen by what child context is
/// actually available.
async fn describe_node(
    engine: &Arc<Engine>,
    node: &NodeContent,
    worker: WorkerId,
    depth: u32,
) -> NodeDescription {
    if engine.cancel.is_cancelled() {
        return engine.stub(node, templates::LEAF_NODE_ANALYSIS.name, "generation cancelled");
    }
    if depth >= engine.config.max_depth || engine.calls_exhausted() {
        engine.budget_degraded.fetch_add(1, Ordering::Relaxed);
        return engine.describe_leaf(node).await;
    }

    let children = match engine.children_of(node).await {
        Ok(children) => children,
        Err(e) => {
            tracing::error!(node = %node.id, error = %e, "failed to fetch children");
            return engine.stub(node, templates::LEAF_NODE_ANALYSIS.name, "child lookup failed");
        }
    };

    if children.is_empty() {
        return engine.describe_leaf(node).await;
    }

    // Task-local fallback cache: a child degraded once under this node
    // is not degraded again.
    let task_cache: Arc<DashMap<String, NodeDescription>> = Arc::new(DashMap::new());

    let outcomes = join_all(children.into_iter().map(|child| {
        obtain_child(engine.clone(), child, worker, depth + 1, task_cache.clone())
    }))
    .await;

    let mut available: Vec<(String, String)> = Vec::new();
    let mut degraded: Vec<String> = Vec::new();
    let mut missing: Vec<String> = Vec::new();
    for outcome in outcomes {
        match outcome {
            ChildOutcome::Described(name, text) => available.push((name, text)),
            ChildOutcome::Degraded(name, text) => {
                available.push((name.clone(), text));
                degraded.push(name);
            }
            ChildOutcome::Missing(name) => missing.push(name),
        }
    }

    if available.is_empty() {
        return engine
            .describe_fallback(
                node,
                "No dependency descriptions are available for this element.",
            )
            .await;
    }

    let child_descriptions = available
        .iter()
        .map(|(name, text)| format!("- {name}: {text}"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut vars = Engine::base_vars(node);
    vars.insert("child_descriptions".to_string(), child_descriptions);

    if degraded.is_empty() && missing.is_empty() {
        engine
            .invoke(node, templates::PARENT_NODE_WITH_CONTEXT.name, vars)
            .await
    } else {
        let mut gaps = degraded;
        gaps.extend(missing);
        gaps.sort();
        vars.insert(
            "fallback_note".to_string(),
            format!(
                "Context for the following children is incomplete because of circular references: {}.",
                gaps.join(", ")
            ),
        );
        engine
            .invoke(node, templates::PARENT_NODE_PARTIAL_CONTEXT.name, vars)
            .await
    }
}

/// Obtain one child's description: from the shared cache, by waiting on
/// the in-flight owner when the tracker says it is safe, or by recursing
/// into a fresh claim. An unsafe wait degrades to the fallback path.
async fn obtain_child(
    engine: Arc<Engine>,
    child: NodeContent,
    parent_worker: WorkerId,
    depth: u32,
    task_cache: Arc<DashMap<String, NodeDescription>>,
) -> ChildOutcome {
    if let Some(hit) = engine.cache.get(&child.id) {
        return ChildOutcome::Described(child.name.clone(), hit.description.clone());
    }
    if let Some(hit) = task_cache.get(&child.id) {
        return ChildOutcome::Degraded(child.name.clone(), hit.description.clone());
    }
    if engine.cancel.is_cancelled() {
        return ChildOutcome::Missing(child.name);
    }

    let done = match engine.try_claim(&child.id) {
        ClaimResult::Claimed { worker, tx } => {
            tokio::spawn(process_claimed(
                engine.clone(),
                child.clone(),
                worker,
                depth,
                tx,
            ));
            match engine.claims.get(&child.id) {
                Some(claim) => claim.done.clone(),
                // The spawned task already finished and published.
                None => {
                    return match engine.cache.get(&child.id) {
                        Some(hit) => {
                            ChildOutcome::Described(child.name.clone(), hit.description.clone())
                        }
                        None => ChildOutcome::Missing(child.name),
                    };
                }
            }
        }
        ClaimResult::InFlight { done } => done,
    };

    if !engine.tracker.try_register_waiter(&child.id, parent_worker) {
        // Waiting would close a dependency loop. Describe the child from
        // directly observable data and keep the result task-local; the
        // real owner's description is the one that gets published.
        engine.fallbacks.fetch_add(1, Ordering::Relaxed);
        let description = engine
            .describe_fallback(
                &child,
                "Dependency context for this element is unavailable because of a circular reference.",
            )
            .await;
        let text = description.description.clone();
        task_cache.insert(child.id.clone(), description);
        return ChildOutcome::Degraded(child.name.clone(), text);
    }

    let mut done = done;
    let waited = tokio::select! {
        result = done.wait_for(|d| *d) => result.map(|_| ()),
        _ = engine.cancel.cancelled() => Ok(()),
    };
    engine.tracker.unregister_waiter(&child.id, parent_worker);

    match waited {
        // Owner finished (or we were cancelled): use whatever it
        // published, if anything.
        Ok(()) => match engine.cache.get(&child.id) {
            Some(hit) => ChildOutcome::Described(child.name.clone(), hit.description.clone()),
            None => ChildOutcome::Missing(child.name),
        },
        // Owner vanished without signalling.
        Err(_) => match engine.cache.get(&child.id) {
            Some(hit) => ChildOutcome::Described(child.name.clone(), hit.description.clone()),
            None => {
                tracing::warn!(child = %child.id, "owner disappeared without publishing");
                ChildOutcome::Missing(child.name)
            }
        },
    }
}
