//! Deadlock-safe wait mediation for the recursive engine

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::types::WorkerId;

/// Tracks which worker owns which node and which nodes each worker is
/// blocked on, so a wait that would close a dependency loop can be
/// refused before anyone blocks.
///
/// The only contract: if [`try_register_waiter`] returns true, waiting
/// on that node's completion signal cannot deadlock via tracked
/// workers. No ordering between waiters is guaranteed.
///
/// [`try_register_waiter`]: DependencyTracker::try_register_waiter
#[derive(Debug, Default)]
pub struct DependencyTracker {
    state: Mutex<TrackerState>,
}

#[derive(Debug, Default)]
struct TrackerState {
    /// node_id -> worker currently processing it.
    processing: HashMap<String, WorkerId>,
    /// worker -> node_ids it is blocked on.
    waiting: HashMap<WorkerId, HashSet<String>>,
}

/// Debug snapshot of the tracker state.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSnapshot {
    pub processing: usize,
    pub waiting_workers: usize,
}

impl DependencyTracker {
    pub fn new() -> Self {
        DependencyTracker::default()
    }

    pub fn register_processor(&self, node_id: &str, worker: WorkerId) {
        let mut state = self.state.lock().unwrap();
        state.processing.insert(node_id.to_string(), worker);
        tracing::trace!(node_id, worker, "registered processor");
    }

    pub fn unregister_processor(&self, node_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.processing.remove(node_id);
        tracing::trace!(node_id, "unregistered processor");
    }

    /// Record that `worker` wants to block on `node_id`. Returns false
    /// iff the wait would close a cycle; in that case nothing is
    /// recorded and the caller must take the fallback path.
    pub fn try_register_waiter(&self, node_id: &str, worker: WorkerId) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.would_deadlock(node_id, worker) {
            tracing::debug!(
                node_id,
                worker,
                "refusing wait: would close a dependency cycle"
            );
            return false;
        }
        state
            .waiting
            .entry(worker)
            .or_default()
            .insert(node_id.to_string());
        true
    }

    pub fn unregister_waiter(&self, node_id: &str, worker: WorkerId) {
        let mut state = self.state.lock().unwrap();
        if let Some(nodes) = state.waiting.get_mut(&worker) {
            nodes.remove(node_id);
            if nodes.is_empty() {
                state.waiting.remove(&worker);
            }
        }
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        let state = self.state.lock().unwrap();
        TrackerSnapshot {
            processing: state.processing.len(),
            waiting_workers: state.waiting.len(),
        }
    }
}

impl TrackerState {
    /// A wait deadlocks when walking from the node's current processor
    /// through its waits to their processors reaches the requester.
    /// Self-wait is an immediate cycle.
    fn would_deadlock(&self, node_id: &str, requester: WorkerId) -> bool {
        let Some(&processor) = self.processing.get(node_id) else {
            // Nobody owns the node yet; waiting is safe.
            return false;
        };
        if processor == requester {
            return true;
        }
        self.depends_on(processor, requester)
    }

    /// Depth-first search over the worker -> node -> processor relation.
    fn depends_on(&self, start: WorkerId, target: WorkerId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![start];

        while let Some(worker) = stack.pop() {
            if !visited.insert(worker) {
                continue;
            }
            if worker == target {
                return true;
            }
            if let Some(nodes) = self.waiting.get(&worker) {
                for node_id in nodes {
                    if let Some(&processor) = self.processing.get(node_id) {
                        if !visited.contains(&processor) {
                            stack.push(processor);
                        }
                    }
                }
            }
        }
        false
    }
}
