//! Shared types for the documentation engines

/// Identifies one unit of concurrent work in the recursive engine. Every
/// claimed node is processed by a task with its own worker id.
pub type WorkerId = u64;

/// A generated description for one code node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDescription {
    pub node_id: String,
    pub node_name: String,
    pub node_path: String,
    pub description: String,
    /// Name of the template that produced this description.
    pub template: &'static str,
    /// True when the LLM failed and the description is a synthesised
    /// stub so dependents could proceed.
    pub stub: bool,
}

/// Counters accumulated over one engine run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    /// LLM invocations actually made.
    pub llm_calls: u64,
    /// Children described through the forced-leaf fallback path.
    pub fallbacks: u64,
    /// Stub descriptions synthesised after provider failure.
    pub stubs: u64,
    /// Nodes that degraded to the leaf template because the depth guard
    /// or the call budget was hit.
    pub budget_degraded: u64,
    pub cancelled: bool,
}

/// The outcome of a recursive documentation run.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptionRun {
    pub descriptions: Vec<NodeDescription>,
    pub stats: RunStats,
}
