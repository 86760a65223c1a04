//! Rhizome Docs — bottom-up documentation engines over the stored graph

pub mod batch;
pub mod error;
pub mod persist;
pub mod recursive;
pub mod tracker;
pub mod types;

#[cfg(test)]
mod tests;

pub use batch::{BatchConfig, BatchRunReport, BatchScheduler};
pub use error::DocsError;
pub use persist::persist_documentation;
pub use recursive::{DescriberConfig, RecursiveDescriber};
pub use tracker::DependencyTracker;
pub use types::{DescriptionRun, NodeDescription, RunStats, WorkerId};
