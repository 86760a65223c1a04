//! Rhizome Store — graph persistence behind a backend-neutral capability set

pub mod bolt;
pub mod error;
pub mod memory;
pub mod neo4j;
pub mod queries;
pub mod store;

#[cfg(test)]
mod tests;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use neo4j::{Neo4jConfig, Neo4jStore};
pub use store::{
    ChildDescription, GraphStore, NodeContent, Params, ReadyNode, Row, SearchOutcome,
    NAME_TYPE_SEARCH_LIMIT, NODE_BATCH_SIZE, TEXT_SEARCH_LIMIT,
};
