//! Rhizome Core — graph schema, content-addressed identity, and wire forms

pub mod diff;
pub mod documentation;
pub mod dto;
pub mod env;
pub mod identity;
pub mod integration;
pub mod model;
pub mod serialize;
pub mod walk;


pub use documentation::{DocSource, documentation_node, documentation_node_parts};
pub use dto::{CodeNodeDescriptor, NodeMatch, NodeSearchResult};
pub use env::GraphEnvironment;
pub use identity::{is_valid_node_id, node_id};
pub use integration::IntegrationNode;
pub use model::{
    Edge, EdgeType, Layer, Node, NodeDescriptor, NodeLabel, ProcessingStatus, Tenancy,
    canonical_node,
};
pub use serialize::{edge_record, node_record};
pub use walk::{RepositoryLayout, walk_repository};
