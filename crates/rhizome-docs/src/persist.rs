//! Writing generated descriptions back through the store

use rhizome_core::{DocSource, Tenancy, documentation_node_parts};
use rhizome_store::GraphStore;

use crate::error::DocsError;
use crate::types::NodeDescription;

/// Build documentation nodes plus their `DESCRIBES` edges for a set of
/// descriptions and upsert them. Exactly one documentation node per
/// described code node; re-runs supersede earlier descriptions because
/// the documentation id derives from the source path.
pub async fn persist_documentation(
    store: &dyn GraphStore,
    tenancy: &Tenancy,
    diff_identifier: &str,
    descriptions: &[NodeDescription],
) -> Result<usize, DocsError> {
    let mut nodes = Vec::with_capacity(descriptions.len());
    let mut edges = Vec::with_capacity(descriptions.len());

    for description in descriptions {
        let source = match store.get_node_by_id(&description.node_id).await? {
            Some(source) => source,
            None => {
                tracing::warn!(node = %description.node_id, "described node no longer stored");
                continue;
            }
        };
        let (node, edge) = documentation_node_parts(
            &DocSource {
                node_id: source.node_id,
                node_path: source.node_path,
                path: source.path,
                level: 0,
            },
            tenancy,
            diff_identifier,
            description.description.clone(),
            format!("{} description", description.node_name),
            "description",
        );
        nodes.push(node);
        edges.push(edge);
    }

    store.upsert_nodes(&nodes).await?;
    store.upsert_edges(&edges).await?;
    tracing::info!(count = nodes.len(), "persisted documentation nodes");
    Ok(nodes.len())
}
