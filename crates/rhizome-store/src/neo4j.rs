//! Neo4j backend on neo4rs

use std::time::Duration;

use async_trait::async_trait;
use neo4rs::Graph;
use serde_json::{Value, json};

use rhizome_core::{
    Edge, Node, NodeMatch, NodeSearchResult, Tenancy, edge_record, is_valid_node_id, node_record,
};

use crate::bolt::to_bolt;
use crate::error::StoreError;
use crate::queries;
use crate::store::{
    ChildDescription, GraphStore, NodeContent, Params, ReadyNode, Row, SearchOutcome,
    collapse_duplicates, NAME_TYPE_SEARCH_LIMIT, NODE_BATCH_SIZE, TEXT_SEARCH_LIMIT,
};

const CONNECT_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    /// Bolt URI, e.g. `bolt://localhost:7687`.
    pub uri: String,
    pub user: String,
    pub password: String,
}

/// Cypher backend. Requires APOC for the batched merges, matching the
/// upsert semantics of the trait.
pub struct Neo4jStore {
    graph: Graph,
    tenancy: Tenancy,
}

impl Neo4jStore {
    /// Connect with exponential backoff: three attempts, sleeping 1s
    /// then 2s between them.
    pub async fn connect(config: &Neo4jConfig, tenancy: Tenancy) -> Result<Self, StoreError> {
        let mut attempt = 0;
        loop {
            match Graph::new(&config.uri, &config.user, &config.password).await {
                Ok(graph) => {
                    tracing::info!(uri = %config.uri, "connected to Neo4j");
                    return Ok(Neo4jStore { graph, tenancy });
                }
                Err(e) if attempt + 1 < CONNECT_RETRIES => {
                    let backoff = Duration::from_secs(1 << attempt);
                    tracing::warn!(
                        error = %e,
                        attempt = attempt + 1,
                        "Neo4j connection failed, retrying in {backoff:?}"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(StoreError::Connection(e.to_string())),
            }
        }
    }

    /// Execute a statement with tenancy params merged in.
    async fn run(&self, statement: &str, mut params: Params) -> Result<Vec<Row>, StoreError> {
        params.insert("repo_id".into(), json!(self.tenancy.repo_id));
        params.insert("entity_id".into(), json!(self.tenancy.entity_id));

        let mut query = neo4rs::query(statement);
        for (key, value) in &params {
            query = query.param(key, to_bolt(value));
        }

        let mut stream = self.graph.execute(query).await.map_err(|e| {
            tracing::error!(error = %e, statement, params = %json!(params), "query failed");
            StoreError::Query(e.to_string())
        })?;

        let mut rows = Vec::new();
        while let Some(row) = stream.next().await.map_err(|e| {
            tracing::error!(error = %e, statement, "failed to read result row");
            StoreError::Query(e.to_string())
        })? {
            let map: Row = row
                .to()
                .map_err(|e| StoreError::MalformedRow(e.to_string()))?;
            rows.push(map);
        }
        Ok(rows)
    }

    async fn run_count(&self, statement: &str, params: Params, column: &str) -> Result<u64, StoreError> {
        let rows = self.run(statement, params).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get(column))
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }

    async fn content_rows(&self, statement: &str, params: Params) -> Result<Vec<NodeContent>, StoreError> {
        let rows = self.run(statement, params).await?;
        rows.into_iter().map(node_content_from_row).collect()
    }
}

fn node_content_from_row(row: Row) -> Result<NodeContent, StoreError> {
    serde_json::from_value(Value::Object(row.into_iter().collect()))
        .map_err(|e| StoreError::MalformedRow(e.to_string()))
}

fn node_match_from_row(row: Row) -> Result<NodeMatch, StoreError> {
    serde_json::from_value(Value::Object(row.into_iter().collect()))
        .map_err(|e| StoreError::MalformedRow(e.to_string()))
}

fn context_from_value(value: Option<&Value>) -> Result<Vec<ChildDescription>, StoreError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| StoreError::MalformedRow(e.to_string())),
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn upsert_nodes(&self, nodes: &[Node]) -> Result<(), StoreError> {
        for node in nodes {
            if !is_valid_node_id(&node.node_id) {
                return Err(StoreError::InvalidNodeId(node.node_id.clone()));
            }
        }
        for chunk in nodes.chunks(NODE_BATCH_SIZE) {
            let rows: Vec<Value> = chunk.iter().map(node_record).collect();
            let params = Params::from([("rows".to_string(), Value::Array(rows))]);
            let upserted = self
                .run_count(queries::UPSERT_NODES, params, "upserted")
                .await?;
            tracing::debug!(upserted, "upserted node chunk");
        }
        Ok(())
    }

    async fn upsert_edges(&self, edges: &[Edge]) -> Result<(), StoreError> {
        for chunk in edges.chunks(NODE_BATCH_SIZE) {
            let rows: Vec<Value> = chunk.iter().map(edge_record).collect();
            let params = Params::from([("rows".to_string(), Value::Array(rows))]);
            let upserted = self
                .run_count(queries::UPSERT_EDGES, params, "upserted")
                .await?;
            tracing::debug!(upserted, "upserted edge chunk");
        }
        Ok(())
    }

    async fn query(&self, statement: &str, params: Params) -> Result<Vec<Row>, StoreError> {
        self.run(statement, params).await
    }

    async fn delete_by_path(&self, path: &str) -> Result<u64, StoreError> {
        let params = Params::from([("path".to_string(), json!(path))]);
        self.run_count(queries::DELETE_BY_PATH, params, "deleted").await
    }

    async fn get_node_by_id(&self, node_id: &str) -> Result<Option<NodeSearchResult>, StoreError> {
        let params = Params::from([("node_id".to_string(), json!(node_id))]);
        let rows = self.run(queries::GET_NODE_BY_ID, params).await?;
        match rows.into_iter().next() {
            None => Ok(None),
            Some(row) => {
                let result = serde_json::from_value(Value::Object(row.into_iter().collect()))
                    .map_err(|e| StoreError::MalformedRow(e.to_string()))?;
                Ok(Some(result))
            }
        }
    }

    async fn find_by_name_and_type(
        &self,
        name: &str,
        label: &str,
        diff_identifier: &str,
    ) -> Result<SearchOutcome<NodeMatch>, StoreError> {
        let params = Params::from([
            ("name".to_string(), json!(name)),
            ("label".to_string(), json!(label)),
            ("diff_identifier".to_string(), json!(diff_identifier)),
            ("limit".to_string(), json!(NAME_TYPE_SEARCH_LIMIT as u64 + 1)),
        ]);
        let rows = self.run(queries::FIND_BY_NAME_AND_TYPE, params).await?;
        let hits: Vec<NodeMatch> = rows
            .into_iter()
            .map(node_match_from_row)
            .collect::<Result<_, _>>()?;

        let collapsed = collapse_duplicates(hits, diff_identifier);
        if collapsed.len() > NAME_TYPE_SEARCH_LIMIT {
            return Ok(SearchOutcome::Overflow {
                count: collapsed.len(),
            });
        }
        Ok(SearchOutcome::Hits(collapsed))
    }

    async fn find_by_text(
        &self,
        needle: &str,
        diff_identifier: &str,
    ) -> Result<SearchOutcome<NodeMatch>, StoreError> {
        let params = Params::from([
            ("needle".to_string(), json!(needle)),
            ("diff_identifier".to_string(), json!(diff_identifier)),
            ("limit".to_string(), json!(TEXT_SEARCH_LIMIT as u64 + 1)),
        ]);
        let rows = self.run(queries::FIND_BY_TEXT, params).await?;
        let hits: Vec<NodeMatch> = rows
            .into_iter()
            .map(node_match_from_row)
            .collect::<Result<_, _>>()?;

        let collapsed = collapse_duplicates(hits, diff_identifier);
        if collapsed.len() > TEXT_SEARCH_LIMIT {
            return Ok(SearchOutcome::Overflow {
                count: collapsed.len(),
            });
        }
        Ok(SearchOutcome::Hits(collapsed))
    }

    async fn node_content(&self, node_id: &str) -> Result<Option<NodeContent>, StoreError> {
        let params = Params::from([("node_id".to_string(), json!(node_id))]);
        let mut rows = self.content_rows(queries::NODE_CONTENT, params).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        })
    }

    async fn hierarchy_children(&self, node_id: &str) -> Result<Vec<NodeContent>, StoreError> {
        let params = Params::from([("node_id".to_string(), json!(node_id))]);
        self.content_rows(queries::HIERARCHY_CHILDREN, params).await
    }

    async fn call_children(&self, node_id: &str) -> Result<Vec<NodeContent>, StoreError> {
        let params = Params::from([("node_id".to_string(), json!(node_id))]);
        self.content_rows(queries::CALL_CHILDREN, params).await
    }

    async fn claim_leaf_batch(
        &self,
        run_id: &str,
        batch_size: usize,
    ) -> Result<Vec<NodeContent>, StoreError> {
        let params = Params::from([
            ("run_id".to_string(), json!(run_id)),
            ("batch_size".to_string(), json!(batch_size as u64)),
        ]);
        self.content_rows(queries::CLAIM_LEAF_BATCH, params).await
    }

    async fn claim_ready_batch(
        &self,
        run_id: &str,
        batch_size: usize,
    ) -> Result<Vec<ReadyNode>, StoreError> {
        let params = Params::from([
            ("run_id".to_string(), json!(run_id)),
            ("batch_size".to_string(), json!(batch_size as u64)),
        ]);
        let rows = self.run(queries::CLAIM_READY_BATCH, params).await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let hierarchy_context = context_from_value(row.get("hierarchy_context"))?;
            let call_context = context_from_value(row.get("call_context"))?;
            let node = node_content_from_row(
                row.into_iter()
                    .filter(|(key, _)| key != "hierarchy_context" && key != "call_context")
                    .collect(),
            )?;
            out.push(ReadyNode {
                node,
                hierarchy_context,
                call_context,
            });
        }
        Ok(out)
    }

    async fn mark_completed(&self, run_id: &str, node_ids: &[String]) -> Result<u64, StoreError> {
        let params = Params::from([
            ("run_id".to_string(), json!(run_id)),
            ("node_ids".to_string(), json!(node_ids)),
        ]);
        self.run_count(queries::MARK_COMPLETED, params, "completed").await
    }

    async fn count_pending(&self) -> Result<u64, StoreError> {
        self.run_count(queries::COUNT_PENDING, Params::new(), "pending").await
    }

    async fn reset_run(&self, run_id: &str) -> Result<u64, StoreError> {
        let params = Params::from([("run_id".to_string(), json!(run_id))]);
        self.run_count(queries::RESET_RUN, params, "reset").await
    }
}
