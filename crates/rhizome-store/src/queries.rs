//! Cypher templates for the Neo4j backend
//!
//! Parameters are always passed out-of-band; nothing here is ever
//! string-interpolated. Tenancy keys (`$repo_id`, `$entity_id`) scope
//! every statement.

/// Batched node merge. Merge key is `(repo_id, entity_id, node_id)`;
/// attributes overwrite on match, extra labels union via the label list.
pub const UPSERT_NODES: &str = "
UNWIND $rows AS row
CALL apoc.merge.node(
    row.extra_labels + [row.type, 'NODE'],
    {repo_id: $repo_id, entity_id: $entity_id, node_id: row.attributes.node_id},
    row.attributes,
    row.attributes
)
YIELD node
RETURN count(node) AS upserted
";

/// Batched edge merge, idempotent on `(source, target, type)`.
pub const UPSERT_EDGES: &str = "
UNWIND $rows AS row
MATCH (source:NODE {node_id: row.sourceId, repo_id: $repo_id, entity_id: $entity_id})
MATCH (target:NODE {node_id: row.targetId, repo_id: $repo_id, entity_id: $entity_id})
CALL apoc.merge.relationship(
    source,
    row.type,
    {},
    {scopeText: row.scopeText, startLine: row.startLine, referenceCharacter: row.referenceCharacter},
    target,
    {scopeText: row.scopeText, startLine: row.startLine, referenceCharacter: row.referenceCharacter}
)
YIELD rel
RETURN count(rel) AS upserted
";

pub const DELETE_BY_PATH: &str = "
MATCH (n:NODE {path: $path, repo_id: $repo_id, entity_id: $entity_id})
DETACH DELETE n
RETURN count(*) AS deleted
";

pub const GET_NODE_BY_ID: &str = "
MATCH (n:NODE {node_id: $node_id, repo_id: $repo_id, entity_id: $entity_id})
RETURN n.node_id AS node_id,
       n.name AS name,
       labels(n) AS labels,
       n.path AS path,
       n.node_path AS node_path,
       n.diff_identifier AS diff_identifier,
       n.text AS code,
       n.diff_text AS diff_text
LIMIT 1
";

/// Exact-name search; the overlay filter admits the base graph and the
/// active diff, and tombstones are excluded. `$limit` is the cap plus
/// one so the caller can detect overflow.
pub const FIND_BY_NAME_AND_TYPE: &str = "
MATCH (n:NODE {name: $name, repo_id: $repo_id, entity_id: $entity_id})
WHERE (n.diff_identifier = $diff_identifier OR n.diff_identifier = '0')
  AND $label IN labels(n)
  AND NOT (n)-[:DELETED]->()
  AND NOT ()-[:MODIFIED]->(n)
RETURN n.node_id AS node_id,
       n.name AS name,
       n.label AS label,
       n.node_path AS node_path,
       n.diff_identifier AS diff_identifier,
       n.text AS text,
       n.diff_text AS diff_text
LIMIT $limit
";

pub const FIND_BY_TEXT: &str = "
MATCH (n:NODE {repo_id: $repo_id, entity_id: $entity_id})
WHERE n.layer = 'code'
  AND (n.diff_identifier = $diff_identifier OR n.diff_identifier = '0')
  AND (n.text CONTAINS $needle OR n.node_path CONTAINS $needle)
  AND NOT (n)-[:DELETED]->()
  AND NOT ()-[:MODIFIED]->(n)
RETURN n.node_id AS node_id,
       n.name AS name,
       n.label AS label,
       n.node_path AS node_path,
       n.diff_identifier AS diff_identifier,
       n.text AS text,
       n.diff_text AS diff_text
LIMIT $limit
";

pub const NODE_CONTENT: &str = "
MATCH (n:NODE {node_id: $node_id, repo_id: $repo_id, entity_id: $entity_id})
RETURN n.node_id AS id,
       n.name AS name,
       labels(n) AS labels,
       n.path AS path,
       n.node_path AS node_path,
       n.start_line AS start_line,
       n.end_line AS end_line,
       coalesce(n.text, '') AS content
LIMIT 1
";

pub const HIERARCHY_CHILDREN: &str = "
MATCH (n:NODE {node_id: $node_id, repo_id: $repo_id, entity_id: $entity_id})
      -[:CONTAINS|FUNCTION_DEFINITION|CLASS_DEFINITION]->(c:NODE)
WHERE c.layer = 'code'
  AND NOT (c)-[:DELETED]->()
  AND NOT ()-[:MODIFIED]->(c)
RETURN DISTINCT c.node_id AS id,
       c.name AS name,
       labels(c) AS labels,
       c.path AS path,
       c.node_path AS node_path,
       c.start_line AS start_line,
       c.end_line AS end_line,
       coalesce(c.text, '') AS content
";

pub const CALL_CHILDREN: &str = "
MATCH (n:NODE {node_id: $node_id, repo_id: $repo_id, entity_id: $entity_id})
      -[:CALLS|USES]->(c:NODE)
WHERE c.layer = 'code'
  AND NOT (c)-[:DELETED]->()
  AND NOT ()-[:MODIFIED]->(c)
RETURN DISTINCT c.node_id AS id,
       c.name AS name,
       labels(c) AS labels,
       c.path AS path,
       c.node_path AS node_path,
       c.start_line AS start_line,
       c.end_line AS end_line,
       coalesce(c.text, '') AS content
";

/// Claim the leaf wavefront: unprocessed functions with no calls, or
/// files with no definitions and no calls. Claimed rows are stamped
/// `in_progress` with the run id before they are returned.
pub const CLAIM_LEAF_BATCH: &str = "
MATCH (n:NODE {repo_id: $repo_id, entity_id: $entity_id})
WHERE n.processing_status IS NULL
  AND n.layer = 'code'
  AND NOT (n)-[:DELETED]->()
  AND NOT ()-[:MODIFIED]->(n)
  AND (
    ('FUNCTION' IN labels(n) AND NOT (n)-[:CALLS|USES]->(:NODE))
    OR
    ('FILE' IN labels(n)
     AND NOT (n)-[:FUNCTION_DEFINITION|CLASS_DEFINITION]->(:NODE)
     AND NOT (n)-[:CALLS|USES]->(:NODE))
  )
WITH n LIMIT $batch_size
SET n.processing_status = 'in_progress',
    n.processing_run_id = $run_id
RETURN n.node_id AS id,
       n.name AS name,
       labels(n) AS labels,
       n.path AS path,
       n.node_path AS node_path,
       n.start_line AS start_line,
       n.end_line AS end_line,
       coalesce(n.text, '') AS content
";

/// Claim the ready wavefront: nodes whose hierarchy children (and call
/// children, for functions) are all completed, with the children's
/// descriptions fetched in the same statement.
pub const CLAIM_READY_BATCH: &str = "
MATCH (n:NODE {repo_id: $repo_id, entity_id: $entity_id})
WHERE n.processing_status IS NULL
  AND n.layer = 'code'
  AND NOT (n)-[:DELETED]->()
  AND NOT ()-[:MODIFIED]->(n)

OPTIONAL MATCH (n)-[:CONTAINS|FUNCTION_DEFINITION|CLASS_DEFINITION]->(hier_child:NODE)
WHERE hier_child.layer = 'code'
WITH n, collect(DISTINCT hier_child) AS hier_children
WHERE ALL(child IN hier_children WHERE child.processing_status = 'completed')

OPTIONAL MATCH (n)-[:CALLS|USES]->(call_child:NODE)
WHERE 'FUNCTION' IN labels(n) AND call_child.layer = 'code'
WITH n, hier_children, collect(DISTINCT call_child) AS call_children
WHERE ALL(child IN call_children WHERE child.processing_status = 'completed')

WITH n, hier_children, call_children
LIMIT $batch_size

SET n.processing_status = 'in_progress',
    n.processing_run_id = $run_id

WITH n, hier_children, call_children
RETURN n.node_id AS id,
       n.name AS name,
       labels(n) AS labels,
       n.path AS path,
       n.node_path AS node_path,
       n.start_line AS start_line,
       n.end_line AS end_line,
       coalesce(n.text, '') AS content,
       [child IN hier_children |
         {id: child.node_id, name: child.name, labels: labels(child), path: child.path,
          description: head([(doc:DOCUMENTATION)-[:DESCRIBES]->(child) | doc.content])}
       ] AS hierarchy_context,
       [child IN call_children |
         {id: child.node_id, name: child.name, labels: labels(child), path: child.path,
          description: head([(doc:DOCUMENTATION)-[:DESCRIBES]->(child) | doc.content])}
       ] AS call_context
";

pub const MARK_COMPLETED: &str = "
UNWIND $node_ids AS node_id
MATCH (n:NODE {node_id: node_id, repo_id: $repo_id, entity_id: $entity_id})
WHERE n.processing_run_id = $run_id
SET n.processing_status = 'completed'
RETURN count(n) AS completed
";

pub const COUNT_PENDING: &str = "
MATCH (n:NODE {repo_id: $repo_id, entity_id: $entity_id})
WHERE n.processing_status IS NULL
  AND n.layer = 'code'
  AND NOT (n)-[:DELETED]->()
  AND NOT ()-[:MODIFIED]->(n)
RETURN count(n) AS pending
";

pub const RESET_RUN: &str = "
MATCH (n:NODE {repo_id: $repo_id, entity_id: $entity_id})
WHERE n.processing_run_id = $run_id
  AND n.processing_status = 'in_progress'
REMOVE n.processing_status, n.processing_run_id
RETURN count(n) AS reset
";
