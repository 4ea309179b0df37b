//! Implementación de `GraphStore` sobre Neo4j (`neo4rs`).

use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use neo4rs::{query, Graph, Node, Relation, Row};
use tracing::{debug, info};
use url::Url;

use super::GraphStore;
use crate::config::{AppConfig, EdgeScope};
use crate::models::{
    ContextRow, EmbeddingSample, IndexDescriptor, NodeRecord, RelationRecord, Scope, SnapshotRow,
    VectorSchema, CASE_ID_PROPERTY, DOCUMENT_PATH_PROPERTY, SCOPE_PROPERTIES,
};

/// Factor de sobremuestreo de la búsqueda vectorial cuando hay que filtrar
/// por caso después de consultar el índice.
const SCOPED_VECTOR_OVERFETCH: usize = 4;

pub struct Neo4jStore {
    graph: RwLock<Option<Arc<Graph>>>,
}

impl Neo4jStore {
    pub async fn connect(cfg: &AppConfig) -> Result<Self> {
        let graph = connect_from_config(cfg).await?;
        Ok(Self {
            graph: RwLock::new(Some(Arc::new(graph))),
        })
    }

    /// Handle compartido al pool. Falla si el store ya se cerró.
    pub fn graph(&self) -> Result<Arc<Graph>> {
        self.graph
            .read()
            .map_err(|_| anyhow!("Lock del store de Neo4j envenenado"))?
            .clone()
            .ok_or_else(|| anyhow!("La conexión con Neo4j está cerrada"))
    }
}

pub async fn connect_from_config(cfg: &AppConfig) -> Result<Graph> {
    let url = Url::parse(&cfg.neo4j_uri)?;
    let host = url.host_str().unwrap_or("localhost");
    let port = url.port().unwrap_or(7687);
    let addr = format!("{host}:{port}");

    info!("Conectando a Neo4j en {addr}...");
    let graph = Graph::new(&addr, &cfg.neo4j_user, &cfg.neo4j_password).await?;
    info!("Conexión a Neo4j OK");
    Ok(graph)
}

/// Escapa un identificador de Cypher (etiqueta, propiedad, nombre de índice).
/// Las etiquetas detectadas vienen del propio store y no pueden ir como parámetro.
pub fn quote_identifier(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

fn node_record(node: &Node) -> NodeRecord {
    NodeRecord {
        identity: node.id().to_string(),
        labels: node.labels(),
        name: scalar_as_string(node, "name"),
        id: scalar_as_string(node, "id"),
    }
}

/// `name`/`id` pueden ser texto o enteros según quién escribió el nodo.
fn scalar_as_string(node: &Node, key: &str) -> Option<String> {
    node.get::<String>(key)
        .or_else(|| node.get::<i64>(key).map(|v| v.to_string()))
}

fn relation_record(rel: &Relation) -> RelationRecord {
    RelationRecord {
        identity: rel.id().to_string(),
        rel_type: rel.typ(),
        source: rel.start_node_id().to_string(),
        target: rel.end_node_id().to_string(),
    }
}

fn context_row(row: &Row) -> ContextRow {
    ContextRow {
        text: row.get::<String>("text"),
        name: row.get::<String>("name"),
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn tag_untagged(&self, scope: &Scope, provenance: Option<&str>) -> Result<u64> {
        let graph = self.graph()?;
        let prop = quote_identifier(scope.property());
        let untagged = SCOPE_PROPERTIES
            .iter()
            .map(|p| format!("n.{} IS NULL", quote_identifier(p)))
            .collect::<Vec<_>>()
            .join(" AND ");
        let cypher = match provenance {
            Some(_) => format!(
                "MATCH (n) WHERE {untagged}
                 SET n.{prop} = $scope_id, n.{path} = $file_path
                 RETURN count(n) AS updated_count",
                path = quote_identifier(DOCUMENT_PATH_PROPERTY)
            ),
            None => format!(
                "MATCH (n) WHERE {untagged}
                 SET n.{prop} = $scope_id
                 RETURN count(n) AS updated_count"
            ),
        };

        let mut q = query(&cypher).param("scope_id", scope.id());
        if let Some(path) = provenance {
            q = q.param("file_path", path);
        }

        let mut cursor = graph.execute(q).await?;
        let updated = match cursor.next().await? {
            Some(row) => row.get::<i64>("updated_count").unwrap_or(0),
            None => 0,
        };
        Ok(updated.max(0) as u64)
    }

    async fn sample_embedding(
        &self,
        property: &str,
        label: Option<&str>,
    ) -> Result<Option<EmbeddingSample>> {
        let graph = self.graph()?;
        let pattern = match label {
            Some(label) => format!("(n:{})", quote_identifier(label)),
            None => "(n)".to_string(),
        };
        let prop = quote_identifier(property);
        let cypher = format!(
            "MATCH {pattern} WHERE n.{prop} IS NOT NULL
             RETURN labels(n) AS labels, size(n.{prop}) AS dimensions
             LIMIT 1"
        );

        let mut cursor = graph.execute(query(&cypher)).await?;
        let Some(row) = cursor.next().await? else {
            return Ok(None);
        };
        let labels: Vec<String> = row.get("labels").unwrap_or_default();
        let dimensions: i64 = row
            .get("dimensions")
            .ok_or_else(|| anyhow!("Falta campo 'dimensions' en resultado de Neo4j"))?;
        Ok(Some(EmbeddingSample {
            labels,
            dimensions: dimensions.max(0) as usize,
        }))
    }

    async fn find_index(&self, name: &str) -> Result<Option<IndexDescriptor>> {
        let graph = self.graph()?;
        let mut cursor = graph
            .execute(
                query(
                    "SHOW INDEXES YIELD name, type, labelsOrTypes, properties, state, options
                     WHERE name = $name
                     RETURN name, type, labelsOrTypes, properties, state,
                            options.indexConfig.`vector.dimensions` AS dimensions",
                )
                .param("name", name),
            )
            .await?;

        let Some(row) = cursor.next().await? else {
            return Ok(None);
        };
        Ok(Some(IndexDescriptor {
            name: row.get("name").unwrap_or_else(|| name.to_string()),
            kind: row.get("type").unwrap_or_default(),
            labels: row.get("labelsOrTypes").unwrap_or_default(),
            properties: row.get("properties").unwrap_or_default(),
            dimensions: row.get::<i64>("dimensions").map(|d| d.max(0) as usize),
            state: row.get("state").unwrap_or_default(),
        }))
    }

    async fn drop_index(&self, name: &str) -> Result<()> {
        let graph = self.graph()?;
        let cypher = format!("DROP INDEX {} IF EXISTS", quote_identifier(name));
        graph.run(query(&cypher)).await?;
        debug!("Índice '{name}' eliminado (si existía).");
        Ok(())
    }

    async fn create_vector_index(&self, name: &str, schema: &VectorSchema) -> Result<()> {
        let graph = self.graph()?;
        let cypher = format!(
            "\
CREATE VECTOR INDEX {name} IF NOT EXISTS
FOR (n:{label})
ON (n.{property})
OPTIONS {{
  indexConfig: {{
    `vector.dimensions`: {dimensions},
    `vector.similarity_function`: 'cosine'
  }}
}}",
            name = quote_identifier(name),
            label = quote_identifier(&schema.label),
            property = quote_identifier(&schema.property),
            dimensions = schema.dimensions,
        );
        graph.run(query(&cypher)).await?;
        Ok(())
    }

    async fn snapshot_rows(
        &self,
        scope_id: Option<&str>,
        edge_scope: EdgeScope,
        row_cap: usize,
    ) -> Result<Vec<SnapshotRow>> {
        let graph = self.graph()?;
        let case = quote_identifier(CASE_ID_PROPERTY);
        let cypher = match (scope_id, edge_scope) {
            (None, _) => "MATCH (n)
                 OPTIONAL MATCH (n)-[r]->(m)
                 RETURN n, r, m
                 LIMIT $row_cap"
                .to_string(),
            (Some(_), EdgeScope::BothEndpoints) => format!(
                "MATCH (n) WHERE n.{case} = $scope_id
                 OPTIONAL MATCH (n)-[r]->(m) WHERE m.{case} = $scope_id
                 RETURN n, r, m
                 LIMIT $row_cap"
            ),
            (Some(_), EdgeScope::SourceOnly) => format!(
                "MATCH (n) WHERE n.{case} = $scope_id
                 OPTIONAL MATCH (n)-[r]->(m)
                 RETURN n, r, m
                 LIMIT $row_cap"
            ),
        };

        let mut q = query(&cypher).param("row_cap", row_cap as i64);
        if let Some(scope_id) = scope_id {
            q = q.param("scope_id", scope_id);
        }

        let mut cursor = graph.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = cursor.next().await? {
            rows.push(SnapshotRow {
                n: row.get::<Node>("n").as_ref().map(node_record),
                r: row.get::<Relation>("r").as_ref().map(relation_record),
                m: row.get::<Node>("m").as_ref().map(node_record),
            });
        }
        Ok(rows)
    }

    async fn lexical_search(
        &self,
        scope_id: Option<&str>,
        query_text: &str,
        result_cap: usize,
    ) -> Result<Vec<ContextRow>> {
        let graph = self.graph()?;
        let case = quote_identifier(CASE_ID_PROPERTY);
        let scope_clause = match scope_id {
            Some(_) => format!("n.{case} = $scope_id AND "),
            None => String::new(),
        };
        let cypher = format!(
            "MATCH (n)
             WHERE {scope_clause}(n.text CONTAINS $search_query OR n.name CONTAINS $search_query)
             RETURN n.text AS text, n.name AS name
             LIMIT $result_cap"
        );

        let mut q = query(&cypher)
            .param("search_query", query_text)
            .param("result_cap", result_cap as i64);
        if let Some(scope_id) = scope_id {
            q = q.param("scope_id", scope_id);
        }

        let mut cursor = graph.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = cursor.next().await? {
            rows.push(context_row(&row));
        }
        Ok(rows)
    }

    async fn vector_search(
        &self,
        index_name: &str,
        embedding: &[f64],
        top_k: usize,
        scope_id: Option<&str>,
    ) -> Result<Vec<ContextRow>> {
        let graph = self.graph()?;
        let case = quote_identifier(CASE_ID_PROPERTY);
        let (cypher, fetch_k) = match scope_id {
            Some(_) => (
                format!(
                    "CALL db.index.vector.queryNodes($index_name, $k, $embedding)
                     YIELD node, score
                     WHERE node.{case} = $scope_id
                     RETURN node.text AS text, node.name AS name
                     ORDER BY score DESC
                     LIMIT $top_k"
                ),
                top_k * SCOPED_VECTOR_OVERFETCH,
            ),
            None => (
                "CALL db.index.vector.queryNodes($index_name, $k, $embedding)
                 YIELD node, score
                 RETURN node.text AS text, node.name AS name
                 ORDER BY score DESC
                 LIMIT $top_k"
                    .to_string(),
                top_k,
            ),
        };

        let mut q = query(&cypher)
            .param("index_name", index_name)
            .param("k", fetch_k as i64)
            .param("top_k", top_k as i64)
            .param("embedding", embedding.to_vec());
        if let Some(scope_id) = scope_id {
            q = q.param("scope_id", scope_id);
        }

        let mut cursor = graph.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = cursor.next().await? {
            rows.push(context_row(&row));
        }
        Ok(rows)
    }

    async fn ping(&self) -> Result<()> {
        let graph = self.graph()?;
        graph.run(query("RETURN 1")).await?;
        Ok(())
    }

    async fn close(&self) {
        let released = match self.graph.write() {
            Ok(mut guard) => guard.take().is_some(),
            Err(poisoned) => poisoned.into_inner().take().is_some(),
        };
        if released {
            info!("Conexión con Neo4j liberada.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_identifiers_and_escapes_backticks() {
        assert_eq!(quote_identifier("Chunk"), "`Chunk`");
        assert_eq!(quote_identifier("Legal Entity"), "`Legal Entity`");
        assert_eq!(quote_identifier("a`b"), "`a``b`");
    }
}
