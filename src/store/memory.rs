//! `GraphStore` en memoria para los tests. Emula la semántica de las consultas
//! Cypher de `Neo4jStore` (orden de inserción como orden del store).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};

use super::GraphStore;
use crate::config::EdgeScope;
use crate::models::{
    ContextRow, EmbeddingSample, IndexDescriptor, NodeRecord, RelationRecord, Scope, SnapshotRow,
    VectorSchema, CASE_ID_PROPERTY, DOCUMENT_PATH_PROPERTY, SCOPE_PROPERTIES,
};

#[derive(Debug, Clone)]
pub struct MemNode {
    pub identity: String,
    pub labels: Vec<String>,
    pub props: Map<String, Value>,
}

#[derive(Debug, Clone)]
struct MemRel {
    identity: String,
    rel_type: String,
    source: String,
    target: String,
}

#[derive(Debug, Default)]
struct State {
    nodes: Vec<MemNode>,
    rels: Vec<MemRel>,
    indexes: Vec<IndexDescriptor>,
    next_id: u64,
}

#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    state: Mutex<State>,
    pub creates: AtomicUsize,
    pub drops: AtomicUsize,
    pub fail_reads: AtomicBool,
    pub fail_samples: AtomicBool,
    pub fail_writes: AtomicBool,
    pub closed: AtomicBool,
}

fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn str_prop(node: &MemNode, key: &str) -> Option<String> {
    match node.props.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn vector_prop(node: &MemNode, key: &str) -> Option<Vec<f64>> {
    node.props
        .get(key)?
        .as_array()
        .map(|arr| arr.iter().filter_map(Value::as_f64).collect())
}

fn record(node: &MemNode) -> NodeRecord {
    NodeRecord {
        identity: node.identity.clone(),
        labels: node.labels.clone(),
        name: str_prop(node, "name"),
        id: str_prop(node, "id"),
    }
}

fn in_case(node: &MemNode, scope_id: &str) -> bool {
    str_prop(node, CASE_ID_PROPERTY).as_deref() == Some(scope_id)
}

fn contains(node: &MemNode, key: &str, needle: &str) -> bool {
    str_prop(node, key).is_some_and(|v| v.contains(needle))
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserta un nodo; `props` debe ser un objeto JSON. Devuelve su identidad.
    pub fn add_node(&self, labels: &[&str], props: Value) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let identity = format!("n{}", state.next_id);
        state.nodes.push(MemNode {
            identity: identity.clone(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            props: props.as_object().cloned().unwrap_or_default(),
        });
        identity
    }

    pub fn add_rel(&self, source: &str, rel_type: &str, target: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let identity = format!("r{}", state.next_id);
        state.rels.push(MemRel {
            identity: identity.clone(),
            rel_type: rel_type.to_string(),
            source: source.to_string(),
            target: target.to_string(),
        });
        identity
    }

    /// Registra un índice tal como lo devolvería `SHOW INDEXES`.
    pub fn put_index(&self, descriptor: IndexDescriptor) {
        let mut state = self.state.lock().unwrap();
        state.indexes.retain(|i| i.name != descriptor.name);
        state.indexes.push(descriptor);
    }

    pub fn index(&self, name: &str) -> Option<IndexDescriptor> {
        let state = self.state.lock().unwrap();
        state.indexes.iter().find(|i| i.name == name).cloned()
    }

    pub fn node(&self, identity: &str) -> Option<MemNode> {
        let state = self.state.lock().unwrap();
        state.nodes.iter().find(|n| n.identity == identity).cloned()
    }

    pub fn nodes(&self) -> Vec<MemNode> {
        self.state.lock().unwrap().nodes.clone()
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("connection refused"));
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("write rejected"));
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn tag_untagged(&self, scope: &Scope, provenance: Option<&str>) -> Result<u64> {
        self.check_writes()?;
        let mut state = self.state.lock().unwrap();
        let mut updated = 0;
        for node in state.nodes.iter_mut() {
            if SCOPE_PROPERTIES.iter().any(|p| node.props.contains_key(*p)) {
                continue;
            }
            node.props
                .insert(scope.property().to_string(), Value::from(scope.id()));
            if let Some(path) = provenance {
                node.props
                    .insert(DOCUMENT_PATH_PROPERTY.to_string(), Value::from(path));
            }
            updated += 1;
        }
        Ok(updated)
    }

    async fn sample_embedding(
        &self,
        property: &str,
        label: Option<&str>,
    ) -> Result<Option<EmbeddingSample>> {
        self.check_reads()?;
        if self.fail_samples.load(Ordering::SeqCst) {
            return Err(anyhow!("Neo.ClientError.Statement.SyntaxError"));
        }
        let state = self.state.lock().unwrap();
        Ok(state
            .nodes
            .iter()
            .filter(|n| label.map_or(true, |l| n.labels.iter().any(|x| x == l)))
            .find_map(|n| {
                vector_prop(n, property).map(|v| EmbeddingSample {
                    labels: n.labels.clone(),
                    dimensions: v.len(),
                })
            }))
    }

    async fn find_index(&self, name: &str) -> Result<Option<IndexDescriptor>> {
        self.check_reads()?;
        Ok(self.index(name))
    }

    async fn drop_index(&self, name: &str) -> Result<()> {
        self.check_writes()?;
        self.drops.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().indexes.retain(|i| i.name != name);
        Ok(())
    }

    async fn create_vector_index(&self, name: &str, schema: &VectorSchema) -> Result<()> {
        self.check_writes()?;
        let mut state = self.state.lock().unwrap();
        if state.indexes.iter().any(|i| i.name == name) {
            return Ok(());
        }
        self.creates.fetch_add(1, Ordering::SeqCst);
        state.indexes.push(IndexDescriptor {
            name: name.to_string(),
            kind: "VECTOR".to_string(),
            labels: vec![schema.label.clone()],
            properties: vec![schema.property.clone()],
            dimensions: Some(schema.dimensions),
            state: "ONLINE".to_string(),
        });
        Ok(())
    }

    async fn snapshot_rows(
        &self,
        scope_id: Option<&str>,
        edge_scope: EdgeScope,
        row_cap: usize,
    ) -> Result<Vec<SnapshotRow>> {
        self.check_reads()?;
        let state = self.state.lock().unwrap();
        let by_id: HashMap<&str, &MemNode> = state
            .nodes
            .iter()
            .map(|n| (n.identity.as_str(), n))
            .collect();

        let mut rows = Vec::new();
        for n in &state.nodes {
            if scope_id.is_some_and(|s| !in_case(n, s)) {
                continue;
            }
            let mut matched = false;
            for rel in state.rels.iter().filter(|r| r.source == n.identity) {
                let Some(m) = by_id.get(rel.target.as_str()) else {
                    continue;
                };
                let keep = match (scope_id, edge_scope) {
                    (Some(s), EdgeScope::BothEndpoints) => in_case(m, s),
                    _ => true,
                };
                if !keep {
                    continue;
                }
                matched = true;
                rows.push(SnapshotRow {
                    n: Some(record(n)),
                    r: Some(RelationRecord {
                        identity: rel.identity.clone(),
                        rel_type: rel.rel_type.clone(),
                        source: rel.source.clone(),
                        target: rel.target.clone(),
                    }),
                    m: Some(record(m)),
                });
            }
            if !matched {
                rows.push(SnapshotRow {
                    n: Some(record(n)),
                    r: None,
                    m: None,
                });
            }
        }
        rows.truncate(row_cap);
        Ok(rows)
    }

    async fn lexical_search(
        &self,
        scope_id: Option<&str>,
        query_text: &str,
        result_cap: usize,
    ) -> Result<Vec<ContextRow>> {
        self.check_reads()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .nodes
            .iter()
            .filter(|n| scope_id.map_or(true, |s| in_case(n, s)))
            .filter(|n| contains(n, "text", query_text) || contains(n, "name", query_text))
            .take(result_cap)
            .map(|n| ContextRow {
                text: str_prop(n, "text"),
                name: str_prop(n, "name"),
            })
            .collect())
    }

    async fn vector_search(
        &self,
        index_name: &str,
        embedding: &[f64],
        top_k: usize,
        scope_id: Option<&str>,
    ) -> Result<Vec<ContextRow>> {
        self.check_reads()?;
        let index = self
            .index(index_name)
            .ok_or_else(|| anyhow!("There is no such vector schema index: {index_name}"))?;
        let property = index.properties.first().cloned().unwrap_or_default();
        let state = self.state.lock().unwrap();

        let mut scored: Vec<(f64, &MemNode)> = state
            .nodes
            .iter()
            .filter(|n| n.labels.iter().any(|l| index.labels.contains(l)))
            .filter(|n| scope_id.map_or(true, |s| in_case(n, s)))
            .filter_map(|n| {
                let v = vector_prop(n, &property)?;
                (v.len() == embedding.len()).then(|| (cosine_similarity(&v, embedding), n))
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(_, n)| ContextRow {
                text: str_prop(n, "text"),
                name: str_prop(n, "name"),
            })
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        self.check_reads()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
