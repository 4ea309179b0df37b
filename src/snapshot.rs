//! Vista del grafo para visualización.
//!
//! La vista es truncada, no exhaustiva: son las primeras `row_cap` filas en el
//! orden que devuelve el store, no una muestra representativa.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use crate::config::{AppConfig, EdgeScope};
use crate::models::{GraphSnapshot, NodeRecord, SnapshotRow, VisEdge, VisNode};
use crate::store::GraphStore;

const UNKNOWN_LABEL: &str = "Unknown";
const DEFAULT_NODE_TYPE: &str = "Node";

/// Etiqueta visible: `name`, si no `id`, si no "Unknown".
pub fn display_label(node: &NodeRecord) -> String {
    node.name
        .clone()
        .or_else(|| node.id.clone())
        .unwrap_or_else(|| UNKNOWN_LABEL.to_string())
}

/// Tipo visible: la primera etiqueta del nodo, si no "Node".
pub fn display_type(node: &NodeRecord) -> String {
    node.labels
        .first()
        .cloned()
        .unwrap_or_else(|| DEFAULT_NODE_TYPE.to_string())
}

/// Mapa ordenado por identidad de nodo en el que gana la primera aparición.
#[derive(Debug, Default)]
pub struct NodeFold {
    nodes: Vec<VisNode>,
    positions: HashMap<String, usize>,
}

impl NodeFold {
    /// Inserta el nodo si su identidad no se ha visto. Devuelve `true` si lo
    /// insertó.
    pub fn insert(&mut self, node: &NodeRecord) -> bool {
        if self.positions.contains_key(&node.identity) {
            return false;
        }
        self.positions.insert(node.identity.clone(), self.nodes.len());
        self.nodes.push(VisNode {
            id: node.identity.clone(),
            label: display_label(node),
            node_type: display_type(node),
        });
        true
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.positions.contains_key(identity)
    }

    pub fn get(&self, identity: &str) -> Option<&VisNode> {
        self.positions.get(identity).map(|&i| &self.nodes[i])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn into_nodes(self) -> Vec<VisNode> {
        self.nodes
    }
}

/// Pliega las filas `(n, r, m)` en nodos deduplicados y aristas. Las aristas
/// no se deduplican; sólo se emiten si sus dos extremos están en la vista.
pub fn fold_rows(rows: &[SnapshotRow]) -> GraphSnapshot {
    let mut fold = NodeFold::default();
    let mut edges = Vec::new();

    for row in rows {
        if let Some(n) = &row.n {
            fold.insert(n);
        }
        if let Some(m) = &row.m {
            fold.insert(m);
        }
        if let Some(r) = &row.r {
            if fold.contains(&r.source) && fold.contains(&r.target) {
                edges.push(VisEdge {
                    source: r.source.clone(),
                    target: r.target.clone(),
                    label: r.rel_type.clone(),
                });
            }
        }
    }

    GraphSnapshot {
        nodes: fold.into_nodes(),
        edges,
    }
}

#[derive(Clone)]
pub struct SnapshotAggregator {
    store: Arc<dyn GraphStore>,
    row_cap: usize,
    edge_scope: EdgeScope,
}

impl SnapshotAggregator {
    pub fn new(store: Arc<dyn GraphStore>, row_cap: usize, edge_scope: EdgeScope) -> Self {
        Self {
            store,
            row_cap,
            edge_scope,
        }
    }

    pub fn from_config(store: Arc<dyn GraphStore>, cfg: &AppConfig) -> Self {
        Self::new(store, cfg.snapshot_row_cap, cfg.snapshot_edge_scope)
    }

    pub fn row_cap(&self) -> usize {
        self.row_cap
    }

    /// Una sola consulta acotada a `row_cap` filas, filtrada por caso si se indica.
    pub async fn snapshot(&self, scope_id: Option<&str>) -> Result<GraphSnapshot> {
        let rows = self
            .store
            .snapshot_rows(scope_id, self.edge_scope, self.row_cap)
            .await?;
        Ok(fold_rows(&rows))
    }
}
