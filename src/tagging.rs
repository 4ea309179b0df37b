//! Etiquetado por caso/documento de los nodos recién ingeridos.
//!
//! Un nodo está sin etiquetar cuando no tiene ni `case_id` ni `document_id`:
//! un ámbito nunca reclama nodos que ya pertenecen al otro.
//!
//! El barrido "todo nodo sin etiqueta pertenece a la última ingesta" sólo es
//! correcto si hay como mucho una ingesta en vuelo. `GraphRagService` lo
//! garantiza serializando ingesta + etiquetado con un mutex; quien llame a
//! `tag_untagged` directamente debe respetar la misma condición.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::models::Scope;
use crate::store::GraphStore;

#[derive(Clone)]
pub struct TaggingReconciler {
    store: Arc<dyn GraphStore>,
}

impl TaggingReconciler {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Estampa `scope` (y `file_path` como procedencia) en todos los nodos
    /// sin la propiedad del ámbito. Idempotente: una segunda llamada sin
    /// ingestas intermedias devuelve 0.
    pub async fn tag_untagged(&self, scope: &Scope, file_path: Option<&str>) -> Result<u64> {
        let updated = self.store.tag_untagged(scope, file_path).await?;
        info!(
            "Etiquetados {updated} nodos con {}: {}",
            scope.property(),
            scope.id()
        );
        Ok(updated)
    }
}
