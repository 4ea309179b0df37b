//! Acceso al store de grafos. El núcleo sólo habla con `GraphStore`; la
//! implementación real es Neo4j y los tests usan un store en memoria.

use anyhow::Result;
use async_trait::async_trait;

use crate::config::EdgeScope;
use crate::models::{
    ContextRow, EmbeddingSample, IndexDescriptor, Scope, SnapshotRow, VectorSchema,
};

#[cfg(test)]
pub mod memory;
pub mod neo4j;

pub use self::neo4j::Neo4jStore;

/// Superficie de consultas que necesita el subsistema de reconciliación.
///
/// Cada método es una única ida y vuelta al store; las sesiones se obtienen
/// del pool al empezar y se devuelven al terminar, también en caso de error.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Estampa `scope` (y la procedencia, si la hay) en todos los nodos que
    /// no tienen ninguna propiedad de ámbito (`SCOPE_PROPERTIES`). Devuelve
    /// cuántos se modificaron.
    async fn tag_untagged(&self, scope: &Scope, provenance: Option<&str>) -> Result<u64>;

    /// Devuelve como mucho un nodo que tenga `property`, restringido a
    /// `label` si se indica.
    async fn sample_embedding(
        &self,
        property: &str,
        label: Option<&str>,
    ) -> Result<Option<EmbeddingSample>>;

    async fn find_index(&self, name: &str) -> Result<Option<IndexDescriptor>>;

    /// `DROP INDEX ... IF EXISTS`.
    async fn drop_index(&self, name: &str) -> Result<()>;

    /// `CREATE VECTOR INDEX ... IF NOT EXISTS` con similitud coseno.
    async fn create_vector_index(&self, name: &str, schema: &VectorSchema) -> Result<()>;

    /// Recorrido `(n, r, m)` acotado a `row_cap` filas, en el orden del store.
    async fn snapshot_rows(
        &self,
        scope_id: Option<&str>,
        edge_scope: EdgeScope,
        row_cap: usize,
    ) -> Result<Vec<SnapshotRow>>;

    /// Coincidencias por subcadena en `text` o `name`, sin ranking.
    async fn lexical_search(
        &self,
        scope_id: Option<&str>,
        query_text: &str,
        result_cap: usize,
    ) -> Result<Vec<ContextRow>>;

    /// Vecinos más cercanos sobre el índice `index_name`, de mayor a menor score.
    async fn vector_search(
        &self,
        index_name: &str,
        embedding: &[f64],
        top_k: usize,
        scope_id: Option<&str>,
    ) -> Result<Vec<ContextRow>>;

    /// Health check barato (`RETURN 1`).
    async fn ping(&self) -> Result<()>;

    /// Libera el pool de conexiones. Idempotente.
    async fn close(&self);
}
