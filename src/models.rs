//! Modelos de dominio: nodos del grafo Neo4j tal y como los ve el servicio,
//! ámbitos de etiquetado, descriptores de índice y vista de visualización.

use serde::Serialize;

/// Propiedad que marca el caso al que pertenece un nodo.
pub const CASE_ID_PROPERTY: &str = "case_id";
/// Propiedad que marca el documento al que pertenece un nodo.
pub const DOCUMENT_ID_PROPERTY: &str = "document_id";
/// Propiedad de procedencia: ruta del fichero ingerido.
pub const DOCUMENT_PATH_PROPERTY: &str = "document_path";
/// Un nodo sin ninguna de estas propiedades todavía no pertenece a ninguna
/// ingesta, sea cual sea el ámbito con el que se etiquetó.
pub const SCOPE_PROPERTIES: [&str; 2] = [CASE_ID_PROPERTY, DOCUMENT_ID_PROPERTY];

/// Ámbito lógico con el que se etiquetan los nodos recién ingeridos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Case(String),
    Document(String),
}

impl Scope {
    /// Nombre de la propiedad que se estampa en los nodos.
    pub fn property(&self) -> &'static str {
        match self {
            Scope::Case(_) => CASE_ID_PROPERTY,
            Scope::Document(_) => DOCUMENT_ID_PROPERTY,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Scope::Case(id) | Scope::Document(id) => id,
        }
    }
}

/// Nodo leído del store. La identidad es la asignada por Neo4j y sólo es
/// estable dentro de una sesión; nunca se cachea entre peticiones.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub identity: String,
    pub labels: Vec<String>,
    pub name: Option<String>,
    pub id: Option<String>,
}

/// Relación dirigida leída del store.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationRecord {
    pub identity: String,
    pub rel_type: String,
    pub source: String,
    pub target: String,
}

/// Fila `(n, r, m)` de la consulta de la vista del grafo.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRow {
    pub n: Option<NodeRecord>,
    pub r: Option<RelationRecord>,
    pub m: Option<NodeRecord>,
}

/// Fila de contexto textual (`text` y/o `name` de un nodo).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContextRow {
    pub text: Option<String>,
    pub name: Option<String>,
}

/// Metadatos de un índice existente, tal como los devuelve `SHOW INDEXES`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDescriptor {
    pub name: String,
    pub kind: String,
    pub labels: Vec<String>,
    pub properties: Vec<String>,
    pub dimensions: Option<usize>,
    pub state: String,
}

/// Muestra de un nodo con embedding: sus etiquetas y la longitud del vector.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingSample {
    pub labels: Vec<String>,
    pub dimensions: usize,
}

/// Esquema vectorial resuelto con el que se crea el índice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorSchema {
    pub label: String,
    pub property: String,
    pub dimensions: usize,
}

// --- Vista para visualización ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisEdge {
    pub source: String,
    pub target: String,
    pub label: String,
}

/// Vista acotada del grafo: nodos deduplicados en orden de aparición y
/// aristas en el orden en que las devolvió el store.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<VisNode>,
    pub edges: Vec<VisEdge>,
}

// --- Nodos que escribe el pipeline de ingesta ---

/// Representa un nodo (:File) en Neo4j.
#[derive(Debug, Clone)]
pub struct FileNode {
    pub id: String,
    pub path: String,
    pub filename: String,
    pub size_bytes: i64,
    pub modified_at: String,
    pub mime_type: Option<String>,
}

/// Representa un nodo (:Document): contenedor lógico de los chunks.
#[derive(Debug, Clone)]
pub struct DocumentNode {
    pub id: String,
    pub title: String,
    pub source: String,
}

/// Representa un nodo (:Chunk): trozo de texto con su embedding.
#[derive(Debug, Clone)]
pub struct ChunkNode {
    pub id: String,
    pub document_id: String,
    pub index: i64,
    pub text: String,
    pub embedding: Vec<f64>,
}

/// Caso legal: un directorio bajo `UPLOAD_DIR` con sus documentos.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseInfo {
    pub id: String,
    pub name: String,
    pub document_count: usize,
}
