//! Pipeline de ingesta: convierte un fichero en el grafo
//! File → Document → Chunk (con embeddings) → Entity.
//!
//! El pipeline no escribe `case_id`: el etiquetado lo hace después
//! `TaggingReconciler`, con la ingesta serializada por el servicio.

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mime_guess::MimeGuess;
use neo4rs::{query, Txn};
use tracing::info;
use uuid::Uuid;

use crate::{
    llm::{Embedder, ExtractionResult, LlmManager},
    models::{ChunkNode, DocumentNode, FileNode},
    store::{neo4j::quote_identifier, Neo4jStore},
};

const MAX_CHUNK_CHARS: usize = 1200;

/// Resumen de una ingesta.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestionSummary {
    pub chunks_created: usize,
    pub entities_created: usize,
    pub relations_created: usize,
}

impl std::fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} chunks, {} entidades y {} relaciones creadas.",
            self.chunks_created, self.entities_created, self.relations_created
        )
    }
}

/// Colaborador que escribe en el grafo los nodos de un fichero.
#[async_trait]
pub trait IngestionPipeline: Send + Sync {
    /// Preparación del esquema que necesite el pipeline. Idempotente.
    async fn prepare(&self) -> Result<()> {
        Ok(())
    }

    async fn run(&self, file_path: &Path) -> Result<IngestionSummary>;
}

pub struct KgPipeline {
    store: Arc<Neo4jStore>,
    llm: LlmManager,
}

impl KgPipeline {
    pub fn new(store: Arc<Neo4jStore>, llm: LlmManager) -> Self {
        Self { store, llm }
    }
}

#[async_trait]
impl IngestionPipeline for KgPipeline {
    /// Crea constraints básicos para :File, :Document, :Chunk y :Entity.
    async fn prepare(&self) -> Result<()> {
        let graph = self.store.graph()?;
        let statements = [
            "CREATE CONSTRAINT file_id IF NOT EXISTS FOR (f:File) REQUIRE f.id IS UNIQUE",
            "CREATE CONSTRAINT doc_id IF NOT EXISTS FOR (d:Document) REQUIRE d.id IS UNIQUE",
            "CREATE CONSTRAINT chunk_id IF NOT EXISTS FOR (c:Chunk) REQUIRE c.id IS UNIQUE",
            "CREATE CONSTRAINT entity_id IF NOT EXISTS FOR (e:Entity) REQUIRE e.id IS UNIQUE",
        ];
        for stmt in statements {
            graph.run(query(stmt)).await?;
        }
        info!("Esquema de Neo4j asegurado (constraints básicos creados).");
        Ok(())
    }

    async fn run(&self, path: &Path) -> Result<IngestionSummary> {
        let metadata = fs::metadata(path)
            .with_context(|| format!("No se puede leer {}", path.display()))?;
        let text = extract_text(path.to_path_buf()).await?;

        let modified: DateTime<Utc> = metadata
            .modified()
            .ok()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(Utc::now);
        let path_str = path.to_string_lossy().to_string();
        let filename = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path_str.clone());

        let file_node = FileNode {
            id: path_str.clone(),
            path: path_str.clone(),
            filename: filename.clone(),
            size_bytes: metadata.len() as i64,
            modified_at: modified.to_rfc3339(),
            mime_type: MimeGuess::from_path(path).first().map(|m| m.to_string()),
        };
        let doc_node = DocumentNode {
            id: Uuid::new_v4().to_string(),
            title: filename.clone(),
            source: path_str,
        };

        let raw_chunks = split_into_chunks(&text, MAX_CHUNK_CHARS);
        if raw_chunks.is_empty() {
            return Err(anyhow!("Fichero vacío o sin texto útil: {}", path.display()));
        }

        // --- Fase 1: Embeddings ---
        let vectors = self.llm.embed_many(&raw_chunks).await?;
        if vectors.len() != raw_chunks.len() {
            return Err(anyhow!(
                "Número de embeddings ({}) distinto al número de chunks ({})",
                vectors.len(),
                raw_chunks.len()
            ));
        }
        let chunk_nodes: Vec<ChunkNode> = raw_chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(idx, (text, embedding))| ChunkNode {
                id: Uuid::new_v4().to_string(),
                document_id: doc_node.id.clone(),
                index: idx as i64,
                text,
                embedding,
            })
            .collect();

        // --- Fase 2: Extracción de Entidades y Relaciones ---
        let mut extractions = Vec::with_capacity(chunk_nodes.len());
        for chunk in &chunk_nodes {
            let extraction = self.llm.extract_entities_and_relations(&chunk.text).await?;
            extractions.push((chunk.id.clone(), extraction));
        }

        let graph = self.store.graph()?;
        let tx = graph.start_txn().await?;
        let (entities_created, relations_created) =
            upsert_graph_data(&tx, &file_node, &doc_node, &chunk_nodes, &extractions).await?;
        tx.commit().await?;

        let summary = IngestionSummary {
            chunks_created: chunk_nodes.len(),
            entities_created,
            relations_created,
        };
        info!("Ingerido {}: {summary}", path.display());
        Ok(summary)
    }
}

/// Extrae el texto según la extensión. `pdf_extract` es bloqueante y va a
/// `spawn_blocking`.
async fn extract_text(path: PathBuf) -> Result<String> {
    let extension = path
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "pdf" => tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text(&path)
                .map_err(|e| anyhow!("No se pudo extraer texto del PDF {}: {e}", path.display()))
        })
        .await?,
        "txt" | "md" | "html" | "htm" => fs::read_to_string(&path)
            .with_context(|| format!("Fichero no-texto o no-UTF8: {}", path.display())),
        other => Err(anyhow!(
            "Extensión no soportada ('.{other}'): {}",
            path.display()
        )),
    }
}

/// Persiste el grafo completo del fichero, incluyendo entidades y relaciones.
async fn upsert_graph_data(
    tx: &Txn,
    file: &FileNode,
    doc: &DocumentNode,
    chunks: &[ChunkNode],
    extractions: &[(String, ExtractionResult)],
) -> Result<(usize, usize)> {
    // 1) File
    tx.run(
        query(
            "MERGE (f:File {id: $id})
             SET f.path = $path, f.name = $filename, f.size_bytes = $size_bytes,
                 f.modified_at = datetime($modified_at), f.mime_type = $mime_type",
        )
        .param("id", file.id.clone())
        .param("path", file.path.clone())
        .param("filename", file.filename.clone())
        .param("size_bytes", file.size_bytes)
        .param("modified_at", file.modified_at.clone())
        .param("mime_type", file.mime_type.clone().unwrap_or_default()),
    )
    .await?;

    // 2) Document
    tx.run(
        query(
            "MERGE (d:Document {id: $id})
             SET d.name = $title, d.source = $source
             WITH d MATCH (f:File {id: $file_id}) MERGE (f)-[:HAS_DOCUMENT]->(d)",
        )
        .param("id", doc.id.clone())
        .param("title", doc.title.clone())
        .param("source", doc.source.clone())
        .param("file_id", file.id.clone()),
    )
    .await?;

    // 3) Chunks y relaciones NEXT_CHUNK
    let mut prev_chunk_id: Option<&str> = None;
    for chunk in chunks {
        tx.run(
            query(
                "MERGE (c:Chunk {id: $id})
                 SET c.index = $index, c.text = $text, c.embedding = $embedding
                 WITH c MATCH (d:Document {id: $doc_id}) MERGE (d)-[:HAS_CHUNK]->(c)",
            )
            .param("id", chunk.id.clone())
            .param("index", chunk.index)
            .param("text", chunk.text.clone())
            .param("embedding", chunk.embedding.clone())
            .param("doc_id", chunk.document_id.clone()),
        )
        .await?;

        if let Some(prev_id) = prev_chunk_id {
            tx.run(
                query("MATCH (c1:Chunk {id: $prev_id}), (c2:Chunk {id: $id}) MERGE (c1)-[:NEXT_CHUNK]->(c2)")
                    .param("prev_id", prev_id)
                    .param("id", chunk.id.clone()),
            )
            .await?;
        }
        prev_chunk_id = Some(&chunk.id);
    }

    // --- Entidades, menciones y relaciones ---
    let plan = plan_entities(extractions);

    // 4) Nodos de Entidad, propios de este documento
    for entity in &plan.entities {
        let cypher = format!(
            "MERGE (e:Entity {{id: $id}})
             SET e:{}, e.name = $name, e.source_document = $doc_id",
            quote_identifier(&entity.label)
        );
        tx.run(
            query(&cypher)
                .param("id", entity.key.clone())
                .param("name", entity.name.clone())
                .param("doc_id", doc.id.clone()),
        )
        .await?;
    }

    // 5) (Chunk)-[:MENTIONS]->(Entity)
    for (chunk_id, entity_key) in &plan.mentions {
        tx.run(
            query("MATCH (c:Chunk {id: $cid}), (e:Entity {id: $eid}) MERGE (c)-[:MENTIONS]->(e)")
                .param("cid", chunk_id.clone())
                .param("eid", entity_key.clone()),
        )
        .await?;
    }

    // 6) (Entity)-[:PREDICADO]->(Entity); el tipo de relación viene del LLM.
    for (subject, rel_type, object) in &plan.relations {
        let cypher = format!(
            "MATCH (s:Entity {{id: $subj}}), (o:Entity {{id: $obj}}) MERGE (s)-[:{}]->(o)",
            quote_identifier(rel_type)
        );
        tx.run(
            query(&cypher)
                .param("subj", subject.clone())
                .param("obj", object.clone()),
        )
        .await?;
    }

    Ok((plan.entities.len(), plan.relations.len()))
}

#[derive(Debug, Clone, PartialEq)]
struct PlannedEntity {
    key: String,
    name: String,
    label: String,
}

/// Entidades de una ingesta con claves nuevas: el mismo nombre en otro
/// documento (u otro caso) es otro nodo, y el etiquetado lo atribuye a esta
/// ingesta.
#[derive(Debug, Default)]
struct EntityPlan {
    entities: Vec<PlannedEntity>,
    /// (chunk id, clave de entidad)
    mentions: Vec<(String, String)>,
    /// (clave sujeto, tipo de relación, clave objeto)
    relations: Vec<(String, String, String)>,
}

fn plan_entities(extractions: &[(String, ExtractionResult)]) -> EntityPlan {
    let mut plan = EntityPlan::default();
    let mut keys: HashMap<String, usize> = HashMap::new();

    for (chunk_id, extraction) in extractions {
        for entity in &extraction.entities {
            let idx = *keys.entry(entity.id.clone()).or_insert_with(|| {
                plan.entities.push(PlannedEntity {
                    key: Uuid::new_v4().to_string(),
                    name: entity.id.clone(),
                    label: entity.label.clone(),
                });
                plan.entities.len() - 1
            });
            let mention = (chunk_id.clone(), plan.entities[idx].key.clone());
            if !plan.mentions.contains(&mention) {
                plan.mentions.push(mention);
            }
        }
    }

    let mut seen = HashSet::new();
    for (_, extraction) in extractions {
        for rel in &extraction.relations {
            let (Some(&s), Some(&o)) = (keys.get(&rel.subject), keys.get(&rel.object)) else {
                continue;
            };
            let relation = (
                plan.entities[s].key.clone(),
                relation_type(&rel.predicate),
                plan.entities[o].key.clone(),
            );
            if seen.insert(relation.clone()) {
                plan.relations.push(relation);
            }
        }
    }
    plan
}

/// Normaliza un predicado a tipo de relación: MAYÚSCULAS_CON_GUIONES.
fn relation_type(predicate: &str) -> String {
    let normalized: String = predicate
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    let normalized = normalized.trim_matches('_');
    if normalized.is_empty() {
        "RELATED_TO".to_string()
    } else {
        normalized.to_string()
    }
}

fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        if current.len() + paragraph.len() + 2 > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
