//! Fachada del subsistema de reconciliación: ingesta + etiquetado, índice
//! vectorial, vista del grafo y recuperación de contexto.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::cases::is_valid_case_id;
use crate::config::AppConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::index::{IndexManager, IndexReport};
use crate::ingest::{IngestionPipeline, IngestionSummary};
use crate::llm::Embedder;
use crate::models::{GraphSnapshot, Scope};
use crate::retrieval::{ContextRetriever, NO_CONTEXT_SENTINEL};
use crate::snapshot::SnapshotAggregator;
use crate::store::GraphStore;
use crate::tagging::TaggingReconciler;

/// Resultado de procesar un documento.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProcessReport {
    pub file_path: PathBuf,
    pub scope_property: &'static str,
    pub scope_id: String,
    pub nodes_tagged: u64,
    #[serde(skip)]
    pub summary: IngestionSummary,
}

pub struct GraphRagService {
    store: Arc<dyn GraphStore>,
    pipeline: Arc<dyn IngestionPipeline>,
    reconciler: TaggingReconciler,
    index_manager: IndexManager,
    snapshots: SnapshotAggregator,
    retriever: ContextRetriever,
    index_name: String,
    // Como mucho una ingesta + etiquetado en vuelo por proceso.
    ingest_lock: Mutex<()>,
    init_lock: Mutex<()>,
    initialized: AtomicBool,
    closed: AtomicBool,
}

impl GraphRagService {
    pub fn new(
        store: Arc<dyn GraphStore>,
        pipeline: Arc<dyn IngestionPipeline>,
        index_manager: IndexManager,
        snapshots: SnapshotAggregator,
        retriever: ContextRetriever,
        index_name: impl Into<String>,
    ) -> Self {
        Self {
            reconciler: TaggingReconciler::new(store.clone()),
            store,
            pipeline,
            index_manager,
            snapshots,
            retriever,
            index_name: index_name.into(),
            ingest_lock: Mutex::new(()),
            init_lock: Mutex::new(()),
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn from_config(
        store: Arc<dyn GraphStore>,
        pipeline: Arc<dyn IngestionPipeline>,
        embedder: Arc<dyn Embedder>,
        cfg: &AppConfig,
    ) -> Self {
        Self::new(
            store.clone(),
            pipeline,
            IndexManager::from_config(store.clone(), cfg),
            SnapshotAggregator::from_config(store.clone(), cfg),
            ContextRetriever::from_config(store, embedder, cfg),
            cfg.vector_index_name.clone(),
        )
    }

    /// Prepara el esquema del pipeline y garantiza el índice vectorial.
    /// Idempotente; debe ejecutarse antes de cualquier otra operación.
    pub async fn initialize(&self) -> ServiceResult<IndexReport> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ServiceError::Closed);
        }
        let _guard = self.init_lock.lock().await;

        self.pipeline.prepare().await.map_err(ServiceError::Store)?;
        let report = self
            .index_manager
            .ensure_index(&self.index_name)
            .await
            .map_err(ServiceError::Store)?;

        if !self.initialized.swap(true, Ordering::SeqCst) {
            info!("Servicio GraphRAG inicializado (índice '{}').", self.index_name);
        }
        Ok(report)
    }

    fn ensure_ready(&self) -> ServiceResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ServiceError::Closed);
        }
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(ServiceError::NotInitialized);
        }
        Ok(())
    }

    /// Ingiere `file_path` y etiqueta los nodos nuevos con el caso indicado o,
    /// si no hay caso, con el nombre del fichero como `document_id`.
    ///
    /// Si la ingesta falla no se etiqueta nada.
    pub async fn process_document(
        &self,
        file_path: &Path,
        scope_id: Option<&str>,
    ) -> ServiceResult<ProcessReport> {
        self.ensure_ready()?;

        let scope = match scope_id {
            Some(id) if is_valid_case_id(id) => Scope::Case(id.to_string()),
            Some(id) => return Err(ServiceError::InvalidCase(id.to_string())),
            None => Scope::Document(
                file_path
                    .file_name()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| file_path.to_string_lossy().to_string()),
            ),
        };
        let provenance = file_path.to_string_lossy().to_string();

        let _guard = self.ingest_lock.lock().await;
        info!("Procesando {} ({}: {})", file_path.display(), scope.property(), scope.id());

        let summary = self.pipeline.run(file_path).await.map_err(|source| {
            error!("Fallo en la ingesta de {}: {source:#}", file_path.display());
            ServiceError::Ingestion {
                path: file_path.to_path_buf(),
                source,
            }
        })?;

        let nodes_tagged = self
            .reconciler
            .tag_untagged(&scope, Some(&provenance))
            .await
            .map_err(ServiceError::Store)?;

        Ok(ProcessReport {
            file_path: file_path.to_path_buf(),
            scope_property: scope.property(),
            scope_id: scope.id().to_string(),
            nodes_tagged,
            summary,
        })
    }

    /// Vista del grafo para visualización. Un caso mal formado o un fallo del
    /// store devuelven una vista vacía.
    pub async fn get_graph_data(&self, scope_id: Option<&str>) -> ServiceResult<GraphSnapshot> {
        self.ensure_ready()?;
        if scope_id.is_some_and(|s| !is_valid_case_id(s)) {
            warn!("Identificador de caso inválido en la vista del grafo: {scope_id:?}");
            return Ok(GraphSnapshot::default());
        }

        match self.snapshots.snapshot(scope_id).await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                error!("Error obteniendo la vista del grafo: {e:#}");
                Ok(GraphSnapshot::default())
            }
        }
    }

    /// Contexto textual para `query_text`; el centinela si no hay nada o si
    /// el store falla.
    pub async fn search_context(
        &self,
        query_text: &str,
        scope_id: Option<&str>,
    ) -> ServiceResult<String> {
        self.ensure_ready()?;
        match self.retriever.retrieve(query_text, scope_id).await {
            Ok(context) => Ok(context),
            Err(e) => {
                error!("Error recuperando contexto: {e:#}");
                Ok(NO_CONTEXT_SENTINEL.to_string())
            }
        }
    }

    /// Health check del store.
    pub async fn ping(&self) -> ServiceResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ServiceError::Closed);
        }
        self.store.ping().await.map_err(ServiceError::Store)
    }

    /// Libera la conexión con el store. Idempotente.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.store.close().await;
        info!("Conexión con Neo4j cerrada.");
    }
}
