//! Recuperación de contexto para el chat.
//!
//! Dos estrategias excluyentes, elegidas por configuración:
//!   - léxica: subcadena sobre `text`/`name` dentro del caso, sin ranking
//!     (coincidencias en el orden del store, acotadas);
//!   - vectorial: embedding de la query + top-k sobre el índice gestionado.

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::cases::is_valid_case_id;
use crate::config::{AppConfig, RetrievalStrategy};
use crate::llm::Embedder;
use crate::models::ContextRow;
use crate::store::GraphStore;

/// Respuesta cuando no hay ningún pasaje que devolver.
pub const NO_CONTEXT_SENTINEL: &str = "No relevant context found.";

pub enum Strategy {
    Lexical,
    Vector {
        embedder: Arc<dyn Embedder>,
        index_name: String,
        top_k: usize,
    },
}

/// Concatena los pasajes con una línea en blanco; `text` tiene prioridad
/// sobre `name` y las filas sin ninguno se descartan.
pub fn join_context(rows: &[ContextRow]) -> String {
    let parts: Vec<&str> = rows
        .iter()
        .filter_map(|row| {
            row.text
                .as_deref()
                .filter(|t| !t.is_empty())
                .or_else(|| row.name.as_deref().filter(|n| !n.is_empty()))
        })
        .collect();

    if parts.is_empty() {
        NO_CONTEXT_SENTINEL.to_string()
    } else {
        parts.join("\n\n")
    }
}

pub struct ContextRetriever {
    store: Arc<dyn GraphStore>,
    strategy: Strategy,
    result_cap: usize,
}

impl ContextRetriever {
    pub fn new(store: Arc<dyn GraphStore>, strategy: Strategy, result_cap: usize) -> Self {
        Self {
            store,
            strategy,
            result_cap,
        }
    }

    pub fn from_config(
        store: Arc<dyn GraphStore>,
        embedder: Arc<dyn Embedder>,
        cfg: &AppConfig,
    ) -> Self {
        let strategy = match cfg.retrieval_strategy {
            RetrievalStrategy::Lexical => Strategy::Lexical,
            RetrievalStrategy::Vector => Strategy::Vector {
                embedder,
                index_name: cfg.vector_index_name.clone(),
                top_k: cfg.vector_top_k,
            },
        };
        Self::new(store, strategy, cfg.context_result_cap)
    }

    /// Devuelve el contexto textual para `query_text`. Una query vacía o un
    /// caso mal formado devuelven el centinela sin consultar el store.
    pub async fn retrieve(&self, query_text: &str, scope_id: Option<&str>) -> Result<String> {
        let query_text = query_text.trim();
        if query_text.is_empty() || scope_id.is_some_and(|s| !is_valid_case_id(s)) {
            return Ok(NO_CONTEXT_SENTINEL.to_string());
        }

        let rows = match &self.strategy {
            Strategy::Lexical => {
                self.store
                    .lexical_search(scope_id, query_text, self.result_cap)
                    .await?
            }
            Strategy::Vector {
                embedder,
                index_name,
                top_k,
            } => {
                let embedding = embedder.embed(query_text).await?;
                self.store
                    .vector_search(index_name, &embedding, *top_k, scope_id)
                    .await?
            }
        };

        debug!("Recuperados {} pasajes para la query", rows.len());
        Ok(join_context(&rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VectorSchema;
    use crate::store::memory::MemoryGraphStore;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    /// Embedder determinista: palabras clave → ejes.
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    vec![
                        t.contains("contrato") as u8 as f64,
                        t.contains("demanda") as u8 as f64,
                        0.1,
                    ]
                })
                .collect())
        }
    }

    fn lexical(store: &Arc<MemoryGraphStore>) -> ContextRetriever {
        ContextRetriever::new(store.clone(), Strategy::Lexical, 5)
    }

    #[test]
    fn join_prefers_text_and_uses_sentinel() {
        let rows = vec![
            ContextRow { text: Some("uno".into()), name: Some("X".into()) },
            ContextRow { text: None, name: Some("dos".into()) },
            ContextRow::default(),
        ];
        assert_eq!(join_context(&rows), "uno\n\ndos");
        assert_eq!(join_context(&[]), NO_CONTEXT_SENTINEL);
    }

    #[tokio::test]
    async fn lexical_search_is_scoped_and_capped() {
        let store = Arc::new(MemoryGraphStore::new());
        for i in 0..8 {
            store.add_node(
                &["Chunk"],
                json!({ "text": format!("cláusula {i} del contract"), "case_id": "c1" }),
            );
        }
        store.add_node(&["Chunk"], json!({"text": "contract ajeno", "case_id": "c2"}));

        let context = lexical(&store).retrieve("contract", Some("c1")).await.unwrap();

        let parts: Vec<&str> = context.split("\n\n").collect();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0], "cláusula 0 del contract");
        assert!(!context.contains("ajeno"));
    }

    #[tokio::test]
    async fn no_match_returns_sentinel() {
        let store = Arc::new(MemoryGraphStore::new());
        store.add_node(&["Chunk"], json!({"text": "arrendamiento", "case_id": "c1"}));

        let context = lexical(&store).retrieve("contract", Some("c1")).await.unwrap();

        assert_eq!(context, NO_CONTEXT_SENTINEL);
    }

    #[tokio::test]
    async fn user_errors_short_circuit_to_sentinel() {
        let store = Arc::new(MemoryGraphStore::new());
        store.add_node(&["Chunk"], json!({"text": "contract", "case_id": "c1"}));
        let retriever = lexical(&store);

        assert_eq!(retriever.retrieve("   ", Some("c1")).await.unwrap(), NO_CONTEXT_SENTINEL);
        assert_eq!(
            retriever.retrieve("contract", Some("../c1")).await.unwrap(),
            NO_CONTEXT_SENTINEL
        );
    }

    #[tokio::test]
    async fn name_matches_are_returned_when_text_is_missing() {
        let store = Arc::new(MemoryGraphStore::new());
        store.add_node(&["Organization"], json!({"name": "Acme contract services", "case_id": "c1"}));

        let context = lexical(&store).retrieve("contract", Some("c1")).await.unwrap();

        assert_eq!(context, "Acme contract services");
    }

    #[tokio::test]
    async fn vector_strategy_ranks_by_similarity() {
        let store = Arc::new(MemoryGraphStore::new());
        store.add_node(
            &["Chunk"],
            json!({"text": "la demanda", "embedding": [0.0, 1.0, 0.1], "case_id": "c1"}),
        );
        store.add_node(
            &["Chunk"],
            json!({"text": "el contrato", "embedding": [1.0, 0.0, 0.1], "case_id": "c1"}),
        );
        store
            .create_vector_index(
                "chunkEmbeddingIndex",
                &VectorSchema { label: "Chunk".into(), property: "embedding".into(), dimensions: 3 },
            )
            .await
            .unwrap();

        let retriever = ContextRetriever::new(
            store.clone(),
            Strategy::Vector {
                embedder: Arc::new(KeywordEmbedder),
                index_name: "chunkEmbeddingIndex".into(),
                top_k: 1,
            },
            5,
        );

        let context = retriever.retrieve("¿qué dice el contrato?", Some("c1")).await.unwrap();

        assert_eq!(context, "el contrato");
    }
}
