//! Chat sobre los documentos de un caso: recupera el contexto, construye el
//! prompt y emite la respuesta en fragmentos.

use std::sync::Arc;

use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::error;

use crate::llm::AnswerGenerator;
use crate::service::GraphRagService;

pub fn build_prompt(context: &str, question: &str) -> String {
    format!("Contexto:\n{context}\n\nPregunta del usuario:\n{question}")
}

#[derive(Clone)]
pub struct ChatService {
    service: Arc<GraphRagService>,
    generator: Arc<dyn AnswerGenerator>,
}

impl ChatService {
    pub fn new(service: Arc<GraphRagService>, generator: Arc<dyn AnswerGenerator>) -> Self {
        Self { service, generator }
    }

    /// Fragmentos de la respuesta. Cualquier fallo termina el stream con un
    /// único fragmento `"Error: ..."`.
    pub fn chat_stream(&self, message: String, case_id: Option<String>) -> BoxStream<'static, String> {
        let service = self.service.clone();
        let generator = self.generator.clone();

        stream::once(async move {
            let context = match service.search_context(&message, case_id.as_deref()).await {
                Ok(context) => context,
                Err(e) => {
                    error!("Error en el chat: {e}");
                    return stream::iter(vec![format!("Error: {e}")]).boxed();
                }
            };

            generator
                .generate(build_prompt(&context, &message))
                .scan(false, |failed, item| {
                    if *failed {
                        return future::ready(None);
                    }
                    let fragment = match item {
                        Ok(fragment) => fragment,
                        Err(e) => {
                            error!("Error generando la respuesta: {e:#}");
                            *failed = true;
                            format!("Error: {e}")
                        }
                    };
                    future::ready(Some(fragment))
                })
                .boxed()
        })
        .flatten()
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EdgeScope, IndexDefaults};
    use crate::index::IndexManager;
    use crate::ingest::{IngestionPipeline, IngestionSummary};
    use crate::llm::{split_fragments, FRAGMENT_CHARS};
    use crate::retrieval::{ContextRetriever, Strategy};
    use crate::snapshot::SnapshotAggregator;
    use crate::store::memory::MemoryGraphStore;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::Path;
    use std::sync::Mutex;

    struct NoopPipeline;

    #[async_trait]
    impl IngestionPipeline for NoopPipeline {
        async fn run(&self, _file_path: &Path) -> Result<IngestionSummary> {
            Ok(IngestionSummary::default())
        }
    }

    /// Repite el prompt recibido, troceado como lo haría el LLM real.
    #[derive(Default)]
    struct EchoGenerator {
        prompts: Mutex<Vec<String>>,
    }

    impl AnswerGenerator for EchoGenerator {
        fn generate(&self, prompt: String) -> BoxStream<'static, Result<String>> {
            self.prompts.lock().unwrap().push(prompt.clone());
            stream::iter(split_fragments(&prompt, FRAGMENT_CHARS).into_iter().map(Ok)).boxed()
        }
    }

    struct FailingGenerator;

    impl AnswerGenerator for FailingGenerator {
        fn generate(&self, _prompt: String) -> BoxStream<'static, Result<String>> {
            stream::iter(vec![
                Ok("Según el contrato".to_string()),
                Err(anyhow!("rate limit")),
                Ok("nunca llega".to_string()),
            ])
            .boxed()
        }
    }

    async fn service(store: &Arc<MemoryGraphStore>) -> Arc<GraphRagService> {
        let svc = GraphRagService::new(
            store.clone(),
            Arc::new(NoopPipeline),
            IndexManager::new(
                store.clone(),
                "embedding",
                "Chunk",
                IndexDefaults { label: "Chunk".into(), dimensions: 3 },
            ),
            SnapshotAggregator::new(store.clone(), 500, EdgeScope::BothEndpoints),
            ContextRetriever::new(store.clone(), Strategy::Lexical, 5),
            "chunkEmbeddingIndex",
        );
        svc.initialize().await.unwrap();
        Arc::new(svc)
    }

    #[tokio::test]
    async fn prompt_carries_case_context() {
        let store = Arc::new(MemoryGraphStore::new());
        store.add_node(&["Chunk"], json!({"text": "El plazo es de 30 días.", "case_id": "c1"}));
        let generator = Arc::new(EchoGenerator::default());
        let chat = ChatService::new(service(&store).await, generator.clone());

        let fragments: Vec<String> = chat
            .chat_stream("plazo".into(), Some("c1".into()))
            .collect()
            .await;

        let expected = build_prompt("El plazo es de 30 días.", "plazo");
        assert_eq!(fragments.concat(), expected);
        assert!(fragments.iter().all(|f| f.chars().count() <= FRAGMENT_CHARS));
        assert_eq!(generator.prompts.lock().unwrap().clone(), vec![expected]);
    }

    #[tokio::test]
    async fn generator_errors_end_the_stream() {
        let store = Arc::new(MemoryGraphStore::new());
        let chat = ChatService::new(service(&store).await, Arc::new(FailingGenerator));

        let fragments: Vec<String> = chat.chat_stream("plazo".into(), None).collect().await;

        assert_eq!(fragments, vec!["Según el contrato", "Error: rate limit"]);
    }

    #[tokio::test]
    async fn closed_service_yields_a_single_error() {
        let store = Arc::new(MemoryGraphStore::new());
        let svc = service(&store).await;
        svc.close().await;
        let chat = ChatService::new(svc, Arc::new(EchoGenerator::default()));

        let fragments: Vec<String> = chat.chat_stream("plazo".into(), None).collect().await;

        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].starts_with("Error: "));
    }
}
