//! Abstracción sobre Rig para trabajar con distintos proveedores de LLM.
//!
//! Embeddings: OpenAI. Chat/extracción: OpenAI o Gemini.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use rig::completion::Prompt;
use rig::embeddings::EmbeddingModel; // <- para .embed_texts
use serde::Deserialize;
use tracing::warn;

use crate::config::{AppConfig, LlmProvider};

/// Tamaño (en caracteres) de cada fragmento de respuesta emitido en streaming.
pub const FRAGMENT_CHARS: usize = 50;

/// Calcula el embedding de un texto con el mismo modelo usado en la ingesta.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f64>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        self.embed_many(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No se pudo generar embedding de la query"))
    }
}

/// Genera una respuesta como secuencia de fragmentos de texto.
pub trait AnswerGenerator: Send + Sync {
    fn generate(&self, prompt: String) -> BoxStream<'static, Result<String>>;
}

/// Trocea `text` en fragmentos de como mucho `max_chars` caracteres sin
/// partir ningún carácter UTF-8.
pub fn split_fragments(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

// --- Extracción de entidades y relaciones ---

#[derive(Debug, Clone, Deserialize)]
pub struct JsonExtractedEntity {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonExtractedRelation {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ExtractionResult {
    pub entities: Vec<JsonExtractedEntity>,
    pub relations: Vec<JsonExtractedRelation>,
}

/// Limpia la respuesta del LLM (vallas ```json) y la interpreta. Un JSON mal
/// formado no detiene la ingesta: se devuelve una extracción vacía.
pub fn parse_extraction(response: &str) -> ExtractionResult {
    let json_response = response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    match serde_json::from_str::<ExtractionResult>(json_response) {
        Ok(result) => result,
        Err(e) => {
            warn!("No se pudo parsear el JSON de extracción para un chunk. Error: {e}. Respuesta LLM: '{response}'");
            ExtractionResult::default()
        }
    }
}

const ANSWER_PREAMBLE: &str = r#"
Eres un asistente jurídico que responde preguntas sobre los documentos de un caso.
Sólo puedes usar la información suministrada en el contexto.
Si el contexto no contiene la respuesta, di explícitamente que no la sabes.
"#;

const EXTRACTION_PROMPT: &str = r#"
Tu tarea es analizar un fragmento de un documento legal y extraer entidades y relaciones para un grafo de conocimiento.
- Clasifica cada entidad en una de estas categorías: 'Person', 'Organization', 'Court', 'Statute', 'Contract', 'Clause', 'Date', 'Location'.
- Identifica relaciones entre esas entidades como una tripleta (sujeto, predicado, objeto). El predicado debe ser un identificador conciso en mayúsculas (ej: 'PARTY_TO', 'REPRESENTS', 'CITES', 'SIGNED_ON').

La salida DEBE ser un único objeto JSON válido con dos claves: "entities" y "relations".
- "entities": una lista de objetos, cada uno con "id" (nombre de la entidad) y "label".
- "relations": una lista de objetos, cada uno con "subject", "predicate" y "object".

Si no encuentras nada, devuelve listas vacías. No incluyas explicaciones, solo el JSON.
"#;

/// Gestor de LLMs y embeddings.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    pub embedding_model: String,
    pub chat_model: String,
    pub temperature: f64,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        if cfg.llm_chat_model.is_empty() {
            return Err(anyhow!("LLM_CHAT_MODEL no puede estar vacío"));
        }
        Ok(Self {
            provider: cfg.llm_provider.clone(),
            embedding_model: cfg.llm_embedding_model.clone(),
            chat_model: cfg.llm_chat_model.clone(),
            temperature: cfg.llm_temperature,
        })
    }

    // ---------------------------------------------------------------------
    // EMBEDDINGS
    // ---------------------------------------------------------------------

    async fn embed_with_openai(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        use rig::providers::openai::{self, TEXT_EMBEDDING_3_SMALL};
        // Trait para client.embedding_model(...)
        use rig::client::EmbeddingsClient as _;

        let client = openai::Client::from_env();
        let model_name = if self.embedding_model.is_empty() {
            TEXT_EMBEDDING_3_SMALL
        } else {
            self.embedding_model.as_str()
        };
        let embedding_model = client.embedding_model(model_name);

        let embeddings = embedding_model.embed_texts(texts.to_vec()).await?;
        if embeddings.len() != texts.len() {
            return Err(anyhow!(
                "Número de embeddings ({}) distinto al número de textos ({})",
                embeddings.len(),
                texts.len()
            ));
        }
        Ok(embeddings.into_iter().map(|e| e.vec).collect())
    }

    // ---------------------------------------------------------------------
    // CHAT / COMPLETION
    // ---------------------------------------------------------------------

    /// Una única llamada de completion con el preámbulo indicado.
    pub async fn complete(&self, preamble: &str, prompt: &str) -> Result<String> {
        // Trait para client.agent(...)
        use rig::client::CompletionClient as _;

        let answer = match self.provider {
            LlmProvider::OpenAI => {
                let client = rig::providers::openai::Client::from_env();
                let agent = client
                    .agent(&self.chat_model)
                    .preamble(preamble)
                    .temperature(self.temperature)
                    .build();
                agent.prompt(prompt).await?
            }
            LlmProvider::Gemini => {
                let client = rig::providers::gemini::Client::from_env();
                let agent = client
                    .agent(&self.chat_model)
                    .preamble(preamble)
                    .temperature(self.temperature)
                    .build();
                agent.prompt(prompt).await?
            }
        };
        Ok(answer)
    }

    pub async fn extract_entities_and_relations(&self, text: &str) -> Result<ExtractionResult> {
        let response = self.complete(EXTRACTION_PROMPT, text).await?;
        Ok(parse_extraction(&response))
    }
}

#[async_trait]
impl Embedder for LlmManager {
    /// Sólo OpenAI tiene embeddings; el índice vectorial depende de que la
    /// ingesta y las consultas usen el mismo modelo.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        match self.provider {
            LlmProvider::OpenAI => self.embed_with_openai(texts).await,
            ref other => Err(anyhow!(
                "Proveedor LLM {:?} aún no implementado para embeddings",
                other
            )),
        }
    }
}

impl AnswerGenerator for LlmManager {
    fn generate(&self, prompt: String) -> BoxStream<'static, Result<String>> {
        let llm = self.clone();
        stream::once(async move { llm.complete(ANSWER_PREAMBLE, &prompt).await })
            .map(|result| match result {
                Ok(answer) => {
                    stream::iter(split_fragments(&answer, FRAGMENT_CHARS).into_iter().map(Ok))
                        .boxed()
                }
                Err(e) => stream::iter(vec![Err(e)]).boxed(),
            })
            .flatten()
            .boxed()
    }
}
