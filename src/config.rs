//! Carga y gestión de configuración de la aplicación (Neo4j + LLM + índice
//! vectorial + vista del grafo).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Gemini,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Estrategia de recuperación de contexto. Un despliegue elige una sola.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetrievalStrategy {
    /// Búsqueda por subcadena sobre `text`/`name`, sin ranking.
    Lexical,
    /// Búsqueda top-k sobre el índice vectorial gestionado.
    Vector,
}

impl RetrievalStrategy {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "lexical" => Ok(Self::Lexical),
            "vector" => Ok(Self::Vector),
            other => Err(anyhow!("Estrategia de recuperación no soportada: {other}")),
        }
    }
}

/// Qué aristas entran en una vista acotada a un caso.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeScope {
    /// Ambos extremos deben pertenecer al caso.
    BothEndpoints,
    /// Basta con que el origen pertenezca al caso.
    SourceOnly,
}

impl EdgeScope {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "both" => Ok(Self::BothEndpoints),
            "source" => Ok(Self::SourceOnly),
            other => Err(anyhow!("Valor de SNAPSHOT_EDGE_SCOPE no soportado: {other}")),
        }
    }
}

/// Esquema vectorial por defecto cuando el store aún no tiene embeddings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexDefaults {
    pub label: String,
    pub dimensions: usize,
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub server_addr: String,
    pub upload_dir: PathBuf,

    pub vector_index_name: String,
    pub embedding_property: String,
    pub chunk_label: String,
    pub index_defaults: IndexDefaults,

    pub snapshot_row_cap: usize,
    pub snapshot_edge_scope: EdgeScope,

    pub retrieval_strategy: RetrievalStrategy,
    pub context_result_cap: usize,
    pub vector_top_k: usize,

    pub llm_provider: LlmProvider,
    pub llm_embedding_model: String,
    pub llm_chat_model: String,
    pub llm_temperature: f64,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let neo4j_uri = env::var("NEO4J_URI")
            .map_err(|_| anyhow!("Falta NEO4J_URI en el entorno"))?;
        let neo4j_user = env::var("NEO4J_USER")
            .map_err(|_| anyhow!("Falta NEO4J_USER en el entorno"))?;
        let neo4j_password = env::var("NEO4J_PASSWORD")
            .map_err(|_| anyhow!("Falta NEO4J_PASSWORD en el entorno"))?;

        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:8000".to_string());
        let upload_dir = PathBuf::from(
            env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()),
        );

        let vector_index_name = env::var("VECTOR_INDEX_NAME")
            .unwrap_or_else(|_| "chunkEmbeddingIndex".to_string());
        let embedding_property =
            env::var("EMBEDDING_PROPERTY").unwrap_or_else(|_| "embedding".to_string());
        let chunk_label = env::var("CHUNK_LABEL").unwrap_or_else(|_| "Chunk".to_string());
        let index_defaults = IndexDefaults {
            label: env::var("DEFAULT_EMBEDDING_LABEL").unwrap_or_else(|_| chunk_label.clone()),
            dimensions: parse_var("DEFAULT_EMBEDDING_DIMENSIONS", 1536)?,
        };
        if index_defaults.dimensions == 0 {
            return Err(anyhow!("DEFAULT_EMBEDDING_DIMENSIONS debe ser mayor que 0"));
        }

        let snapshot_row_cap = parse_var("SNAPSHOT_ROW_CAP", 500)?;
        let snapshot_edge_scope = EdgeScope::from_str(
            &env::var("SNAPSHOT_EDGE_SCOPE").unwrap_or_else(|_| "both".to_string()),
        )?;

        let retrieval_strategy = RetrievalStrategy::from_str(
            &env::var("RETRIEVAL_STRATEGY").unwrap_or_else(|_| "lexical".to_string()),
        )?;
        let context_result_cap = parse_var("CONTEXT_RESULT_CAP", 5)?;
        let vector_top_k = parse_var("VECTOR_TOP_K", 5)?;

        let llm_provider_str =
            env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;

        let llm_embedding_model = env::var("LLM_EMBEDDING_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string());
        let llm_chat_model = env::var("LLM_CHAT_MODEL").unwrap_or_else(|_| {
            match llm_provider {
                LlmProvider::OpenAI => "gpt-4o-mini",
                LlmProvider::Gemini => "gemini-2.5-flash",
            }
            .to_string()
        });
        let llm_temperature = parse_var("LLM_TEMPERATURE", 0.2)?;

        Ok(Self {
            neo4j_uri,
            neo4j_user,
            neo4j_password,
            server_addr,
            upload_dir,
            vector_index_name,
            embedding_property,
            chunk_label,
            index_defaults,
            snapshot_row_cap,
            snapshot_edge_scope,
            retrieval_strategy,
            context_result_cap,
            vector_top_k,
            llm_provider,
            llm_embedding_model,
            llm_chat_model,
            llm_temperature,
        })
    }
}

/// Lee una variable numérica; si no está definida usa `default`, si está mal
/// formada es un error de configuración.
fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("Valor inválido para {name} ('{raw}'): {e}")),
        Err(_) => Ok(default),
    }
}
