//! Ciclo de vida del índice vectorial.
//!
//! Al arrancar se detecta qué etiqueta y qué dimensión tienen realmente los
//! embeddings guardados, se compara con el índice existente de ese nombre y se
//! crea o se recrea para que coincidan. Un índice con otra dimensión o sobre
//! otra etiqueta no falla: devuelve resultados vacíos o errores de dimensión en
//! cada búsqueda.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{AppConfig, IndexDefaults};
use crate::models::{EmbeddingSample, IndexDescriptor, VectorSchema};
use crate::store::GraphStore;

/// Resultado de la detección de esquema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaGuess {
    Detected { label: String, dimensions: usize },
    Unknown,
}

/// Interpreta una muestra: la etiqueta preferida si el nodo la lleva, si no
/// la primera de sus etiquetas.
pub fn detect(sample: Option<&EmbeddingSample>, preferred_label: &str) -> SchemaGuess {
    let Some(sample) = sample else {
        return SchemaGuess::Unknown;
    };
    if sample.dimensions == 0 {
        return SchemaGuess::Unknown;
    }
    let label = if sample.labels.iter().any(|l| l == preferred_label) {
        Some(preferred_label.to_string())
    } else {
        sample.labels.first().cloned()
    };
    match label {
        Some(label) => SchemaGuess::Detected {
            label,
            dimensions: sample.dimensions,
        },
        None => SchemaGuess::Unknown,
    }
}

/// Aplica la política de fallback: lo desconocido se sustituye por los
/// valores por defecto configurados.
pub fn resolve(guess: SchemaGuess, defaults: &IndexDefaults, property: &str) -> VectorSchema {
    match guess {
        SchemaGuess::Detected { label, dimensions } => VectorSchema {
            label,
            property: property.to_string(),
            dimensions,
        },
        SchemaGuess::Unknown => VectorSchema {
            label: defaults.label.clone(),
            property: property.to_string(),
            dimensions: defaults.dimensions,
        },
    }
}

/// Qué hay que hacer con el índice existente.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexAction {
    Keep,
    Create,
    Recreate,
}

/// Compara el índice existente con el esquema resuelto. La dimensión sólo se
/// compara si el store la informa.
pub fn plan(existing: Option<&IndexDescriptor>, schema: &VectorSchema) -> IndexAction {
    let Some(index) = existing else {
        return IndexAction::Create;
    };
    let matches = index.kind.eq_ignore_ascii_case("vector")
        && index.properties.iter().any(|p| p == &schema.property)
        && index.labels.iter().any(|l| l == &schema.label)
        && index.dimensions.map_or(true, |d| d == schema.dimensions);
    if matches {
        IndexAction::Keep
    } else {
        IndexAction::Recreate
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub action: IndexAction,
    pub schema: VectorSchema,
}

pub struct IndexManager {
    store: Arc<dyn GraphStore>,
    property: String,
    preferred_label: String,
    defaults: IndexDefaults,
    // Detectar → comparar → recrear no es atómico en el store.
    lock: Mutex<()>,
}

impl IndexManager {
    pub fn new(
        store: Arc<dyn GraphStore>,
        property: impl Into<String>,
        preferred_label: impl Into<String>,
        defaults: IndexDefaults,
    ) -> Self {
        Self {
            store,
            property: property.into(),
            preferred_label: preferred_label.into(),
            defaults,
            lock: Mutex::new(()),
        }
    }

    pub fn from_config(store: Arc<dyn GraphStore>, cfg: &AppConfig) -> Self {
        Self::new(
            store,
            cfg.embedding_property.clone(),
            cfg.chunk_label.clone(),
            cfg.index_defaults.clone(),
        )
    }

    /// Garantiza que el índice `name` exista y coincida con los embeddings
    /// guardados. Los errores de detección degradan a los valores por defecto;
    /// los de creación o borrado se propagan.
    ///
    /// El mutex sólo serializa las llamadas de este proceso; entre instancias
    /// distintas la carrera se resuelve con `IF NOT EXISTS` / `IF EXISTS`.
    pub async fn ensure_index(&self, name: &str) -> Result<IndexReport> {
        let _guard = self.lock.lock().await;

        // 1) Detección de esquema
        let guess = self.detect_schema().await;
        if guess == SchemaGuess::Unknown {
            warn!(
                "No se detectaron embeddings en '{}'; se usa el esquema por defecto {}({})",
                self.property, self.defaults.label, self.defaults.dimensions
            );
        }
        let schema = resolve(guess, &self.defaults, &self.property);

        // 2) Inspección del índice existente
        let existing = self
            .store
            .find_index(name)
            .await
            .with_context(|| format!("Error consultando el índice '{name}'"))?;
        let action = plan(existing.as_ref(), &schema);

        // 3) Reconciliación y 4) creación
        match action {
            IndexAction::Keep => {
                info!("Índice vectorial '{name}' ya existe y coincide con {}.", describe(&schema));
            }
            IndexAction::Create => {
                self.create(name, &schema).await?;
                info!("Índice vectorial '{name}' creado sobre {}.", describe(&schema));
            }
            IndexAction::Recreate => {
                if let Some(index) = &existing {
                    info!(
                        "Índice vectorial '{name}' no coincide (tipo {}, etiquetas {:?}, propiedades {:?}, dimensión {:?}); se recrea sobre {}.",
                        index.kind,
                        index.labels,
                        index.properties,
                        index.dimensions,
                        describe(&schema)
                    );
                }
                self.store
                    .drop_index(name)
                    .await
                    .with_context(|| format!("Error eliminando el índice '{name}'"))?;
                self.create(name, &schema).await?;
            }
        }

        Ok(IndexReport { action, schema })
    }

    async fn create(&self, name: &str, schema: &VectorSchema) -> Result<()> {
        self.store
            .create_vector_index(name, schema)
            .await
            .with_context(|| format!("Error creando el índice vectorial '{name}'"))
    }

    /// Muestrea como mucho un nodo con la etiqueta preferida y, si no hay,
    /// como mucho un nodo cualquiera con embedding.
    async fn detect_schema(&self) -> SchemaGuess {
        let preferred = self
            .store
            .sample_embedding(&self.property, Some(&self.preferred_label))
            .await;
        let sample = match preferred {
            Ok(Some(sample)) => Some(sample),
            Ok(None) => match self.store.sample_embedding(&self.property, None).await {
                Ok(sample) => sample,
                Err(e) => {
                    warn!("Error detectando el esquema de embeddings: {e}");
                    return SchemaGuess::Unknown;
                }
            },
            Err(e) => {
                warn!("Error detectando el esquema de embeddings: {e}");
                return SchemaGuess::Unknown;
            }
        };
        detect(sample.as_ref(), &self.preferred_label)
    }
}

fn describe(schema: &VectorSchema) -> String {
    format!(
        ":{}({}) con {} dimensiones",
        schema.label, schema.property, schema.dimensions
    )
}
