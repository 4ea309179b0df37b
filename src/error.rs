//! Errores del servicio expuestos hacia arriba (API HTTP y binarios).

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Fallo de conectividad o de consulta contra Neo4j.
    #[error("Error del store de grafos: {0}")]
    Store(#[source] anyhow::Error),

    /// La ingesta falló; no se ha etiquetado ningún nodo.
    #[error("Error ingiriendo {}: {source}", path.display())]
    Ingestion {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("El servicio no está inicializado")]
    NotInitialized,

    #[error("El servicio está cerrado")]
    Closed,

    #[error("Identificador de caso inválido: '{0}'")]
    InvalidCase(String),

    #[error("Caso no encontrado: {0}")]
    CaseNotFound(String),

    #[error("Error de E/S: {0}")]
    Io(#[from] std::io::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
