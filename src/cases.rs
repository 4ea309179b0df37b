//! Registro de casos: cada caso es un directorio bajo `UPLOAD_DIR` que
//! contiene sus documentos. No hay un nodo :Case en el grafo; el caso existe
//! en Neo4j sólo como la propiedad `case_id` de los nodos.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::info;
use walkdir::WalkDir;

use crate::error::{ServiceError, ServiceResult};
use crate::models::CaseInfo;

/// Un identificador de caso es también un nombre de directorio: no puede estar
/// vacío, llevar espacios alrededor ni contener separadores ni `..`.
pub fn is_valid_case_id(id: &str) -> bool {
    !id.is_empty()
        && id.trim() == id
        && id.len() <= 128
        && !id.contains(['/', '\\'])
        && matches!(Path::new(id).components().next(), Some(Component::Normal(_)))
        && !id.chars().any(char::is_control)
}

#[derive(Debug, Clone)]
pub struct CaseRegistry {
    root: PathBuf,
}

impl CaseRegistry {
    pub fn new(root: impl Into<PathBuf>) -> ServiceResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn create_case(&self, name: &str) -> ServiceResult<CaseInfo> {
        let name = name.trim();
        if !is_valid_case_id(name) {
            return Err(ServiceError::InvalidCase(name.to_string()));
        }
        let dir = self.root.join(name);
        fs::create_dir_all(&dir)?;
        info!("Caso '{name}' disponible en {}", dir.display());
        Ok(CaseInfo {
            id: name.to_string(),
            name: name.to_string(),
            document_count: count_documents(&dir),
        })
    }

    /// Lista los casos ordenados por nombre.
    pub fn list_cases(&self) -> ServiceResult<Vec<CaseInfo>> {
        let mut cases = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            cases.push(CaseInfo {
                id: name.clone(),
                name,
                document_count: count_documents(&entry.path()),
            });
        }
        cases.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(cases)
    }

    /// Ruta de un documento ya depositado en el directorio del caso.
    pub fn document_path(&self, case_id: &str, filename: &str) -> ServiceResult<PathBuf> {
        if !is_valid_case_id(case_id) {
            return Err(ServiceError::InvalidCase(case_id.to_string()));
        }
        let case_dir = self.root.join(case_id);
        if !case_dir.is_dir() {
            return Err(ServiceError::CaseNotFound(case_id.to_string()));
        }
        // Mismas reglas que un id de caso: nada de rutas relativas fuera del caso.
        if !is_valid_case_id(filename) {
            return Err(ServiceError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Nombre de fichero inválido: '{filename}'"),
            )));
        }
        let path = case_dir.join(filename);
        if !path.is_file() {
            return Err(ServiceError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("No existe el documento {}", path.display()),
            )));
        }
        Ok(path)
    }
}

fn count_documents(dir: &Path) -> usize {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}
