//! Atribuye a un caso todos los nodos que aún no tienen `case_id`.
//! Pensado para datos ingeridos antes de que existiera el etiquetado.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use legal_graphrag::{
    cases::is_valid_case_id, config::AppConfig, models::Scope, store::GraphStore,
    store::Neo4jStore, tagging::TaggingReconciler,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "retag-nodes")]
#[command(about = "Etiqueta con un case_id los nodos de Neo4j que no lo tienen", long_about = None)]
struct Cli {
    /// Caso al que se atribuyen los nodos sin etiquetar
    #[arg(default_value = "test")]
    case_id: String,

    /// Ruta de procedencia a registrar en `document_path`
    #[arg(long)]
    file_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if !is_valid_case_id(&cli.case_id) {
        return Err(anyhow!("Identificador de caso inválido: '{}'", cli.case_id));
    }

    let cfg = AppConfig::from_env().context("Error al cargar la configuración")?;
    let store = Arc::new(
        Neo4jStore::connect(&cfg)
            .await
            .context("Error conectando a Neo4j")?,
    );

    let reconciler = TaggingReconciler::new(store.clone());
    let result = reconciler
        .tag_untagged(&Scope::Case(cli.case_id.clone()), cli.file_path.as_deref())
        .await;
    store.close().await;

    let updated = result?;
    info!("Etiquetados {updated} nodos con case_id: {}", cli.case_id);
    println!("Tagged {updated} nodes with case_id: {}", cli.case_id);
    Ok(())
}
