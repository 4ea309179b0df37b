use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use axum::Router;
use legal_graphrag::{
    api,
    app_state::{AppState, Status},
    cases::CaseRegistry,
    chat::ChatService,
    config::AppConfig,
    ingest::KgPipeline,
    llm::LlmManager,
    service::GraphRagService,
    store::Neo4jStore,
};
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = AppConfig::from_env().context("Error al cargar la configuración")?;

    // 3. Conectar a Neo4j e inicializar LLMs
    let store = Arc::new(
        Neo4jStore::connect(&cfg)
            .await
            .context("Error conectando a Neo4j")?,
    );
    let llm_manager = LlmManager::from_config(&cfg).context("Error inicializando LLM Manager")?;
    let llm = Arc::new(llm_manager.clone());

    // 4. Servicio GraphRAG: esquema + índice vectorial (fatal si falla)
    let pipeline = Arc::new(KgPipeline::new(store.clone(), llm_manager));
    let service = Arc::new(GraphRagService::from_config(
        store,
        pipeline,
        llm.clone(),
        &cfg,
    ));
    let report = service
        .initialize()
        .await
        .context("Error inicializando el servicio GraphRAG")?;
    info!(
        "Índice '{}' listo ({:?}, {}/{} dims).",
        cfg.vector_index_name, report.action, report.schema.label, report.schema.dimensions
    );

    let cases = CaseRegistry::new(&cfg.upload_dir).context("Error preparando UPLOAD_DIR")?;

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 5. Crear estado compartido de la aplicación
    let app_state = AppState {
        config: cfg.clone(),
        service: service.clone(),
        cases,
        chat: ChatService::new(service.clone(), llm),
        status: Arc::new(Mutex::new(Status::ready())),
        shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    // 6. Configurar el router de la API
    let app = Router::new()
        .merge(api::create_router(app_state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 7. Iniciar el servidor
    let listener = tokio::net::TcpListener::bind(&cfg.server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {}", cfg.server_addr))?;
    info!("🚀 Servidor escuchando en http://{}", cfg.server_addr);

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    service.close().await;
    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
