use std::convert::Infallible;
use std::io::ErrorKind;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Router,
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use url::Url;

use crate::{
    app_state::{AppState, Status},
    error::ServiceError,
    models::{CaseInfo, GraphSnapshot},
    service::ProcessReport,
};

type ApiError = (StatusCode, Json<serde_json::Value>);

// --- Payloads de la API ---

#[derive(Deserialize)]
pub struct CreateCasePayload {
    name: String,
}

#[derive(Deserialize)]
pub struct ProcessDocumentPayload {
    filename: String,
}

#[derive(Deserialize)]
pub struct ContextPayload {
    query: String,
}

#[derive(Deserialize)]
pub struct ChatPayload {
    message: String,
}

#[derive(Deserialize)]
pub struct GraphDataParams {
    case_id: Option<String>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/neo4j-info", get(neo4j_info_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .route("/api/cases", get(list_cases_handler).post(create_case_handler))
        .route("/api/cases/:case_id/documents", post(process_document_handler))
        .route("/api/cases/:case_id/graph", get(case_graph_handler))
        .route("/api/graph-data", get(graph_data_handler))
        .route("/api/cases/:case_id/context", post(context_handler))
        .route("/api/cases/:case_id/chat", post(chat_handler))
        .with_state(app_state)
}

/// Traduce un `ServiceError` a código HTTP + cuerpo `{error}`.
fn api_error(err: ServiceError) -> ApiError {
    let status = match &err {
        ServiceError::InvalidCase(_) => StatusCode::BAD_REQUEST,
        ServiceError::CaseNotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::Io(e) if e.kind() == ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ServiceError::Io(e) if e.kind() == ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ServiceError::Ingestion { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::NotInitialized | ServiceError::Closed => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::Store(_) | ServiceError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("{err}");
    }
    (status, Json(json!({ "error": err.to_string() })))
}

// --- Handlers ---

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(state.status.lock().unwrap_or_else(|e| e.into_inner()).clone())
}

#[axum::debug_handler]
async fn neo4j_info_handler(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let browser_url = match Url::parse(&state.config.neo4j_uri) {
        Ok(mut url) => {
            let _ = url.set_scheme("http");
            let _ = url.set_port(Some(7474));
            url.to_string()
        }
        Err(_) => "http://localhost:7474".to_string(),
    };

    match state.service.ping().await {
        Ok(()) => Ok(Json(json!({ "status": "ok", "browser_url": browser_url }))),
        Err(e) => {
            error!("Error en el health check de Neo4j: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[axum::debug_handler]
async fn list_cases_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<CaseInfo>>, ApiError> {
    state.cases.list_cases().map(Json).map_err(api_error)
}

#[axum::debug_handler]
async fn create_case_handler(
    State(state): State<AppState>,
    Json(payload): Json<CreateCasePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let case = state.cases.create_case(&payload.name).map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(case)))
}

/// Procesa un documento ya depositado en el directorio del caso. La
/// respuesta espera a la ingesta para poder devolver sus errores.
#[axum::debug_handler]
async fn process_document_handler(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
    Json(payload): Json<ProcessDocumentPayload>,
) -> Result<Json<ProcessReport>, ApiError> {
    let path = state
        .cases
        .document_path(&case_id, &payload.filename)
        .map_err(api_error)?;

    state.set_status(true, format!("Procesando {}...", payload.filename), 0.0);
    let result = state.service.process_document(&path, Some(&case_id)).await;

    match result {
        Ok(report) => {
            state.set_status(
                false,
                format!("¡Documento procesado! {}", report.summary),
                0.0,
            );
            Ok(Json(report))
        }
        Err(err) => {
            state.set_status(false, format!("Error en la ingesta: {}", err), 0.0);
            Err(api_error(err))
        }
    }
}

#[axum::debug_handler]
async fn case_graph_handler(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
) -> Result<Json<GraphSnapshot>, ApiError> {
    state
        .service
        .get_graph_data(Some(&case_id))
        .await
        .map(Json)
        .map_err(api_error)
}

#[axum::debug_handler]
async fn graph_data_handler(
    State(state): State<AppState>,
    Query(params): Query<GraphDataParams>,
) -> Result<Json<GraphSnapshot>, ApiError> {
    state
        .service
        .get_graph_data(params.case_id.as_deref())
        .await
        .map(Json)
        .map_err(api_error)
}

#[axum::debug_handler]
async fn context_handler(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
    Json(payload): Json<ContextPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let context = state
        .service
        .search_context(&payload.query, Some(&case_id))
        .await
        .map_err(api_error)?;
    Ok(Json(json!({ "context": context })))
}

#[axum::debug_handler]
async fn chat_handler(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
    Json(payload): Json<ChatPayload>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let fragments = state.chat.chat_stream(payload.message, Some(case_id));
    Sse::new(fragments.map(|fragment| Ok(Event::default().data(fragment))))
        .keep_alive(KeepAlive::default())
}

// --- Handler de Apagado ---

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Some(sender) = state
        .shutdown_sender
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take()
    {
        let _ = sender.send(());
    }
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn service_errors_map_to_http_statuses() {
        let cases = [
            (ServiceError::InvalidCase("../x".into()), StatusCode::BAD_REQUEST),
            (ServiceError::CaseNotFound("c9".into()), StatusCode::NOT_FOUND),
            (
                ServiceError::Io(std::io::Error::new(ErrorKind::NotFound, "falta")),
                StatusCode::NOT_FOUND,
            ),
            (
                ServiceError::Ingestion {
                    path: PathBuf::from("a.pdf"),
                    source: anyhow::anyhow!("pdf corrupto"),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (ServiceError::Closed, StatusCode::SERVICE_UNAVAILABLE),
            (
                ServiceError::Store(anyhow::anyhow!("connection refused")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let message = err.to_string();
            let (status, Json(body)) = api_error(err);
            assert_eq!(status, expected);
            assert_eq!(body["error"], message);
        }
    }
}
