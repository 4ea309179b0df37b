use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::{cases::CaseRegistry, chat::ChatService, config::AppConfig, service::GraphRagService};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub service: Arc<GraphRagService>,
    pub cases: CaseRegistry,
    pub chat: ChatService,
    pub status: Arc<Mutex<Status>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl AppState {
    /// Actualiza el estado de procesamiento visible en `/api/status`.
    pub fn set_status(&self, is_busy: bool, message: impl Into<String>, progress: f32) {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        status.is_busy = is_busy;
        status.message = message.into();
        status.progress = progress;
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
}

impl Status {
    pub fn ready() -> Self {
        Self {
            is_busy: false,
            message: "Servidor listo.".to_string(),
            progress: 0.0,
        }
    }
}
