//! Servicio GraphRAG para documentos legales sobre Neo4j.
//!
//! Los nodos que escribe la ingesta se atribuyen a un caso (`case_id`) tras
//! cada documento; el índice vectorial se mantiene alineado con los
//! embeddings guardados, y la vista del grafo y el contexto del chat se
//! acotan por caso.

pub mod api;
pub mod app_state;
pub mod cases;
pub mod chat;
pub mod config;
pub mod error;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod retrieval;
pub mod service;
pub mod snapshot;
pub mod store;
pub mod tagging;
