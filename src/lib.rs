pub mod chat;
pub mod config;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod ollama;
pub mod retrieval;
pub mod service;
pub mod store;
pub mod suggest;

pub use config::AppConfig;
pub use service::QaService;
