use std::path::PathBuf;

use serde::Deserialize;

use crate::store::{DataSource, MemorySource};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub source: Box<dyn DataSource>,
}

impl AppState {
    /// Volatile in-memory store; nothing survives the process.
    pub fn preview() -> Self {
        Self {
            workspace: None,
            source: Box::new(MemorySource::new()),
        }
    }
}
