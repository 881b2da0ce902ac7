use crate::db::SqliteSource;
use crate::ipc::helpers::{required_str, respond, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::store::MemorySource;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, _req: &Request) -> HandlerResult {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "storage": state.source.kind(),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
    }))
}

pub fn select_workspace(state: &mut AppState, path: PathBuf) -> anyhow::Result<()> {
    let source = SqliteSource::open(&path)?;
    tracing::info!(workspace = %source.workspace().display(), "workspace opened");
    state.source = Box::new(source);
    state.workspace = Some(path);
    Ok(())
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> HandlerResult {
    let path = PathBuf::from(required_str(req, "path")?);
    select_workspace(state, path.clone())
        .map_err(|e| HandlerErr::new("db_open_failed", format!("{:#}", e)))?;
    Ok(json!({ "workspacePath": path.to_string_lossy() }))
}

fn handle_workspace_use_preview(state: &mut AppState, _req: &Request) -> HandlerResult {
    tracing::warn!("switching to volatile preview storage; data will not be saved");
    state.source = Box::new(MemorySource::new());
    state.workspace = None;
    Ok(json!({ "storage": state.source.kind() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => handle_health(state, req),
        "workspace.select" => handle_workspace_select(state, req),
        "workspace.usePreview" => handle_workspace_use_preview(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
