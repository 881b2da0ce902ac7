use crate::backup;
use crate::ipc::handlers::core::select_workspace;
use crate::ipc::helpers::{optional_str, required_str, respond, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::store::MemorySource;
use serde_json::json;
use std::path::{Path, PathBuf};

fn workspace_param(state: &AppState, req: &Request) -> Result<PathBuf, HandlerErr> {
    optional_str(req, "workspacePath")
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// Falls back to plain comparison when either path cannot be resolved.
fn same_workspace(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn handle_export_workspace_bundle(state: &mut AppState, req: &Request) -> HandlerResult {
    let out_path = required_str(req, "outPath")?;
    let workspace_path = workspace_param(state, req)?;

    let export = backup::export_workspace_bundle(&workspace_path, &PathBuf::from(&out_path))
        .map_err(|e| {
            HandlerErr::new("backup_failed", format!("{:#}", e))
                .with_details(json!({ "path": out_path }))
        })?;
    tracing::info!(path = %out_path, entries = export.entry_count, "workspace bundle exported");

    Ok(json!({
        "ok": true,
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "entryCount": export.entry_count,
        "dbSha256": export.db_sha256
    }))
}

fn handle_import_workspace_bundle(state: &mut AppState, req: &Request) -> HandlerResult {
    let in_path = required_str(req, "inPath")?;
    let workspace_path = workspace_param(state, req)?;
    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return Err(HandlerErr::not_found("bundle file not found")
            .with_details(json!({ "path": in_path })));
    }

    // Drop the open connection before replacing the file.
    let replacing_open = state
        .workspace
        .as_deref()
        .is_some_and(|open| same_workspace(open, &workspace_path));
    if replacing_open {
        state.source = Box::new(MemorySource::new());
        state.workspace = None;
    }

    let import = match backup::import_workspace_bundle(&src, &workspace_path) {
        Ok(v) => v,
        Err(e) => {
            if replacing_open {
                if let Err(reopen) = select_workspace(state, workspace_path.clone()) {
                    tracing::error!("failed to reopen workspace after import error: {:#}", reopen);
                }
            }
            return Err(HandlerErr::new("backup_failed", format!("{:#}", e))
                .with_details(json!({ "path": in_path })));
        }
    };
    select_workspace(state, workspace_path.clone())
        .map_err(|e| HandlerErr::new("db_open_failed", format!("{:#}", e)))?;

    Ok(json!({
        "ok": true,
        "workspacePath": workspace_path.to_string_lossy(),
        "bundleFormatDetected": import.bundle_format_detected
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backup.exportWorkspaceBundle" => handle_export_workspace_bundle(state, req),
        "backup.importWorkspaceBundle" => handle_import_workspace_bundle(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_workspace_sees_through_path_spelling() {
        let dir = std::env::temp_dir().join(format!("reportcard-same-ws-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create dir");
        let name = dir.file_name().expect("dir name");
        let roundabout = dir.join("..").join(name);

        assert!(same_workspace(&dir, &roundabout));
        assert!(!same_workspace(&dir, &std::env::temp_dir()));
        assert!(same_workspace(Path::new("/missing/ws"), Path::new("/missing/ws")));
        let _ = std::fs::remove_dir_all(dir);
    }
}
