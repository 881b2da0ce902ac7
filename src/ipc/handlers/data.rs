use crate::ipc::helpers::{load_snapshot, new_id, required_str, respond, save, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::model::{Collection, CollectionUpdate};
use serde_json::json;

fn handle_get_all(state: &mut AppState, _req: &Request) -> HandlerResult {
    let snapshot = load_snapshot(state)?;
    serde_json::to_value(&snapshot).map_err(|e| HandlerErr::new("storage_failed", e.to_string()))
}

fn fill_missing_ids(update: &mut CollectionUpdate) -> usize {
    let mut filled = 0;
    let mut fill = |id: &mut String| {
        if id.trim().is_empty() {
            *id = new_id();
            filled += 1;
        }
    };
    match update {
        CollectionUpdate::Students(rows) => rows.iter_mut().for_each(|r| fill(&mut r.id)),
        CollectionUpdate::Teachers(rows) => rows.iter_mut().for_each(|r| fill(&mut r.id)),
        CollectionUpdate::Subjects(rows) => rows.iter_mut().for_each(|r| fill(&mut r.id)),
        CollectionUpdate::Marks(_) | CollectionUpdate::Config(_) => {}
    }
    filled
}

fn handle_update_collection(state: &mut AppState, req: &Request) -> HandlerResult {
    let name = required_str(req, "collectionName")?;
    let collection = Collection::parse(&name).ok_or_else(|| {
        HandlerErr::bad_params("unknown collectionName")
            .with_details(json!({ "collectionName": name }))
    })?;
    let data = req.params.get("data").cloned().unwrap_or(serde_json::Value::Null);
    let mut update = CollectionUpdate::decode(collection, data).map_err(|e| {
        HandlerErr::bad_params(format!("invalid {} data: {}", collection.as_str(), e))
    })?;
    let ids_assigned = fill_missing_ids(&mut update);
    update.check_ids().map_err(|e| {
        HandlerErr::new("conflict", format!("invalid {} data: {}", collection.as_str(), e))
    })?;
    save(state, update)?;
    tracing::info!(collection = collection.as_str(), ids_assigned, "collection replaced");
    Ok(json!({ "result": "success", "idsAssigned": ids_assigned }))
}

fn handle_setup(state: &mut AppState, _req: &Request) -> HandlerResult {
    state
        .source
        .reset()
        .map_err(|e| HandlerErr::new("storage_failed", format!("{:#}", e)))?;
    tracing::info!(storage = state.source.kind(), "data source reset");
    Ok(json!({ "result": "success" }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "data.getAll" => handle_get_all(state, req),
        "data.updateCollection" => handle_update_collection(state, req),
        "data.setup" => handle_setup(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
