use crate::ipc::helpers::{load_snapshot, new_id, required_obj, required_str, respond, save, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::model::{CollectionUpdate, Teacher};
use serde_json::{json, Value};

const DEFAULT_TEACHER_PASSWORD: &str = "password123";

fn teacher_json(t: &Teacher) -> Value {
    json!({
        "id": t.id,
        "name": t.name,
        "assignedClasses": t.assigned_classes,
    })
}

fn handle_teachers_list(state: &mut AppState, _req: &Request) -> HandlerResult {
    let snapshot = load_snapshot(state)?;
    let teachers: Vec<Value> = snapshot.teachers.iter().map(teacher_json).collect();
    Ok(json!({ "teachers": teachers }))
}

fn handle_teachers_upsert(state: &mut AppState, req: &Request) -> HandlerResult {
    let raw = required_obj(req, "teacher")?;
    let mut incoming: Teacher = serde_json::from_value(Value::Object(raw.clone()))
        .map_err(|e| HandlerErr::bad_params(format!("invalid teacher: {}", e)))?;
    incoming.name = incoming.name.trim().to_string();
    if incoming.name.is_empty() {
        return Err(HandlerErr::bad_params("teacher name is required"));
    }

    let mut snapshot = load_snapshot(state)?;
    let existing = snapshot
        .teachers
        .iter()
        .position(|t| !incoming.id.is_empty() && t.id == incoming.id);
    let created = existing.is_none();
    match existing {
        Some(idx) => {
            // A blank password on edit keeps the stored one.
            if incoming.password.trim().is_empty() {
                incoming.password = snapshot.teachers[idx].password.clone();
            }
            snapshot.teachers[idx] = incoming.clone();
        }
        None => {
            if incoming.id.trim().is_empty() {
                incoming.id = new_id();
            }
            if incoming.password.trim().is_empty() {
                incoming.password = DEFAULT_TEACHER_PASSWORD.to_string();
            }
            snapshot.teachers.push(incoming.clone());
        }
    }
    save(state, CollectionUpdate::Teachers(snapshot.teachers))?;
    Ok(json!({ "teacherId": incoming.id, "created": created }))
}

fn handle_teachers_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let teacher_id = required_str(req, "teacherId")?;
    let mut snapshot = load_snapshot(state)?;
    let before = snapshot.teachers.len();
    snapshot.teachers.retain(|t| t.id != teacher_id);
    if snapshot.teachers.len() == before {
        return Err(HandlerErr::not_found("teacher not found"));
    }
    save(state, CollectionUpdate::Teachers(snapshot.teachers))?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "teachers.list" => handle_teachers_list(state, req),
        "teachers.upsert" => handle_teachers_upsert(state, req),
        "teachers.delete" => handle_teachers_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
