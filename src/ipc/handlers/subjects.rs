use crate::ipc::helpers::{
    load_snapshot, new_id, optional_str, required_obj, required_str, respond, save, HandlerErr,
    HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{CollectionUpdate, Subject};
use serde_json::{json, Value};

fn handle_subjects_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let class_name = optional_str(req, "className");
    let snapshot = load_snapshot(state)?;
    let subjects: Vec<&Subject> = snapshot
        .subjects
        .iter()
        .filter(|s| class_name.as_deref().map(|c| s.class_name == c).unwrap_or(true))
        .collect();
    Ok(json!({ "subjects": subjects }))
}

fn handle_subjects_upsert(state: &mut AppState, req: &Request) -> HandlerResult {
    let raw = required_obj(req, "subject")?;
    let mut subject: Subject = serde_json::from_value(Value::Object(raw.clone()))
        .map_err(|e| HandlerErr::bad_params(format!("invalid subject: {}", e)))?;
    subject.name = subject.name.trim().to_string();
    subject.class_name = subject.class_name.trim().to_string();
    if subject.name.is_empty() || subject.class_name.is_empty() {
        return Err(HandlerErr::bad_params("name and className are required"));
    }
    subject.max_marks_theory = subject.max_marks_theory.max(0.0);
    subject.max_marks_assessment = subject.max_marks_assessment.max(0.0);

    let mut snapshot = load_snapshot(state)?;
    let existing = snapshot
        .subjects
        .iter()
        .position(|s| !subject.id.is_empty() && s.id == subject.id);
    let created = existing.is_none();
    match existing {
        Some(idx) => snapshot.subjects[idx] = subject.clone(),
        None => {
            if subject.id.trim().is_empty() {
                subject.id = new_id();
            }
            snapshot.subjects.push(subject.clone());
        }
    }
    save(state, CollectionUpdate::Subjects(snapshot.subjects))?;
    Ok(json!({ "subjectId": subject.id, "created": created }))
}

fn handle_subjects_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let subject_id = required_str(req, "subjectId")?;
    let mut snapshot = load_snapshot(state)?;
    let before = snapshot.subjects.len();
    snapshot.subjects.retain(|s| s.id != subject_id);
    if snapshot.subjects.len() == before {
        return Err(HandlerErr::not_found("subject not found"));
    }
    let marks_before = snapshot.marks.len();
    snapshot.marks.retain(|m| m.subject_id != subject_id);
    let marks_removed = marks_before - snapshot.marks.len();

    save(state, CollectionUpdate::Subjects(snapshot.subjects))?;
    if marks_removed > 0 {
        save(state, CollectionUpdate::Marks(snapshot.marks))?;
    }
    Ok(json!({ "ok": true, "marksRemoved": marks_removed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "subjects.list" => handle_subjects_list(state, req),
        "subjects.upsert" => handle_subjects_upsert(state, req),
        "subjects.delete" => handle_subjects_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
