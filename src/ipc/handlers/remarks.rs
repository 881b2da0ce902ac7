use crate::calc;
use crate::ipc::helpers::{load_snapshot, optional_str, required_str, respond, save, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::model::CollectionUpdate;
use crate::remarks::{performance_summary, RemarkGenerator, TemplateRemarks};
use serde_json::json;
use std::collections::HashSet;

fn handle_remarks_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let student_id = required_str(req, "studentId")?;
    let text = req
        .params
        .get("remarks")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| HandlerErr::bad_params("remarks must be a string"))?;
    let mut snapshot = load_snapshot(state)?;
    let student = snapshot
        .students
        .iter_mut()
        .find(|s| s.id == student_id)
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    student.remarks = if text.is_empty() { None } else { Some(text) };
    save(state, CollectionUpdate::Students(snapshot.students))?;
    Ok(json!({ "ok": true }))
}

fn handle_remarks_summary(state: &mut AppState, req: &Request) -> HandlerResult {
    let student_id = required_str(req, "studentId")?;
    let snapshot = load_snapshot(state)?;
    let student = snapshot
        .student(&student_id)
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    Ok(json!({
        "studentId": student.id,
        "summary": performance_summary(student, &snapshot.subjects, &snapshot.marks)
    }))
}

/// Targets are `studentIds` if given, else every student of `className`.
fn handle_remarks_generate(state: &mut AppState, req: &Request) -> HandlerResult {
    let ids: Option<HashSet<String>> = req
        .params
        .get("studentIds")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });
    let class_name = optional_str(req, "className");
    if ids.as_ref().map(|s| s.is_empty()).unwrap_or(true) && class_name.is_none() {
        return Err(HandlerErr::bad_params("provide studentIds or className"));
    }

    let mut snapshot = load_snapshot(state)?;
    let generator = TemplateRemarks;
    let mut generated = Vec::new();
    for student in snapshot.students.iter_mut() {
        let selected = match (&ids, &class_name) {
            (Some(set), _) if !set.is_empty() => set.contains(&student.id),
            (_, Some(c)) => &student.class_name == c,
            _ => false,
        };
        if !selected {
            continue;
        }
        let summary = calc::compute_student_summary(student, &snapshot.subjects, &snapshot.marks);
        let performance = performance_summary(student, &snapshot.subjects, &snapshot.marks);
        let text = generator.generate(student, &summary, &performance);
        generated.push(json!({ "studentId": student.id, "remarks": text }));
        student.remarks = Some(text);
    }
    if generated.is_empty() {
        return Err(HandlerErr::not_found("no matching students"));
    }
    save(state, CollectionUpdate::Students(snapshot.students))?;
    Ok(json!({ "generated": generated }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "remarks.update" => handle_remarks_update(state, req),
        "remarks.summary" => handle_remarks_summary(state, req),
        "remarks.generate" => handle_remarks_generate(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
