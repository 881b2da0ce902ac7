use crate::ipc::helpers::{
    load_snapshot, optional_number, optional_str, params_obj, parse_exam_type, required_str,
    respond, save, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{CollectionUpdate, ExamType, MarkRecord, Subject};
use serde_json::json;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy)]
struct MarkInput {
    theory: Option<f64>,
    assessment: Option<f64>,
}

fn check_component(value: f64, max: f64, key: &str, subject: &Subject) -> Result<(), HandlerErr> {
    if value < 0.0 {
        return Err(HandlerErr::bad_params(format!("{} must not be negative", key)));
    }
    if value > max {
        let message = if max == 0.0 {
            format!("{} does not use {} marks", subject.name, key)
        } else {
            format!("{} must be at most {} for {}", key, max, subject.name)
        };
        return Err(HandlerErr::bad_params(message)
            .with_details(json!({ "field": key, "value": value, "max": max })));
    }
    Ok(())
}

fn parse_mark_input(req: &Request, subject: &Subject) -> Result<MarkInput, HandlerErr> {
    let obj = params_obj(req)?;
    let input = MarkInput {
        theory: optional_number(obj, "theory")?,
        assessment: optional_number(obj, "assessment")?,
    };
    if input.theory.is_none() && input.assessment.is_none() {
        return Err(HandlerErr::bad_params("provide theory and/or assessment"));
    }
    if let Some(v) = input.theory {
        check_component(v, subject.max_marks_theory, "theory", subject)?;
    }
    if let Some(v) = input.assessment {
        check_component(v, subject.max_marks_assessment, "assessment", subject)?;
    }
    Ok(input)
}

/// Updates the given fields of an existing record, or appends one with the
/// missing fields zeroed.
fn upsert_mark(
    marks: &mut Vec<MarkRecord>,
    student_id: &str,
    subject_id: &str,
    exam_type: ExamType,
    input: MarkInput,
) -> bool {
    if let Some(existing) = marks
        .iter_mut()
        .find(|m| m.key_matches(student_id, subject_id, exam_type))
    {
        if let Some(v) = input.theory {
            existing.theory = v;
        }
        if let Some(v) = input.assessment {
            existing.assessment = v;
        }
        return false;
    }
    marks.push(MarkRecord {
        student_id: student_id.to_string(),
        subject_id: subject_id.to_string(),
        exam_type,
        theory: input.theory.unwrap_or(0.0),
        assessment: input.assessment.unwrap_or(0.0),
    });
    true
}

fn handle_marks_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let class_name = optional_str(req, "className");
    let subject_id = optional_str(req, "subjectId");
    let exam_type = match optional_str(req, "examType") {
        Some(_) => Some(parse_exam_type(req)?),
        None => None,
    };
    let snapshot = load_snapshot(state)?;
    let class_students: Option<HashSet<&str>> = class_name.as_deref().map(|c| {
        snapshot
            .students
            .iter()
            .filter(|s| s.class_name == c)
            .map(|s| s.id.as_str())
            .collect()
    });
    let marks: Vec<&MarkRecord> = snapshot
        .marks
        .iter()
        .filter(|m| {
            class_students
                .as_ref()
                .map(|ids| ids.contains(m.student_id.as_str()))
                .unwrap_or(true)
        })
        .filter(|m| subject_id.as_deref().map(|s| m.subject_id == s).unwrap_or(true))
        .filter(|m| exam_type.map(|e| m.exam_type == e).unwrap_or(true))
        .collect();
    Ok(json!({ "marks": marks }))
}

fn handle_marks_set(state: &mut AppState, req: &Request) -> HandlerResult {
    let student_id = required_str(req, "studentId")?;
    let subject_id = required_str(req, "subjectId")?;
    let exam_type = parse_exam_type(req)?;
    let mut snapshot = load_snapshot(state)?;
    if snapshot.student(&student_id).is_none() {
        return Err(HandlerErr::not_found("student not found"));
    }
    let subject = snapshot
        .subject(&subject_id)
        .cloned()
        .ok_or_else(|| HandlerErr::not_found("subject not found"))?;
    let input = parse_mark_input(req, &subject)?;

    let created = upsert_mark(&mut snapshot.marks, &student_id, &subject_id, exam_type, input);
    save(state, CollectionUpdate::Marks(snapshot.marks))?;
    Ok(json!({ "created": created }))
}

fn parse_student_ids(req: &Request) -> Result<Vec<String>, HandlerErr> {
    let Some(raw) = req.params.get("studentIds").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing studentIds"));
    };
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for v in raw {
        let Some(id) = v.as_str() else {
            return Err(HandlerErr::bad_params("studentIds must contain only strings"));
        };
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(HandlerErr::bad_params("studentIds must not contain empty ids"));
        }
        if seen.insert(trimmed.to_string()) {
            out.push(trimmed.to_string());
        }
    }
    if out.is_empty() {
        return Err(HandlerErr::bad_params("studentIds must contain at least one id"));
    }
    Ok(out)
}

fn handle_marks_bulk_apply(state: &mut AppState, req: &Request) -> HandlerResult {
    let student_ids = parse_student_ids(req)?;
    let subject_id = required_str(req, "subjectId")?;
    let exam_type = parse_exam_type(req)?;
    let mut snapshot = load_snapshot(state)?;
    let subject = snapshot
        .subject(&subject_id)
        .cloned()
        .ok_or_else(|| HandlerErr::not_found("subject not found"))?;
    let input = parse_mark_input(req, &subject)?;

    let unknown: Vec<&String> = student_ids
        .iter()
        .filter(|id| snapshot.student(id).is_none())
        .collect();
    if !unknown.is_empty() {
        return Err(HandlerErr::not_found("unknown students in studentIds")
            .with_details(json!({ "studentIds": unknown })));
    }

    let mut created = 0usize;
    let mut updated = 0usize;
    for id in &student_ids {
        if upsert_mark(&mut snapshot.marks, id, &subject_id, exam_type, input) {
            created += 1;
        } else {
            updated += 1;
        }
    }
    save(state, CollectionUpdate::Marks(snapshot.marks))?;
    Ok(json!({ "created": created, "updated": updated }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "marks.list" => handle_marks_list(state, req),
        "marks.set" => handle_marks_set(state, req),
        "marks.bulkApply" => handle_marks_bulk_apply(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
