use crate::ipc::helpers::{
    load_snapshot, new_id, optional_str, required_obj, required_str, respond, save, HandlerErr,
    HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{CollectionUpdate, Student};
use serde_json::{json, Map, Value};

fn decode_student(raw: Value) -> Result<Student, HandlerErr> {
    serde_json::from_value(raw).map_err(|e| HandlerErr::bad_params(format!("invalid student: {}", e)))
}

/// Trims identity fields and checks the record can be stored.
pub(super) fn validate_student(mut s: Student, others: &[Student]) -> Result<Student, HandlerErr> {
    s.name = s.name.trim().to_string();
    s.class_name = s.class_name.trim().to_string();
    s.roll_no = s.roll_no.trim().to_string();
    if s.name.is_empty() || s.class_name.is_empty() || s.roll_no.is_empty() {
        return Err(HandlerErr::bad_params("name, className and rollNo are required"));
    }
    if s.attendance.present_days > s.attendance.total_days {
        return Err(HandlerErr::bad_params("presentDays must not exceed totalDays"));
    }
    let taken = others
        .iter()
        .any(|o| o.id != s.id && o.class_name == s.class_name && o.roll_no.trim() == s.roll_no);
    if taken {
        return Err(HandlerErr::new(
            "conflict",
            format!("Roll No {} already exists in {}", s.roll_no, s.class_name),
        )
        .with_details(json!({ "className": s.class_name, "rollNo": s.roll_no })));
    }
    Ok(s)
}

fn matches_search(s: &Student, needle: &str) -> bool {
    s.name.to_lowercase().contains(&needle.to_lowercase()) || s.roll_no.contains(needle)
}

fn handle_students_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let class_name = optional_str(req, "className");
    let search = optional_str(req, "search");
    let snapshot = load_snapshot(state)?;
    let students: Vec<&Student> = snapshot
        .students
        .iter()
        .filter(|s| class_name.as_deref().map(|c| s.class_name == c).unwrap_or(true))
        .filter(|s| search.as_deref().map(|q| matches_search(s, q)).unwrap_or(true))
        .collect();
    Ok(json!({ "students": students }))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let raw = required_obj(req, "student")?;
    let mut student = decode_student(Value::Object(raw.clone()))?;
    let mut snapshot = load_snapshot(state)?;

    if student.id.trim().is_empty() {
        student.id = new_id();
    } else if snapshot.student(&student.id).is_some() {
        return Err(HandlerErr::new("conflict", "student id already exists"));
    }
    let student = validate_student(student, &snapshot.students)?;
    let student_id = student.id.clone();

    snapshot.students.push(student);
    save(state, CollectionUpdate::Students(snapshot.students))?;
    Ok(json!({ "studentId": student_id }))
}

pub(super) fn apply_patch<T>(current: &T, patch: &Map<String, Value>) -> Result<T, HandlerErr>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let mut merged = serde_json::to_value(current)
        .map_err(|e| HandlerErr::new("storage_failed", e.to_string()))?;
    if let Some(obj) = merged.as_object_mut() {
        for (k, v) in patch {
            if k != "id" {
                obj.insert(k.clone(), v.clone());
            }
        }
    }
    serde_json::from_value(merged).map_err(|e| HandlerErr::bad_params(format!("invalid patch: {}", e)))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let student_id = required_str(req, "studentId")?;
    let patch = required_obj(req, "patch")?;
    let mut snapshot = load_snapshot(state)?;
    let idx = snapshot
        .students
        .iter()
        .position(|s| s.id == student_id)
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;

    let patched = apply_patch(&snapshot.students[idx], patch)?;
    let patched = validate_student(patched, &snapshot.students)?;
    snapshot.students[idx] = patched;
    save(state, CollectionUpdate::Students(snapshot.students))?;
    Ok(json!({ "ok": true }))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let student_id = required_str(req, "studentId")?;
    let mut snapshot = load_snapshot(state)?;
    let before = snapshot.students.len();
    snapshot.students.retain(|s| s.id != student_id);
    if snapshot.students.len() == before {
        return Err(HandlerErr::not_found("student not found"));
    }
    let marks_before = snapshot.marks.len();
    snapshot.marks.retain(|m| m.student_id != student_id);
    let marks_removed = marks_before - snapshot.marks.len();

    save(state, CollectionUpdate::Students(snapshot.students))?;
    if marks_removed > 0 {
        save(state, CollectionUpdate::Marks(snapshot.marks))?;
    }
    Ok(json!({ "ok": true, "marksRemoved": marks_removed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => handle_students_list(state, req),
        "students.create" => handle_students_create(state, req),
        "students.update" => handle_students_update(state, req),
        "students.delete" => handle_students_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
