use crate::calc;
use crate::ipc::helpers::{
    load_snapshot, optional_count, params_obj, required_str, respond, save, HandlerErr,
    HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::CollectionUpdate;
use serde_json::json;

fn handle_attendance_class(state: &mut AppState, req: &Request) -> HandlerResult {
    let class_name = required_str(req, "className")?;
    let snapshot = load_snapshot(state)?;
    let rows: Vec<serde_json::Value> = snapshot
        .students
        .iter()
        .filter(|s| s.class_name == class_name)
        .map(|s| {
            let pct = calc::attendance_percentage(s);
            json!({
                "studentId": s.id,
                "rollNo": s.roll_no,
                "name": s.name,
                "totalDays": s.attendance.total_days,
                "presentDays": s.attendance.present_days,
                "attendancePercentage": pct,
                "attendanceDisplay": calc::round_off_1_decimal(pct),
            })
        })
        .collect();
    Ok(json!({ "className": class_name, "students": rows }))
}

/// Sets the class working days for every student in the class. Present days
/// above the new total are clamped down to it.
fn handle_set_working_days(state: &mut AppState, req: &Request) -> HandlerResult {
    let class_name = required_str(req, "className")?;
    let total_days = optional_count(params_obj(req)?, "totalDays")?
        .ok_or_else(|| HandlerErr::bad_params("missing totalDays"))?;
    let mut snapshot = load_snapshot(state)?;
    let mut updated = 0usize;
    let mut clamped = 0usize;
    for s in snapshot
        .students
        .iter_mut()
        .filter(|s| s.class_name == class_name)
    {
        s.attendance.total_days = total_days;
        if s.attendance.present_days > total_days {
            s.attendance.present_days = total_days;
            clamped += 1;
        }
        updated += 1;
    }
    if updated == 0 {
        return Err(HandlerErr::not_found("no students in class"));
    }
    save(state, CollectionUpdate::Students(snapshot.students))?;
    Ok(json!({ "updated": updated, "clamped": clamped }))
}

fn handle_attendance_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let student_id = required_str(req, "studentId")?;
    let obj = params_obj(req)?;
    let total_days = optional_count(obj, "totalDays")?;
    let present_days = optional_count(obj, "presentDays")?;
    if total_days.is_none() && present_days.is_none() {
        return Err(HandlerErr::bad_params("provide totalDays and/or presentDays"));
    }

    let mut snapshot = load_snapshot(state)?;
    let student = snapshot
        .students
        .iter_mut()
        .find(|s| s.id == student_id)
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    let mut next = student.attendance;
    if let Some(v) = total_days {
        next.total_days = v;
    }
    if let Some(v) = present_days {
        next.present_days = v;
    }
    if next.present_days > next.total_days {
        return Err(HandlerErr::bad_params("presentDays must not exceed totalDays")
            .with_details(json!({
                "totalDays": next.total_days,
                "presentDays": next.present_days
            })));
    }
    student.attendance = next;
    let pct = calc::attendance_percentage(student);

    save(state, CollectionUpdate::Students(snapshot.students))?;
    Ok(json!({
        "totalDays": next.total_days,
        "presentDays": next.present_days,
        "attendancePercentage": pct
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attendance.class" => handle_attendance_class(state, req),
        "attendance.setWorkingDays" => handle_set_working_days(state, req),
        "attendance.update" => handle_attendance_update(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
