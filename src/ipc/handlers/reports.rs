use crate::calc::{self, format_fixed};
use crate::ipc::helpers::{
    load_snapshot, optional_count, optional_str, params_obj, required_str, respond, HandlerErr,
    HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{template_name, Snapshot, Student, TEMPLATE_IDS};
use crate::remarks::DEFAULT_REMARK;
use chrono::Datelike;
use serde_json::{json, Value};

pub(super) fn current_year() -> i32 {
    chrono::Local::now().year()
}

/// `YYYY-MM-DD[Thh:mm...]` becomes `DD-MM-YYYY`; anything else is shown as stored.
fn format_dob(dob: &str) -> String {
    let date_part = dob.split('T').next().unwrap_or("");
    let parts: Vec<&str> = date_part.split('-').collect();
    if parts.len() == 3 && parts[0].len() == 4 {
        return format!("{}-{}-{}", parts[2], parts[1], parts[0]);
    }
    date_part.to_string()
}

fn parse_orientation(req: &Request) -> Result<&'static str, HandlerErr> {
    match optional_str(req, "orientation").as_deref() {
        None | Some("portrait") => Ok("portrait"),
        Some("landscape") => Ok("landscape"),
        Some(other) => Err(HandlerErr::bad_params("orientation must be portrait or landscape")
            .with_details(json!({ "orientation": other }))),
    }
}

/// Everything a renderer needs to draw one student's report card.
pub(super) fn report_card_model(
    snapshot: &Snapshot,
    student: &Student,
    requested_template: Option<u32>,
    year: i32,
) -> Value {
    let config = &snapshot.config;
    let template_id = match requested_template {
        Some(id) if TEMPLATE_IDS.contains(&id) => id,
        Some(_) => 1,
        None => config.active_template_id(),
    };
    let summary = calc::compute_student_summary(student, &snapshot.subjects, &snapshot.marks);
    let percentage_display = if summary.total_max > 0.0 {
        format_fixed(summary.percentage, 2)
    } else {
        "0".to_string()
    };
    let attendance_display = if student.attendance.total_days > 0 {
        format!("{}%", format_fixed(summary.attendance_percentage, 0))
    } else {
        "N/A".to_string()
    };
    let remarks = student
        .remarks
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_REMARK);

    json!({
        "header": {
            "schoolName": config.name,
            "address": config.address,
            "logoUrl": config.logo_url,
            "developerName": config.developer_name,
            "session": config.session_label(year),
        },
        "templateId": template_id,
        "templateName": template_name(template_id),
        "theme": config.resolved_theme(template_id),
        "student": {
            "id": student.id,
            "srNo": student.sr_no,
            "rollNo": student.roll_no,
            "name": student.name,
            "fatherName": student.father_name,
            "motherName": student.mother_name,
            "className": student.class_name,
            "dob": format_dob(&student.dob),
            "mobile": student.mobile,
            "address": student.address,
        },
        "subjects": summary.subjects,
        "totalObtained": summary.total_obtained,
        "totalMax": summary.total_max,
        "percentage": summary.percentage,
        "percentageDisplay": percentage_display,
        "grade": summary.grade,
        "attendance": {
            "totalDays": student.attendance.total_days,
            "presentDays": student.attendance.present_days,
            "percentage": summary.attendance_percentage,
            "display": attendance_display,
        },
        "remarks": remarks,
    })
}

fn handle_results_lookup(state: &mut AppState, req: &Request) -> HandlerResult {
    let class_name = required_str(req, "className")?;
    let roll_no = required_str(req, "rollNo")?.to_lowercase();
    let snapshot = load_snapshot(state)?;
    if !snapshot.config.is_results_published {
        return Err(HandlerErr::new(
            "results_unpublished",
            "Results have not been published yet.",
        ));
    }
    let student = snapshot
        .students
        .iter()
        .find(|s| s.class_name == class_name && s.roll_no.trim().to_lowercase() == roll_no)
        .ok_or_else(|| {
            HandlerErr::not_found("No result found for this roll number and class.")
                .with_details(json!({ "className": class_name }))
        })?;
    Ok(json!({
        "studentId": student.id,
        "reportCard": report_card_model(&snapshot, student, None, current_year())
    }))
}

fn handle_report_card_model(state: &mut AppState, req: &Request) -> HandlerResult {
    let student_id = required_str(req, "studentId")?;
    let template_id = optional_count(params_obj(req)?, "templateId")?;
    let orientation = parse_orientation(req)?;
    let snapshot = load_snapshot(state)?;
    let student = snapshot
        .student(&student_id)
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    let mut model = report_card_model(&snapshot, student, template_id, current_year());
    if let Some(obj) = model.as_object_mut() {
        obj.insert("orientation".into(), json!(orientation));
    }
    Ok(model)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "results.lookup" => handle_results_lookup(state, req),
        "reports.reportCardModel" => handle_report_card_model(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
