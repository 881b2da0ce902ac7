use crate::calc::{self, format_fixed, ClassRanking, StudentSummary};
use crate::ipc::handlers::exchange::csv_quote;
use crate::ipc::handlers::reports::current_year;
use crate::ipc::helpers::{load_snapshot, optional_str, respond, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::model::Snapshot;
use serde_json::{json, Value};

fn class_rankings(snapshot: &Snapshot) -> Vec<ClassRanking> {
    calc::rank_classes(
        &snapshot.class_order(),
        &snapshot.students,
        &snapshot.subjects,
        &snapshot.marks,
    )
}

fn handle_dashboard(state: &mut AppState, _req: &Request) -> HandlerResult {
    let snapshot = load_snapshot(state)?;
    let rankings = class_rankings(&snapshot);
    let school = calc::rank_school(&snapshot.students, &snapshot.subjects, &snapshot.marks);
    let classes: Vec<Value> = rankings
        .iter()
        .map(|r| {
            json!({
                "className": r.class_name,
                "studentCount": r.members.len(),
                "top3": r.top3,
                "bestAttendance": r.best_attendance,
            })
        })
        .collect();
    Ok(json!({
        "counts": {
            "students": snapshot.students.len(),
            "teachers": snapshot.teachers.len(),
            "subjects": snapshot.subjects.len(),
            "marks": snapshot.marks.len(),
            "classes": rankings.len(),
        },
        "classRankings": classes,
        "schoolSummary": school,
        "resultsPublished": snapshot.config.is_results_published,
    }))
}

fn merit_row(rank: usize, s: &StudentSummary) -> Value {
    json!({
        "rank": rank,
        "studentId": s.student_id,
        "name": s.name,
        "rollNo": s.roll_no,
        "percentage": s.percentage,
        "percentageDisplay": format_fixed(s.percentage, 2),
        "attendanceDisplay": format_fixed(s.attendance_percentage, 1),
    })
}

fn merit_list_model(snapshot: &Snapshot, rankings: &[ClassRanking], year: i32) -> Value {
    let classes: Vec<Value> = rankings
        .iter()
        .map(|r| {
            let rows: Vec<Value> = r
                .top3
                .iter()
                .enumerate()
                .map(|(i, s)| merit_row(i + 1, s))
                .collect();
            json!({
                "className": r.class_name,
                "top3": rows,
                "bestAttendance": r.best_attendance.as_ref().map(|s| json!({
                    "studentId": s.student_id,
                    "name": s.name,
                    "rollNo": s.roll_no,
                    "attendanceDisplay": format_fixed(s.attendance_percentage, 1),
                })),
            })
        })
        .collect();
    json!({
        "schoolName": snapshot.config.name,
        "address": snapshot.config.address,
        "session": snapshot.config.session_label(year),
        "classes": classes,
    })
}

fn merit_list_csv(rankings: &[ClassRanking]) -> String {
    let mut out = String::from("Class,Rank,Student Name,Roll No,Percentage,Attendance\n");
    for r in rankings {
        for (i, s) in r.top3.iter().enumerate() {
            out.push_str(&format!(
                "{},{},{},{},{}%,{}%\n",
                csv_quote(&r.class_name),
                i + 1,
                csv_quote(&s.name),
                csv_quote(&s.roll_no),
                format_fixed(s.percentage, 2),
                format_fixed(s.attendance_percentage, 1),
            ));
        }
    }
    out
}

fn handle_merit_list_model(state: &mut AppState, _req: &Request) -> HandlerResult {
    let snapshot = load_snapshot(state)?;
    let rankings = class_rankings(&snapshot);
    Ok(merit_list_model(&snapshot, &rankings, current_year()))
}

fn handle_merit_list_csv(state: &mut AppState, req: &Request) -> HandlerResult {
    let snapshot = load_snapshot(state)?;
    let text = merit_list_csv(&class_rankings(&snapshot));
    let rows = text.lines().count().saturating_sub(1);
    match optional_str(req, "outPath") {
        Some(out_path) => {
            std::fs::write(&out_path, &text).map_err(|e| {
                HandlerErr::new("io_failed", format!("failed to write {}: {}", out_path, e))
            })?;
            Ok(json!({ "rowsExported": rows, "path": out_path }))
        }
        None => Ok(json!({ "rowsExported": rows, "csvText": text })),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "analytics.dashboard" => handle_dashboard(state, req),
        "reports.meritListModel" => handle_merit_list_model(state, req),
        "reports.meritListCsv" => handle_merit_list_csv(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
