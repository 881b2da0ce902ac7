use crate::ipc::helpers::{
    load_snapshot, new_id, optional_str, respond, save, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Attendance, CollectionUpdate, Student};
use serde_json::json;
use std::path::PathBuf;

const STUDENT_CSV_HEADER: &str =
    "SR No,Roll No,Name,Father Name,Mother Name,Class,Mobile,DOB,Address";
const STUDENT_CSV_SAMPLE: &str =
    "2024001,101,Rohan Sharma,Amit Sharma,Priya Sharma,Class 10,9876543210,2008-05-20,Sector 4 Delhi";

pub(super) fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '"' {
            if in_quotes && i + 1 < chars.len() && chars[i + 1] == '"' {
                buf.push('"');
                i += 2;
                continue;
            }
            in_quotes = !in_quotes;
            i += 1;
            continue;
        }
        if ch == ',' && !in_quotes {
            out.push(buf);
            buf = String::new();
            i += 1;
            continue;
        }
        buf.push(ch);
        i += 1;
    }
    out.push(buf);
    out
}

fn write_output(out_path: &str, text: &str) -> Result<(), HandlerErr> {
    std::fs::write(PathBuf::from(out_path), text).map_err(|e| {
        HandlerErr::new("io_failed", format!("failed to write {}: {}", out_path, e))
    })
}

/// First line is the header. Rows with fewer than three columns, or whose roll
/// number is already taken in the class, are skipped with a warning.
fn parse_student_rows(text: &str, existing: &[Student]) -> (Vec<Student>, Vec<serde_json::Value>) {
    let mut rows: Vec<Student> = Vec::new();
    let mut warnings = Vec::new();
    for (line_no, raw_line) in text.lines().enumerate() {
        if line_no == 0 {
            continue;
        }
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<String> = parse_csv_record(line)
            .into_iter()
            .map(|f| f.trim().to_string())
            .collect();
        if fields.len() < 3 {
            warnings.push(json!({
                "line": line_no + 1,
                "code": "bad_columns",
                "message": "expected at least 3 CSV columns"
            }));
            continue;
        }
        let col = |i: usize| fields.get(i).cloned().unwrap_or_default();
        let student = Student {
            id: new_id(),
            sr_no: col(0),
            roll_no: col(1),
            name: col(2),
            father_name: col(3),
            mother_name: col(4),
            class_name: col(5),
            mobile: col(6),
            dob: col(7),
            address: col(8),
            attendance: Attendance::default(),
            ..Default::default()
        };
        let taken = !student.roll_no.is_empty()
            && existing
                .iter()
                .chain(rows.iter())
                .any(|o| o.class_name == student.class_name && o.roll_no.trim() == student.roll_no);
        if taken {
            warnings.push(json!({
                "line": line_no + 1,
                "code": "duplicate_roll_no",
                "message": format!("Roll No {} already exists in {}", student.roll_no, student.class_name)
            }));
            continue;
        }
        rows.push(student);
    }
    (rows, warnings)
}

fn handle_import_csv(state: &mut AppState, req: &Request) -> HandlerResult {
    let text = match (
        req.params.get("csvText").and_then(|v| v.as_str()),
        optional_str(req, "inPath"),
    ) {
        (Some(text), _) => text.to_string(),
        (None, Some(path)) => std::fs::read_to_string(&path).map_err(|e| {
            HandlerErr::new("io_failed", format!("failed to read {}: {}", path, e))
        })?,
        (None, None) => return Err(HandlerErr::bad_params("provide csvText or inPath")),
    };
    let dry_run = req
        .params
        .get("dryRun")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let mut snapshot = load_snapshot(state)?;
    let (rows, warnings) = parse_student_rows(&text, &snapshot.students);
    let imported = rows.len();
    if imported == 0 {
        return Err(HandlerErr::bad_params("No valid data found in CSV.")
            .with_details(json!({ "warnings": warnings })));
    }
    if !dry_run {
        snapshot.students.extend(rows);
        save(state, CollectionUpdate::Students(snapshot.students))?;
        tracing::info!(imported, skipped = warnings.len(), "students imported from csv");
    }
    Ok(json!({
        "dryRun": dry_run,
        "imported": imported,
        "skipped": warnings.len(),
        "warnings": warnings
    }))
}

fn student_csv_line(s: &Student) -> String {
    [
        &s.sr_no,
        &s.roll_no,
        &s.name,
        &s.father_name,
        &s.mother_name,
        &s.class_name,
        &s.mobile,
        &s.dob,
        &s.address,
    ]
    .iter()
    .map(|f| csv_quote(f))
    .collect::<Vec<_>>()
    .join(",")
}

fn handle_export_csv(state: &mut AppState, req: &Request) -> HandlerResult {
    let class_name = optional_str(req, "className");
    let snapshot = load_snapshot(state)?;
    let mut text = String::from(STUDENT_CSV_HEADER);
    text.push('\n');
    let mut rows = 0usize;
    for s in snapshot
        .students
        .iter()
        .filter(|s| class_name.as_deref().map(|c| s.class_name == c).unwrap_or(true))
    {
        text.push_str(&student_csv_line(s));
        text.push('\n');
        rows += 1;
    }
    match optional_str(req, "outPath") {
        Some(out_path) => {
            write_output(&out_path, &text)?;
            Ok(json!({ "rowsExported": rows, "path": out_path }))
        }
        None => Ok(json!({ "rowsExported": rows, "csvText": text })),
    }
}

fn handle_sample_csv(_state: &mut AppState, _req: &Request) -> HandlerResult {
    Ok(json!({
        "fileName": "student_upload_sample.csv",
        "csvText": format!("{}\n{}", STUDENT_CSV_HEADER, STUDENT_CSV_SAMPLE)
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.importCsv" => handle_import_csv(state, req),
        "students.exportCsv" => handle_export_csv(state, req),
        "students.sampleCsv" => handle_sample_csv(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
