use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_reportcardd");
    let mut child = Command::new(exe)
        .env_remove("REPORTCARDD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn reportcardd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn read_response(reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let value = read_response(reader);
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(serde_json::Value::Null)
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("reportcard-router-smoke");
    let bundle_out = workspace.join("smoke-backup.zip");
    let csv_out = workspace.join("smoke-students.csv");
    let merit_out = workspace.join("smoke-merit.csv");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["storage"], json!("memory"));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let health = request_ok(&mut stdin, &mut reader, "3", "health", json!({}));
    assert_eq!(health["storage"], json!("sqlite"));

    let subject = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "subjects.upsert",
        json!({ "subject": { "name": "Math", "className": "Class 10", "maxMarksTheory": 80, "maxMarksAssessment": 20 } }),
    );
    let subject_id = subject["subjectId"].as_str().expect("subjectId").to_string();
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({ "student": { "name": "Rohan Sharma", "rollNo": "101", "className": "Class 10" } }),
    );
    let student_id = student["studentId"].as_str().expect("studentId").to_string();
    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "teachers.upsert",
        json!({ "teacher": { "name": "Meena", "assignedClasses": ["Class 10"] } }),
    );
    let teacher_id = teacher["teacherId"].as_str().expect("teacherId").to_string();

    let calls = vec![
        ("data.getAll", json!({})),
        ("auth.adminLogin", json!({ "username": "admin", "password": "password" })),
        ("auth.teacherLogin", json!({ "teacherId": teacher_id, "password": "password123" })),
        ("students.list", json!({ "className": "Class 10" })),
        ("students.update", json!({ "studentId": student_id, "patch": { "fatherName": "Amit Sharma" } })),
        ("students.sampleCsv", json!({})),
        ("students.exportCsv", json!({ "outPath": csv_out.to_string_lossy() })),
        ("teachers.list", json!({})),
        ("subjects.list", json!({ "className": "Class 10" })),
        ("marks.set", json!({ "studentId": student_id, "subjectId": subject_id, "examType": "Annual", "theory": 70, "assessment": 18 })),
        ("marks.bulkApply", json!({ "studentIds": [student_id], "subjectId": subject_id, "examType": "HalfYearly", "theory": 60 })),
        ("marks.list", json!({ "className": "Class 10" })),
        ("attendance.class", json!({ "className": "Class 10" })),
        ("attendance.setWorkingDays", json!({ "className": "Class 10", "totalDays": 200 })),
        ("attendance.update", json!({ "studentId": student_id, "presentDays": 185 })),
        ("remarks.summary", json!({ "studentId": student_id })),
        ("remarks.generate", json!({ "className": "Class 10" })),
        ("remarks.update", json!({ "studentId": student_id, "remarks": "Keep it up." })),
        ("config.get", json!({})),
        ("config.update", json!({ "patch": { "sessionYear": "2024-25" } })),
        ("config.setTemplatePreferences", json!({ "templateId": 2, "patch": { "showWatermark": true } })),
        ("results.lookup", json!({ "className": "Class 10", "rollNo": "101" })),
        ("reports.reportCardModel", json!({ "studentId": student_id })),
        ("analytics.dashboard", json!({})),
        ("reports.meritListModel", json!({})),
        ("reports.meritListCsv", json!({ "outPath": merit_out.to_string_lossy() })),
        ("backup.exportWorkspaceBundle", json!({ "outPath": bundle_out.to_string_lossy() })),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let id = format!("c{}", i);
        let _ = request_ok(&mut stdin, &mut reader, &id, method, params);
    }
    assert!(csv_out.is_file());
    assert!(merit_out.is_file());
    assert!(bundle_out.is_file());

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "backup.importWorkspaceBundle",
        json!({ "inPath": bundle_out.to_string_lossy() }),
    );
    let _ = request(&mut stdin, &mut reader, "8", "students.importCsv", json!({ "csvText": "header only" }));
    let _ = request(&mut stdin, &mut reader, "9", "subjects.delete", json!({ "subjectId": subject_id }));
    let _ = request(&mut stdin, &mut reader, "10", "teachers.delete", json!({ "teacherId": teacher_id }));
    let _ = request(&mut stdin, &mut reader, "11", "students.delete", json!({ "studentId": student_id }));
    let _ = request_ok(&mut stdin, &mut reader, "12", "data.setup", json!({}));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "data.updateCollection",
        json!({ "collectionName": "Students", "data": [] }),
    );
    let preview = request_ok(&mut stdin, &mut reader, "14", "workspace.usePreview", json!({}));
    assert_eq!(preview["storage"], json!("memory"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn unknown_methods_and_malformed_lines_get_error_envelopes() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{\"id\":\"x\",\"method\":\"grades.explode\",\"params\":{{}}}}")
        .expect("write request");
    stdin.flush().expect("flush");
    let resp = read_response(&mut reader);
    assert_eq!(resp["id"], json!("x"));
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("not_implemented"));

    writeln!(stdin).expect("write blank line");
    writeln!(stdin, "this is not json").expect("write garbage");
    stdin.flush().expect("flush");
    let resp = read_response(&mut reader);
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("bad_json"));
    assert!(resp.get("id").is_none());

    // Missing params defaults to an empty object.
    writeln!(stdin, "{{\"id\":\"h\",\"method\":\"health\"}}").expect("write health");
    stdin.flush().expect("flush");
    let resp = read_response(&mut reader);
    assert_eq!(resp["ok"], json!(true));
    assert!(resp["result"]["version"].is_string());

    let resp = request(
        &mut stdin,
        &mut reader,
        "s1",
        "students.update",
        json!({ "studentId": "missing", "patch": {} }),
    );
    assert_eq!(resp["error"]["code"], json!("not_found"));

    let resp = request(&mut stdin, &mut reader, "s2", "students.create", json!({}));
    assert_eq!(resp["error"]["code"], json!("bad_params"));

    drop(stdin);
    let _ = child.wait();
}
