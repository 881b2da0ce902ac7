use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

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

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
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

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

fn load_collection(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    name: &str,
    data: serde_json::Value,
) {
    let id = format!("load-{}", name);
    let _ = request_ok(
        stdin,
        reader,
        &id,
        "data.updateCollection",
        json!({ "collectionName": name, "data": data }),
    );
}

/// Class 10 with Math and Science; s1 has full marks data, s2 has none.
fn seed_class_10(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) {
    load_collection(
        stdin,
        reader,
        "Students",
        json!([
            {
                "id": "s1", "srNo": 2024001, "rollNo": 101, "name": "Rohan Sharma",
                "className": "Class 10", "dob": "2008-05-20",
                "attendance": "{\"totalDays\":200,\"presentDays\":185}"
            },
            {
                "id": "s2", "rollNo": "102", "name": "Asha Verma", "className": "Class 10",
                "attendance": { "totalDays": 200, "presentDays": 200 }
            }
        ]),
    );
    load_collection(
        stdin,
        reader,
        "Subjects",
        json!([
            { "id": "math", "name": "Math", "className": "Class 10", "maxMarksTheory": "80", "maxMarksAssessment": 20 },
            { "id": "sci", "name": "Science", "className": "Class 10", "maxMarksTheory": 80, "maxMarksAssessment": "20" }
        ]),
    );
    load_collection(
        stdin,
        reader,
        "Marks",
        json!([
            { "studentId": "s1", "subjectId": "math", "examType": "HalfYearly", "theory": 70, "assessment": 18 },
            { "studentId": "s1", "subjectId": "math", "examType": "Annual", "theory": "75", "assessment": 19 },
            { "studentId": "s1", "subjectId": "sci", "examType": "HalfYearly", "theory": 65, "assessment": 15 },
            { "studentId": "s1", "subjectId": "sci", "examType": "Annual", "theory": 72, "assessment": 18 }
        ]),
    );
}

#[test]
fn report_card_model_matches_worked_example() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    seed_class_10(&mut stdin, &mut reader);

    let model = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "reports.reportCardModel",
        json!({ "studentId": "s1", "templateId": 2 }),
    );
    let subjects = model["subjects"].as_array().expect("subjects");
    assert_eq!(subjects.len(), 2);
    assert_eq!(subjects[0]["subjectName"], json!("Math"));
    assert_eq!(subjects[0]["grandTotal"], json!(182.0));
    assert_eq!(subjects[0]["maxTotal"], json!(200.0));
    assert_eq!(subjects[0]["percentage"], json!(91.0));
    assert_eq!(subjects[0]["grade"], json!("A+"));
    assert_eq!(subjects[0]["halfYearly"]["total"], json!(88.0));
    assert_eq!(subjects[1]["grandTotal"], json!(170.0));
    assert_eq!(subjects[1]["percentage"], json!(85.0));
    assert_eq!(subjects[1]["grade"], json!("A"));

    assert_eq!(model["totalObtained"], json!(352.0));
    assert_eq!(model["totalMax"], json!(400.0));
    assert_eq!(model["percentage"], json!(88.0));
    assert_eq!(model["percentageDisplay"], json!("88.00"));
    assert_eq!(model["grade"], json!("A"));
    assert_eq!(model["attendance"]["percentage"], json!(92.5));
    assert_eq!(model["attendance"]["display"], json!("93%"));
    assert_eq!(model["remarks"], json!("Promoted to next class."));
    assert_eq!(model["templateId"], json!(2));
    assert_eq!(model["theme"]["primaryColor"], json!("#4338ca"));
    assert_eq!(model["student"]["srNo"], json!("2024001"));
    assert_eq!(model["student"]["dob"], json!("20-05-2008"));
    assert_eq!(model["orientation"], json!("portrait"));

    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "reports.reportCardModel",
        json!({ "studentId": "s2" }),
    );
    assert_eq!(empty["totalObtained"], json!(0.0));
    assert_eq!(empty["percentage"], json!(0.0));
    assert_eq!(empty["grade"], json!("F"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn results_lookup_respects_publication_and_roll_matching() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    seed_class_10(&mut stdin, &mut reader);

    let found = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "results.lookup",
        json!({ "className": "Class 10", "rollNo": " 101 " }),
    );
    assert_eq!(found["studentId"], json!("s1"));
    assert_eq!(found["reportCard"]["grade"], json!("A"));

    let missing = request(
        &mut stdin,
        &mut reader,
        "2",
        "results.lookup",
        json!({ "className": "Class 9", "rollNo": "101" }),
    );
    assert_eq!(error_code(&missing), "not_found");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "config.update",
        json!({ "patch": { "isResultsPublished": false } }),
    );
    let hidden = request(
        &mut stdin,
        &mut reader,
        "4",
        "results.lookup",
        json!({ "className": "Class 10", "rollNo": "101" }),
    );
    assert_eq!(error_code(&hidden), "results_unpublished");

    let config = request_ok(&mut stdin, &mut reader, "5", "config.get", json!({}));
    assert_eq!(config["config"]["isResultsPublished"], json!(false));
    assert!(config["config"].get("adminPassword").is_none());

    let bad = request(
        &mut stdin,
        &mut reader,
        "6",
        "config.update",
        json!({ "patch": { "activeTemplate": 9 } }),
    );
    assert_eq!(error_code(&bad), "bad_params");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn dashboard_and_merit_list_exclude_zero_data_from_school_titles() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    seed_class_10(&mut stdin, &mut reader);

    let dashboard = request_ok(&mut stdin, &mut reader, "1", "analytics.dashboard", json!({}));
    assert_eq!(dashboard["counts"]["students"], json!(2));
    assert_eq!(dashboard["counts"]["classes"], json!(1));
    let class10 = &dashboard["classRankings"][0];
    assert_eq!(class10["className"], json!("Class 10"));
    assert_eq!(class10["top3"][0]["studentId"], json!("s1"));
    assert_eq!(class10["top3"][1]["studentId"], json!("s2"));
    // Within the class, full attendance wins regardless of marks.
    assert_eq!(class10["bestAttendance"]["studentId"], json!("s2"));
    // School-wide titles only consider students with marks.
    assert_eq!(dashboard["schoolSummary"]["schoolTopper"]["studentId"], json!("s1"));
    assert_eq!(
        dashboard["schoolSummary"]["schoolAttendanceLeader"]["studentId"],
        json!("s1")
    );

    let merit = request_ok(&mut stdin, &mut reader, "2", "reports.meritListModel", json!({}));
    assert_eq!(merit["classes"][0]["top3"][0]["percentageDisplay"], json!("88.00"));
    assert_eq!(merit["classes"][0]["top3"][0]["attendanceDisplay"], json!("92.5"));

    let csv = request_ok(&mut stdin, &mut reader, "3", "reports.meritListCsv", json!({}));
    assert_eq!(csv["rowsExported"], json!(2));
    let text = csv["csvText"].as_str().expect("csvText");
    assert!(text.contains("Class 10,1,Rohan Sharma,101,88.00%,92.5%"));

    let _ = request_ok(&mut stdin, &mut reader, "4", "data.setup", json!({}));
    let empty = request_ok(&mut stdin, &mut reader, "5", "analytics.dashboard", json!({}));
    assert!(empty["schoolSummary"]["schoolTopper"].is_null());
    assert_eq!(empty["classRankings"], json!([]));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn mark_entry_is_validated_against_subject_maxima() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    seed_class_10(&mut stdin, &mut reader);
    load_collection(
        &mut stdin,
        &mut reader,
        "Subjects",
        json!([
            { "id": "math", "name": "Math", "className": "Class 10", "maxMarksTheory": 80, "maxMarksAssessment": 20 },
            { "id": "draw", "name": "Drawing", "className": "Class 10", "maxMarksTheory": 50, "maxMarksAssessment": 0 }
        ]),
    );

    let over = request(
        &mut stdin,
        &mut reader,
        "1",
        "marks.set",
        json!({ "studentId": "s2", "subjectId": "math", "examType": "Annual", "theory": 81 }),
    );
    assert_eq!(error_code(&over), "bad_params");
    assert_eq!(over["error"]["details"]["max"], json!(80.0));

    let negative = request(
        &mut stdin,
        &mut reader,
        "2",
        "marks.set",
        json!({ "studentId": "s2", "subjectId": "math", "examType": "Annual", "assessment": -1 }),
    );
    assert_eq!(error_code(&negative), "bad_params");

    let no_ia = request(
        &mut stdin,
        &mut reader,
        "3",
        "marks.set",
        json!({ "studentId": "s2", "subjectId": "draw", "examType": "Annual", "assessment": 5 }),
    );
    assert_eq!(error_code(&no_ia), "bad_params");

    let bad_exam = request(
        &mut stdin,
        &mut reader,
        "4",
        "marks.set",
        json!({ "studentId": "s2", "subjectId": "math", "examType": "Midterm", "theory": 5 }),
    );
    assert_eq!(error_code(&bad_exam), "bad_params");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "marks.set",
        json!({ "studentId": "s2", "subjectId": "math", "examType": "Annual", "theory": "60" }),
    );
    assert_eq!(created["created"], json!(true));
    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "marks.set",
        json!({ "studentId": "s2", "subjectId": "math", "examType": "Annual", "assessment": 15 }),
    );
    assert_eq!(updated["created"], json!(false));

    let bulk = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "marks.bulkApply",
        json!({ "studentIds": ["s1", "s2"], "subjectId": "draw", "examType": "HalfYearly", "theory": 40 }),
    );
    assert_eq!(bulk["created"], json!(2));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "marks.list",
        json!({ "subjectId": "math", "examType": "Annual" }),
    );
    let marks = listed["marks"].as_array().expect("marks");
    let s2 = marks
        .iter()
        .find(|m| m["studentId"] == json!("s2"))
        .expect("s2 annual math");
    assert_eq!(s2["theory"], json!(60.0));
    assert_eq!(s2["assessment"], json!(15.0));

    let attendance = request(
        &mut stdin,
        &mut reader,
        "9",
        "attendance.update",
        json!({ "studentId": "s2", "presentDays": 201 }),
    );
    assert_eq!(error_code(&attendance), "bad_params");

    let removed = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "students.delete",
        json!({ "studentId": "s2" }),
    );
    assert_eq!(removed["marksRemoved"], json!(2));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn csv_import_appends_students_and_reports_skips() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    seed_class_10(&mut stdin, &mut reader);

    let sample = request_ok(&mut stdin, &mut reader, "1", "students.sampleCsv", json!({}));
    let sample_text = sample["csvText"].as_str().expect("csvText").to_string();
    assert!(sample_text.starts_with("SR No,Roll No,Name,Father Name,Mother Name,Class,Mobile,DOB,Address"));

    let csv = "SR No,Roll No,Name,Father Name,Mother Name,Class,Mobile,DOB,Address\n\
               2024010,110,Kiran Das,Ravi Das,Sita Das,Class 9,9000000000,2009-01-02,\"Lane 2, Pune\"\n\
               2024011,101,Dup Roll,,,Class 10,,,\n\
               bad,row\n";
    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.importCsv",
        json!({ "csvText": csv, "dryRun": true }),
    );
    assert_eq!(preview["imported"], json!(1));
    assert_eq!(preview["skipped"], json!(2));

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.importCsv",
        json!({ "csvText": csv }),
    );
    assert_eq!(imported["imported"], json!(1));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.list",
        json!({ "className": "Class 9" }),
    );
    let students = listed["students"].as_array().expect("students");
    assert_eq!(students.len(), 1);
    assert_eq!(students[0]["address"], json!("Lane 2, Pune"));
    assert_eq!(students[0]["attendance"], json!({ "totalDays": 0, "presentDays": 0 }));

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.exportCsv",
        json!({ "className": "Class 9" }),
    );
    assert_eq!(exported["rowsExported"], json!(1));
    assert!(exported["csvText"]
        .as_str()
        .unwrap_or("")
        .contains("2024010,110,Kiran Das,Ravi Das,Sita Das,Class 9,9000000000,2009-01-02,\"Lane 2, Pune\""));

    let all = request_ok(&mut stdin, &mut reader, "6", "students.list", json!({}));
    assert_eq!(all["students"].as_array().map(|a| a.len()), Some(3));

    let duplicate = request(
        &mut stdin,
        &mut reader,
        "7",
        "students.create",
        json!({ "student": { "name": "Other", "rollNo": "110", "className": "Class 9" } }),
    );
    assert_eq!(error_code(&duplicate), "conflict");

    drop(stdin);
    let _ = child.wait();
}
