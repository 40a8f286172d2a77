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
    let exe = env!("CARGO_BIN_EXE_rubricd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rubricd");
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
    assert!(!line.trim().is_empty(), "empty response for {}", method);
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
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
    expected_code: &str,
) {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    let code = value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("");
    assert_eq!(code, expected_code, "unexpected error for {}: {}", method, value);
}

#[test]
fn stale_saves_conflict_and_grades_are_renormalized() {
    let workspace = temp_dir("rubricd-save-versioning");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy(), "allowedDomain": "school.test" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "login",
        "auth.signIn",
        json!({ "email": "teacher@school.test", "name": "Avery Teacher" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "grant",
        "admin.grant",
        json!({ "email": "teacher@school.test" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "import",
        "admin.importStudents",
        json!({ "rows": [
            { "email": "paula.j@example.com", "full_name": "Paula Jones", "grade_level": "11" },
        ]}),
    );

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "create",
        "rubrics.create",
        json!({ "title": "Group Project - Historical Event" }),
    );
    let rubric_id = created["rubric"]["id"]
        .as_str()
        .expect("rubric id")
        .to_string();
    assert_eq!(created["revision"], 1);

    let got = request_ok(
        &mut stdin,
        &mut reader,
        "get",
        "rubrics.get",
        json!({ "rubricId": rubric_id }),
    );
    let mut doc = got["rubric"].clone();

    doc["header"]["title"] = json!("Group Project - Renamed");
    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "save-1",
        "rubrics.save",
        json!({ "rubric": doc.clone(), "expectedRevision": 1 }),
    );
    assert_eq!(saved["revision"], 2);

    // The same expectedRevision again is stale.
    request_err(
        &mut stdin,
        &mut reader,
        "save-stale",
        "rubrics.save",
        json!({ "rubric": doc.clone(), "expectedRevision": 1 }),
        "conflict",
    );

    // Without expectedRevision the save keeps last-write-wins behavior.
    doc["header"]["title"] = json!("Group Project - Clobbered");
    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "save-2",
        "rubrics.save",
        json!({ "rubric": doc.clone() }),
    );
    assert_eq!(saved["revision"], 3);

    // A full-document save renormalizes cached grades and may carry grade
    // records whose email no longer matches any roster document.
    doc["rubricLines"][0]["categoryName"] = json!("Content");
    doc["studentRubricGrade"] = json!([
        {
            "studentEmail": "paula.j@example.com",
            "rubricGradesLocation": [ { "categoryIndex": 0, "gradingIndex": 0 } ],
            "currentGrade": 999
        },
        {
            "studentEmail": "ghost@nowhere.test",
            "rubricGradesLocation": [],
            "currentGrade": 0
        }
    ]);
    request_ok(
        &mut stdin,
        &mut reader,
        "save-3",
        "rubrics.save",
        json!({ "rubric": doc }),
    );

    let got = request_ok(
        &mut stdin,
        &mut reader,
        "get-2",
        "rubrics.get",
        json!({ "rubricId": rubric_id }),
    );
    assert_eq!(got["rubric"]["header"]["title"], "Group Project - Clobbered");
    assert_eq!(got["rubric"]["studentRubricGrade"][0]["currentGrade"], 25);
    assert_eq!(
        got["rubric"]["studentRubricGrade"]
            .as_array()
            .expect("grades")
            .len(),
        2
    );

    // The join keeps unresolvable records visible as ghosts.
    let assigned = request_ok(
        &mut stdin,
        &mut reader,
        "assigned",
        "students.assignedList",
        json!({ "rubricId": rubric_id }),
    );
    assert_eq!(assigned["students"].as_array().expect("students").len(), 1);
    assert_eq!(assigned["students"][0]["email"], "paula.j@example.com");
    assert_eq!(assigned["students"][0]["currentGrade"], 25);
    assert_eq!(assigned["ghosts"], json!(["ghost@nowhere.test"]));
    assert_eq!(assigned["maxGrade"], 25);
}
