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

#[test]
fn removing_a_category_reindexes_stored_grades() {
    let workspace = temp_dir("rubricd-removal-reindex");
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
        json!({ "title": "Essay Writing - Argumentative" }),
    );
    let rubric_id = created["rubric"]["id"]
        .as_str()
        .expect("rubric id")
        .to_string();
    let line0 = created["rubric"]["rubricLines"][0]["lineId"]
        .as_str()
        .expect("line 0 id")
        .to_string();

    let mut line_ids = vec![line0];
    for (i, name) in ["Content", "Delivery", "Organization"].iter().enumerate() {
        if i > 0 {
            let added = request_ok(
                &mut stdin,
                &mut reader,
                &format!("add-{i}"),
                "rubrics.addLine",
                json!({ "rubricId": rubric_id }),
            );
            line_ids.push(added["line"]["lineId"].as_str().expect("line id").to_string());
        }
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("edit-{i}"),
            "rubrics.editLine",
            json!({ "rubricId": rubric_id, "lineId": line_ids[i], "categoryName": name }),
        );
    }
    // Trailing blank placeholder row.
    request_ok(
        &mut stdin,
        &mut reader,
        "add-blank",
        "rubrics.addLine",
        json!({ "rubricId": rubric_id }),
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "assign",
        "students.assign",
        json!({ "rubricId": rubric_id, "email": "paula.j@example.com" }),
    );
    for (i, tier) in [0, 1, 2].iter().enumerate() {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("cell-{i}"),
            "grading.selectCell",
            json!({ "rubricId": rubric_id, "categoryIndex": i, "gradingIndex": tier }),
        );
    }
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "get-before",
        "rubrics.get",
        json!({ "rubricId": rubric_id }),
    );
    assert_eq!(got["rubric"]["studentRubricGrade"][0]["currentGrade"], 60);

    // Remove the middle category: entries past it shift down by one, the
    // removed category's entry is dropped.
    let removed = request_ok(
        &mut stdin,
        &mut reader,
        "remove",
        "rubrics.removeLine",
        json!({ "rubricId": rubric_id, "lineId": line_ids[1] }),
    );
    assert_eq!(removed["removed"], true);
    assert_eq!(removed["maxGrade"], 50);

    let got = request_ok(
        &mut stdin,
        &mut reader,
        "get-after",
        "rubrics.get",
        json!({ "rubricId": rubric_id }),
    );
    let grade = &got["rubric"]["studentRubricGrade"][0];
    let locations = grade["rubricGradesLocation"].as_array().expect("locations");
    assert_eq!(locations.len(), 2);
    assert!(locations
        .iter()
        .any(|loc| loc["categoryIndex"] == 0 && loc["gradingIndex"] == 0));
    assert!(locations
        .iter()
        .any(|loc| loc["categoryIndex"] == 1 && loc["gradingIndex"] == 2));
    assert_eq!(grade["currentGrade"], 40);
    assert_eq!(got["rubric"]["rubricLines"].as_array().expect("lines").len(), 3);

    // Unknown line id: silent no-op.
    let noop = request_ok(
        &mut stdin,
        &mut reader,
        "remove-noop",
        "rubrics.removeLine",
        json!({ "rubricId": rubric_id, "lineId": "no-such-line" }),
    );
    assert_eq!(noop["removed"], false);
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "get-noop",
        "rubrics.get",
        json!({ "rubricId": rubric_id }),
    );
    assert_eq!(got["rubric"]["studentRubricGrade"][0]["currentGrade"], 40);
    assert_eq!(got["rubric"]["rubricLines"].as_array().expect("lines").len(), 3);
}
