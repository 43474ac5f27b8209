#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
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

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_sectiond");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn sectiond");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

/// Sends one request and returns the whole response envelope.
pub fn request(
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

pub fn request_ok(
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
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

/// Expects a failure and returns the `error` object.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().unwrap_or_else(|| json!({}))
}

pub fn error_code(error: &serde_json::Value) -> &str {
    error.get("code").and_then(|v| v.as_str()).unwrap_or("")
}

pub fn error_reason(error: &serde_json::Value) -> &str {
    error
        .get("details")
        .and_then(|d| d.get("reason"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

pub fn str_field<'a>(value: &'a serde_json::Value, key: &str) -> &'a str {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", key, value))
}

/// Opens `workspace`, then creates and activates one school year.
/// Returns the school year id.
pub fn open_with_active_year(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &Path,
    code: &str,
) -> String {
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        stdin,
        reader,
        "sy-create",
        "schoolYears.create",
        json!({ "code": code, "startDate": "2025-06-01", "endDate": "2026-03-31" }),
    );
    let year_id = str_field(&created, "schoolYearId").to_string();
    let _ = request_ok(
        stdin,
        reader,
        "sy-activate",
        "schoolYears.activate",
        json!({ "schoolYearId": year_id }),
    );
    year_id
}

pub fn create_section(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    name: &str,
    grade: &str,
    track: &str,
    strand: Option<&str>,
) -> String {
    let created = request_ok(
        stdin,
        reader,
        &format!("sec-{}", name),
        "sections.create",
        json!({ "name": name, "grade": grade, "track": track, "strand": strand }),
    );
    str_field(&created, "sectionId").to_string()
}

pub fn create_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    n: usize,
    params: serde_json::Value,
) -> String {
    let mut body = json!({
        "firstName": format!("Student{}", n),
        "lastName": format!("Test{}", n),
    });
    if let (Some(obj), Some(extra)) = (body.as_object_mut(), params.as_object()) {
        for (k, v) in extra {
            obj.insert(k.clone(), v.clone());
        }
    }
    let created = request_ok(stdin, reader, &format!("stu-{}", n), "students.create", body);
    str_field(&created, "studentId").to_string()
}

pub fn list_sections(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    params: serde_json::Value,
) -> Vec<serde_json::Value> {
    let res = request_ok(stdin, reader, "sec-list", "sections.list", params);
    res.get("sections")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}

pub fn list_students(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    params: serde_json::Value,
) -> Vec<serde_json::Value> {
    let res = request_ok(stdin, reader, "stu-list", "students.list", params);
    res.get("students")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}
