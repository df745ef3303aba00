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
    let exe = env!("CARGO_BIN_EXE_homeworkd");
    let mut child = Command::new(exe)
        .env_remove("HOMEWORKD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn homeworkd");
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

fn error_code(value: &serde_json::Value) -> String {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn select(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, id: &str, path: &PathBuf) {
    let _ = request_ok(
        stdin,
        reader,
        id,
        "workspace.select",
        json!({ "path": path.to_string_lossy() }),
    );
}

fn record(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    subject: &str,
    statuses: &[&str],
) {
    let tasks: Vec<_> = statuses.iter().map(|s| json!({ "status": s })).collect();
    let _ = request_ok(
        stdin,
        reader,
        id,
        "potential.record",
        json!({ "subjectId": subject, "tasks": tasks }),
    );
}

#[test]
fn junk_import_is_rejected_and_history_survives() {
    let workspace = temp_dir("homework-exchange-junk");
    let junk = workspace.join("junk.txt");
    std::fs::write(&junk, "this is definitely not a history export\n").expect("write junk");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select(&mut stdin, &mut reader, "1", &workspace);
    record(&mut stdin, &mut reader, "2", "s-1", &["Good", "Better"]);

    let rejected = request(
        &mut stdin,
        &mut reader,
        "3",
        "exchange.importPotentialHistory",
        json!({ "inPath": junk.to_string_lossy() }),
    );
    assert_eq!(error_code(&rejected), "bad_file");
    assert_eq!(
        rejected["error"]["details"]["path"],
        json!(junk.to_string_lossy())
    );

    let missing = request(
        &mut stdin,
        &mut reader,
        "4",
        "exchange.importPotentialHistory",
        json!({ "inPath": workspace.join("nope.json").to_string_lossy() }),
    );
    assert_eq!(error_code(&missing), "io_failed");

    // The open workspace is untouched.
    let history = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "potential.history",
        json!({ "subjectId": "s-1" }),
    );
    let snaps = history["snapshots"].as_array().expect("snapshots").clone();
    assert_eq!(snaps.len(), 1);
    assert_eq!(snaps[0]["percent"], 70);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn exported_history_merges_into_another_workspace() {
    let source = temp_dir("homework-exchange-src");
    let target = temp_dir("homework-exchange-dst");
    let file = source.join("out").join("history.json");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select(&mut stdin, &mut reader, "1", &source);
    record(&mut stdin, &mut reader, "2", "s-1", &["Good"]);
    record(&mut stdin, &mut reader, "3", "s-1", &["Perfect"]);
    record(&mut stdin, &mut reader, "4", "s-2", &["Bad"]);

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "exchange.exportPotentialHistory",
        json!({ "outPath": file.to_string_lossy(), "subjectId": "s-1" }),
    );
    assert_eq!(exported["snapshotsExported"], 2);
    assert_eq!(exported["format"], "homework-potential-history-v1");

    let text = std::fs::read_to_string(&file).expect("read export");
    let on_disk: serde_json::Value = serde_json::from_str(&text).expect("export is json");
    assert_eq!(on_disk["snapshots"][0]["percent"], 60);
    assert_eq!(on_disk["snapshots"][1]["percent"], 100);

    select(&mut stdin, &mut reader, "6", &target);
    let first = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "exchange.importPotentialHistory",
        json!({ "inPath": file.to_string_lossy() }),
    );
    assert_eq!((first["imported"].clone(), first["skipped"].clone()), (json!(2), json!(0)));

    let again = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "exchange.importPotentialHistory",
        json!({ "inPath": file.to_string_lossy() }),
    );
    assert_eq!((again["imported"].clone(), again["skipped"].clone()), (json!(0), json!(2)));

    // Imported rows keep their order, so the next record chains from the last one.
    let next = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "potential.record",
        json!({ "subjectId": "s-1", "tasks": [{ "status": "Better" }] }),
    );
    assert_eq!(next["previousPercent"], 100);
    assert_eq!(next["potential"]["delta"], -20);

    let other = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "potential.history",
        json!({ "subjectId": "s-2" }),
    );
    assert_eq!(other["snapshots"].as_array().map(|a| a.len()), Some(0));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(source);
    let _ = std::fs::remove_dir_all(target);
}

#[test]
fn tampered_export_is_rejected_without_partial_writes() {
    let workspace = temp_dir("homework-exchange-tampered");
    let file = workspace.join("history.json");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select(&mut stdin, &mut reader, "1", &workspace);
    record(&mut stdin, &mut reader, "2", "s-1", &["Good"]);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "exchange.exportPotentialHistory",
        json!({ "outPath": file.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "potential.clear",
        json!({ "subjectId": "s-1" }),
    );

    let mut doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&file).expect("read export"))
            .expect("parse export");
    doc["snapshots"][0]["percent"] = json!(100);
    std::fs::write(&file, doc.to_string()).expect("write tampered export");

    let rejected = request(
        &mut stdin,
        &mut reader,
        "5",
        "exchange.importPotentialHistory",
        json!({ "inPath": file.to_string_lossy() }),
    );
    assert_eq!(error_code(&rejected), "bad_file");
    let message = rejected["error"]["message"].as_str().unwrap_or("");
    assert!(message.contains("checksum mismatch"), "{}", message);

    let history = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "potential.history",
        json!({ "subjectId": "s-1" }),
    );
    assert_eq!(history["snapshots"].as_array().map(|a| a.len()), Some(0));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn exchange_requires_a_workspace_and_paths() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let no_ws = request(
        &mut stdin,
        &mut reader,
        "1",
        "exchange.exportPotentialHistory",
        json!({ "outPath": "history.json" }),
    );
    assert_eq!(error_code(&no_ws), "no_workspace");

    let workspace = temp_dir("homework-exchange-params");
    select(&mut stdin, &mut reader, "2", &workspace);
    let no_path = request(
        &mut stdin,
        &mut reader,
        "3",
        "exchange.importPotentialHistory",
        json!({}),
    );
    assert_eq!(error_code(&no_path), "bad_params");
    let bad_subject = request(
        &mut stdin,
        &mut reader,
        "4",
        "exchange.exportPotentialHistory",
        json!({ "outPath": workspace.join("h.json").to_string_lossy(), "subjectId": 7 }),
    );
    assert_eq!(error_code(&bad_subject), "bad_params");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
