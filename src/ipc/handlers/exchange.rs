use crate::exchange;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::snapshots;
use serde_json::json;
use std::path::PathBuf;

fn path_param(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
    }
}

fn handle_exchange_export_history(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let out_path = match path_param(req, "outPath") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let subject_id = match req.params.get("subjectId") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => match v.as_str() {
            Some(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => return err(&req.id, "bad_params", "subjectId must be a non-empty string", None),
        },
    };

    let rows = match snapshots::all_in_insertion_order(conn, subject_id.as_deref()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let file = match exchange::build_history_file(subject_id.as_deref(), rows) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "io_failed", e.to_string(), None),
    };
    let text = match serde_json::to_string_pretty(&file) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "io_failed", e.to_string(), None),
    };

    let out = PathBuf::from(&out_path);
    if let Some(parent) = out.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": out_path })),
            );
        }
    }
    if let Err(e) = std::fs::write(&out, text) {
        return err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": out_path })),
        );
    }

    tracing::info!(path = %out_path, snapshots = file.snapshot_count, "potential history exported");
    ok(
        &req.id,
        json!({
            "ok": true,
            "path": out_path,
            "format": file.format,
            "snapshotsExported": file.snapshot_count,
            "snapshotsSha256": file.snapshots_sha256
        }),
    )
}

/// Merges a history file into the open workspace. The file is fully checked
/// before anything is written, and all rows go in under one transaction.
fn handle_exchange_import_history(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let in_path = match path_param(req, "inPath") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let text = match std::fs::read_to_string(&in_path) {
        Ok(t) => t,
        Err(e) => {
            return err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": in_path })),
            )
        }
    };
    let incoming = match exchange::parse_history_file(&text) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(path = %in_path, error = %e, "history import rejected");
            return err(
                &req.id,
                "bad_file",
                format!("{e:#}"),
                Some(json!({ "path": in_path })),
            );
        }
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let mut imported = 0usize;
    let mut skipped = 0usize;
    for s in &incoming {
        match snapshots::insert_snapshot(&tx, s) {
            Ok(0) => skipped += 1,
            Ok(_) => imported += 1,
            Err(e) => {
                let _ = tx.rollback();
                return err(
                    &req.id,
                    "db_insert_failed",
                    e.to_string(),
                    Some(json!({ "table": "potential_snapshots" })),
                );
            }
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    tracing::info!(path = %in_path, imported, skipped, "potential history imported");
    ok(
        &req.id,
        json!({
            "ok": true,
            "path": in_path,
            "imported": imported,
            "skipped": skipped
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exchange.exportPotentialHistory" => Some(handle_exchange_export_history(state, req)),
        "exchange.importPotentialHistory" => Some(handle_exchange_import_history(state, req)),
        _ => None,
    }
}
