use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::potential::{self, PotentialError, TaskStatus};
use crate::snapshots::{self, PotentialSnapshot};
use serde_json::json;
use uuid::Uuid;

const DEFAULT_HISTORY_LIMIT: i64 = 20;
const MAX_HISTORY_LIMIT: i64 = 500;

fn potential_err(id: &str, e: PotentialError) -> serde_json::Value {
    err(id, &e.code, e.message, e.details)
}

fn subject_id_param(req: &Request) -> Result<String, serde_json::Value> {
    match req.params.get("subjectId").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(err(&req.id, "bad_params", "missing subjectId", None)),
    }
}

fn handle_potential_compute(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let tasks = match potential::parse_tasks(req.params.get("tasks")) {
        Ok(v) => v,
        Err(e) => return potential_err(&req.id, e),
    };
    let previous = match potential::parse_previous_percent(req.params.get("previousPercent")) {
        Ok(v) => v,
        Err(e) => return potential_err(&req.id, e),
    };

    let result = potential::compute_potential(&tasks, previous);
    tracing::debug!(
        tasks = tasks.len(),
        percent = result.percent,
        label = result.label.as_str(),
        "potential computed"
    );
    ok(&req.id, json!(result))
}

fn handle_potential_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let subject_id = match subject_id_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let tasks = match potential::parse_tasks(req.params.get("tasks")) {
        Ok(v) => v,
        Err(e) => return potential_err(&req.id, e),
    };
    let explicit_previous =
        match potential::parse_previous_percent(req.params.get("previousPercent")) {
            Ok(v) => v,
            Err(e) => return potential_err(&req.id, e),
        };

    // Without an explicit previous score the trend is measured against the
    // subject's most recent snapshot.
    let previous = match explicit_previous {
        Some(p) => Some(p),
        None => match snapshots::latest_percent(conn, &subject_id) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
    };

    let result = potential::compute_potential(&tasks, previous);
    let snapshot = PotentialSnapshot {
        id: Uuid::new_v4().to_string(),
        subject_id,
        percent: result.percent,
        label: result.label.as_str().to_string(),
        delta: result.delta,
        task_count: tasks.len() as i64,
        recorded_at: chrono::Utc::now().to_rfc3339(),
    };

    if let Err(e) = snapshots::insert_snapshot(conn, &snapshot) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "potential_snapshots" })),
        );
    }

    tracing::info!(
        subject = %snapshot.subject_id,
        percent = snapshot.percent,
        delta = snapshot.delta,
        "potential snapshot recorded"
    );
    ok(
        &req.id,
        json!({
            "potential": result,
            "previousPercent": previous,
            "snapshot": snapshot,
        }),
    )
}

fn handle_potential_history(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let subject_id = match subject_id_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let limit = match req.params.get("limit") {
        None => DEFAULT_HISTORY_LIMIT,
        Some(v) if v.is_null() => DEFAULT_HISTORY_LIMIT,
        Some(v) => match v.as_i64() {
            Some(n) if (1..=MAX_HISTORY_LIMIT).contains(&n) => n,
            _ => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("limit must be an integer between 1 and {}", MAX_HISTORY_LIMIT),
                    None,
                )
            }
        },
    };

    match snapshots::recent_for_subject(conn, &subject_id, limit) {
        Ok(rows) => ok(
            &req.id,
            json!({ "subjectId": subject_id, "snapshots": rows }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_potential_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let subject_id = match subject_id_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match snapshots::delete_for_subject(conn, &subject_id) {
        Ok(deleted) => {
            tracing::info!(subject = %subject_id, deleted, "potential history cleared");
            ok(&req.id, json!({ "deleted": deleted }))
        }
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "potential_snapshots" })),
        ),
    }
}

fn handle_potential_ranks(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let ranks: Vec<_> = TaskStatus::ALL
        .iter()
        .map(|s| json!({ "status": s.as_str(), "score": s.score() }))
        .collect();
    ok(&req.id, json!({ "ranks": ranks }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "potential.compute" => Some(handle_potential_compute(state, req)),
        "potential.record" => Some(handle_potential_record(state, req)),
        "potential.history" => Some(handle_potential_history(state, req)),
        "potential.clear" => Some(handle_potential_clear(state, req)),
        "potential.ranks" => Some(handle_potential_ranks(state, req)),
        _ => None,
    }
}
