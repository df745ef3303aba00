use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::preferences;
use serde_json::json;

fn handle_preferences_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.db.is_none() {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    }
    ok(&req.id, json!({ "preferences": state.preferences }))
}

fn handle_preferences_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut next = state.preferences.clone();
    if let Err(msg) = next.apply_patch(patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    // Cache only after the write succeeds.
    if let Err(e) = preferences::save(conn, &next) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::debug!(dark_mode = next.dark_mode, snow_effect = next.snow_effect, "preferences saved");
    state.preferences = next;
    ok(&req.id, json!({ "preferences": state.preferences }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "preferences.get" => Some(handle_preferences_get(state, req)),
        "preferences.update" => Some(handle_preferences_update(state, req)),
        _ => None,
    }
}
