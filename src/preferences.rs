use crate::db;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{Map, Value};

const SETTINGS_KEY: &str = "preferences";

/// Client display preferences. Loaded once when a workspace is selected and
/// written back on every update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub dark_mode: bool,
    pub snow_effect: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            dark_mode: false,
            snow_effect: true,
        }
    }
}

impl Preferences {
    pub fn apply_patch(&mut self, patch: &Map<String, Value>) -> Result<(), String> {
        for (k, v) in patch {
            match k.as_str() {
                "darkMode" => self.dark_mode = parse_bool(v, k)?,
                "snowEffect" => self.snow_effect = parse_bool(v, k)?,
                _ => return Err(format!("unknown preference: {}", k)),
            }
        }
        Ok(())
    }
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be a boolean", key))
}

pub fn load(conn: &Connection) -> anyhow::Result<Preferences> {
    let mut current = Preferences::default();
    let Some(text) = db::settings_get_raw(conn, SETTINGS_KEY)? else {
        return Ok(current);
    };
    // Malformed historical values fall back to defaults.
    let saved: Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "stored preferences are not valid JSON, using defaults");
            return Ok(current);
        }
    };
    if let Some(saved_obj) = saved.as_object() {
        let mut candidate = current.clone();
        match candidate.apply_patch(saved_obj) {
            Ok(()) => current = candidate,
            Err(e) => tracing::warn!(error = %e, "stored preferences rejected, using defaults"),
        }
    }
    Ok(current)
}

pub fn save(conn: &Connection, prefs: &Preferences) -> anyhow::Result<()> {
    db::settings_set_json(conn, SETTINGS_KEY, &serde_json::to_value(prefs)?)
}
