use crate::assign::{
    AssignPolicy, DEFAULT_GENDER_PENALTY_WEIGHT, DEFAULT_MAX_CAPACITY, DEFAULT_TIE_BREAK_JITTER,
    DEFAULT_UNCLASSIFIED_NAME,
};
use crate::db;
use crate::ipc::error::{err, ok, school_year_err};
use crate::ipc::types::{AppState, Request};
use crate::school_year::{rename_unclassified_sections, ActivationMode};
use crate::store::SqliteStore;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Assignment,
    SchoolYears,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "assignment" => Some(Self::Assignment),
            "schoolYears" => Some(Self::SchoolYears),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Assignment => "setup.assignment",
            Self::SchoolYears => "setup.schoolYears",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Assignment => json!({
            "maxCapacity": DEFAULT_MAX_CAPACITY,
            "genderPenaltyWeight": DEFAULT_GENDER_PENALTY_WEIGHT,
            "tieBreakJitter": DEFAULT_TIE_BREAK_JITTER,
            "unclassifiedSectionName": DEFAULT_UNCLASSIFIED_NAME
        }),
        SetupSection::SchoolYears => json!({
            "activationMode": "atomic"
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_f64_range(v: &Value, key: &str, min: f64, max: f64) -> Result<f64, String> {
    let n = v
        .as_f64()
        .ok_or_else(|| format!("{} must be a number", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Assignment => match k.as_str() {
                "maxCapacity" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 200)?));
                }
                "genderPenaltyWeight" => {
                    obj.insert(k.clone(), Value::from(parse_f64_range(v, k, 0.0, 1.0)?));
                }
                "tieBreakJitter" => {
                    obj.insert(k.clone(), Value::from(parse_f64_range(v, k, 0.0, 0.01)?));
                }
                "unclassifiedSectionName" => {
                    let s = parse_string_max(v, k, 64)?;
                    if s.is_empty() {
                        return Err(format!("{} must not be empty", k));
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                _ => return Err(format!("unknown assignment field: {}", k)),
            },
            SetupSection::SchoolYears => match k.as_str() {
                "activationMode" => {
                    let m = parse_string_max(v, k, 16)?.to_ascii_lowercase();
                    if ActivationMode::parse(&m).is_none() {
                        return Err("activationMode must be one of: atomic, sequential".into());
                    }
                    obj.insert(k.clone(), Value::String(m));
                }
                _ => return Err(format!("unknown schoolYears field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: malformed historical values fall back to defaults.
            let _ = merge_section_patch(section, &mut current, saved_obj);
        }
    }
    Ok(current)
}

pub fn load_assign_policy(conn: &rusqlite::Connection) -> anyhow::Result<AssignPolicy> {
    let v = load_section(conn, SetupSection::Assignment)?;
    let defaults = AssignPolicy::default();
    Ok(AssignPolicy {
        max_capacity: v
            .get("maxCapacity")
            .and_then(|x| x.as_u64())
            .map(|x| x as u32)
            .unwrap_or(defaults.max_capacity),
        gender_penalty_weight: v
            .get("genderPenaltyWeight")
            .and_then(|x| x.as_f64())
            .unwrap_or(defaults.gender_penalty_weight),
        tie_break_jitter: v
            .get("tieBreakJitter")
            .and_then(|x| x.as_f64())
            .unwrap_or(defaults.tie_break_jitter),
        unclassified_name: v
            .get("unclassifiedSectionName")
            .and_then(|x| x.as_str())
            .map(str::to_string)
            .unwrap_or(defaults.unclassified_name),
    })
}

pub fn load_activation_mode(conn: &rusqlite::Connection) -> anyhow::Result<ActivationMode> {
    let v = load_section(conn, SetupSection::SchoolYears)?;
    Ok(v.get("activationMode")
        .and_then(|x| x.as_str())
        .and_then(ActivationMode::parse)
        .unwrap_or(ActivationMode::Atomic))
}

fn sentinel_name(section: &Value) -> Option<String> {
    section
        .get("unclassifiedSectionName")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let assignment = match load_section(conn, SetupSection::Assignment) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let school_years = match load_section(conn, SetupSection::SchoolYears) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "assignment": assignment,
            "schoolYears": school_years
        }),
    )
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let before_name = sentinel_name(&current);
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    let after_name = sentinel_name(&current);

    // Existing unclassified sections follow the label in the same transaction.
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let mut renamed = 0;
    if let (Some(from), Some(to)) = (before_name, after_name) {
        if from != to {
            renamed = match rename_unclassified_sections(&SqliteStore::new(&tx), &from, &to) {
                Ok(n) => n,
                Err(e) => return school_year_err(&req.id, &e),
            };
        }
    }
    if let Err(e) = db::settings_set_json(&tx, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true, "renamedSections": renamed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
