use crate::assign::engine::require_active_year;
use crate::ipc::error::{assign_err, err};
use crate::ipc::types::Request;
use crate::store::{SchoolYearRepo, SqliteStore};
use serde_json::Value;

/// Trimmed, non-empty string param.
pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            format!("{} must not be empty", key),
            None,
        )),
        None => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
    }
}

/// Absent or null -> None. Blank strings count as null.
pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, Value> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let t = s.trim();
            Ok(if t.is_empty() { None } else { Some(t.to_string()) })
        }
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            format!("{} must be a string or null", key),
            None,
        )),
    }
}

/// For patches: absent -> None (keep), null -> Some(None) (clear).
pub fn patch_str(req: &Request, key: &str) -> Result<Option<Option<String>>, Value> {
    if req.params.get(key).is_none() {
        return Ok(None);
    }
    optional_str(req, key).map(Some)
}

/// Explicit `schoolYearId`, or the active school year.
pub fn resolve_year_id(req: &Request, store: &SqliteStore<'_>) -> Result<String, Value> {
    if let Some(id) = optional_str(req, "schoolYearId")? {
        return match store.school_year(&id) {
            Ok(Some(y)) => Ok(y.id),
            Ok(None) => Err(err(&req.id, "not_found", "school year not found", None)),
            Err(e) => Err(err(&req.id, "db_query_failed", e.to_string(), None)),
        };
    }
    require_active_year(store)
        .map(|y| y.id)
        .map_err(|e| assign_err(&req.id, &e))
}
