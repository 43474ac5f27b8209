use crate::assign::AssignError;
use crate::school_year::SchoolYearError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn assign_err(id: &str, e: &AssignError) -> serde_json::Value {
    let details = match e {
        AssignError::ValidationFailed(r) => Some(json!({ "reason": r.reason() })),
        AssignError::Persistence { committed, .. } => Some(json!({ "committed": committed })),
        _ => None,
    };
    err(id, e.code(), e.to_string(), details)
}

pub fn school_year_err(id: &str, e: &SchoolYearError) -> serde_json::Value {
    err(id, e.code(), e.to_string(), None)
}
