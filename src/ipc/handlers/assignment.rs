use crate::assign::engine::{assign_one, auto_assign, reset_assignments};
use crate::ipc::error::{assign_err, err, ok};
use crate::ipc::handlers::setup::load_assign_policy;
use crate::ipc::helpers::{required_str, resolve_year_id};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteStore;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;

fn handle_auto_assign(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let policy = match load_assign_policy(conn) {
        Ok(p) => p,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    // A seed makes the shuffle and tie-breaks reproducible.
    let mut rng = match req.params.get("seed") {
        None | Some(serde_json::Value::Null) => StdRng::from_os_rng(),
        Some(v) => match v.as_u64() {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "seed must be a non-negative integer",
                    None,
                )
            }
        },
    };

    match auto_assign(&SqliteStore::new(conn), &policy, &mut rng) {
        Ok(summary) => {
            let assigned_count = summary.plan.assigned.len();
            let mut result = json!(summary);
            result["assignedCount"] = json!(assigned_count);
            ok(&req.id, result)
        }
        Err(e) => assign_err(&req.id, &e),
    }
}

fn handle_assign_one(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let section_id = match required_str(req, "sectionId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let policy = match load_assign_policy(conn) {
        Ok(p) => p,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    match assign_one(&SqliteStore::new(conn), &policy, &student_id, &section_id) {
        Ok(record) => ok(&req.id, json!(record)),
        Err(e) => assign_err(&req.id, &e),
    }
}

fn handle_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let confirmed = req
        .params
        .get("confirm")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if !confirmed {
        return err(
            &req.id,
            "bad_params",
            "reset requires confirm: true",
            None,
        );
    }
    let store = SqliteStore::new(conn);
    let year_id = match resolve_year_id(req, &store) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let policy = match load_assign_policy(conn) {
        Ok(p) => p,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    match reset_assignments(&store, &policy, &year_id) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "schoolYearId": year_id,
                "moved": summary.moved,
                "deleted": summary.deleted
            }),
        ),
        Err(e) => assign_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignment.autoAssign" => Some(handle_auto_assign(state, req)),
        "assignment.assignOne" => Some(handle_assign_one(state, req)),
        "assignment.reset" => Some(handle_reset(state, req)),
        _ => None,
    }
}
