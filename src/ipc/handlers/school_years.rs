use crate::ipc::error::{err, ok, school_year_err};
use crate::ipc::handlers::setup::{load_activation_mode, load_assign_policy};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use crate::school_year::{activate_school_year, create_school_year};
use crate::store::{SchoolYearRepo, SqliteStore};
use chrono::NaiveDate;
use serde_json::json;

fn parse_date_param(req: &Request, key: &str) -> Result<NaiveDate, serde_json::Value> {
    let raw = required_str(req, key)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| {
        err(
            &req.id,
            "bad_params",
            format!("{} must be YYYY-MM-DD", key),
            None,
        )
    })
}

fn handle_school_years_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "schoolYears": [] }));
    };
    match SqliteStore::new(conn).list_school_years() {
        Ok(years) => ok(&req.id, json!({ "schoolYears": years })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_school_years_active(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match SqliteStore::new(conn).active_school_year() {
        Ok(year) => ok(&req.id, json!({ "schoolYear": year })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_school_years_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let code = match required_str(req, "code") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let start = match parse_date_param(req, "startDate") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let end = match parse_date_param(req, "endDate") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let policy = match load_assign_policy(conn) {
        Ok(p) => p,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // Year row and its sentinel section land together or not at all.
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let year = match create_school_year(&SqliteStore::new(&tx), &policy, &code, start, end) {
        Ok(y) => y,
        Err(e) => return school_year_err(&req.id, &e),
    };
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({ "schoolYearId": year.id, "schoolYear": year }),
    )
}

fn handle_school_years_activate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let year_id = match required_str(req, "schoolYearId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let mode = match load_activation_mode(conn) {
        Ok(m) => m,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    match activate_school_year(&SqliteStore::new(conn), &year_id, mode) {
        Ok(outcome) => ok(&req.id, json!(outcome)),
        Err(e) => school_year_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schoolYears.list" => Some(handle_school_years_list(state, req)),
        "schoolYears.active" => Some(handle_school_years_active(state, req)),
        "schoolYears.create" => Some(handle_school_years_create(state, req)),
        "schoolYears.activate" => Some(handle_school_years_activate(state, req)),
        _ => None,
    }
}
