use crate::assign::eligibility::is_candidate;
use crate::assign::Rejection;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::load_assign_policy;
use crate::ipc::helpers::{optional_str, patch_str, required_str, resolve_year_id};
use crate::ipc::types::{AppState, Request};
use crate::model::{EnrollmentStatus, Gender, Student};
use crate::store::{SectionRepo, SqliteStore, StudentRepo};
use serde_json::json;
use uuid::Uuid;

fn parse_status(req: &Request) -> Result<Option<EnrollmentStatus>, serde_json::Value> {
    match optional_str(req, "status")? {
        None => Ok(None),
        Some(raw) => EnrollmentStatus::parse(&raw).map(Some).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                "status must be one of: Enrolled, Pending, Withdrawn",
                None,
            )
        }),
    }
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };
    let store = SqliteStore::new(conn);
    let year_id = match resolve_year_id(req, &store) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let unassigned_only = req
        .params
        .get("unassignedOnly")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let mut students = match store.students_for_year(&year_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if unassigned_only {
        let policy = match load_assign_policy(conn) {
            Ok(p) => p,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        let unclassified_id = match store.section_by_name(&year_id, &policy.unclassified_name) {
            Ok(s) => s.map(|s| s.id).unwrap_or_default(),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        students.retain(|s| is_candidate(s, &unclassified_id));
    }

    ok(
        &req.id,
        json!({ "schoolYearId": year_id, "students": students }),
    )
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = SqliteStore::new(conn);
    let year_id = match resolve_year_id(req, &store) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let first_name = match required_str(req, "firstName") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let last_name = match required_str(req, "lastName") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let grade = match optional_str(req, "grade") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let track = match optional_str(req, "track") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let strand = match optional_str(req, "strand") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let gender = match optional_str(req, "gender") {
        Ok(v) => v.as_deref().and_then(Gender::parse),
        Err(resp) => return resp,
    };
    let status = match parse_status(req) {
        Ok(v) => v.unwrap_or(EnrollmentStatus::Enrolled),
        Err(resp) => return resp,
    };

    let policy = match load_assign_policy(conn) {
        Ok(p) => p,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let unclassified = match store.section_by_name(&year_id, &policy.unclassified_name) {
        Ok(Some(s)) => s,
        Ok(None) => {
            return err(
                &req.id,
                "precondition_missing",
                format!("no \"{}\" section in this school year", policy.unclassified_name),
                None,
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let student = Student {
        id: Uuid::new_v4().to_string(),
        school_year_id: year_id,
        first_name,
        last_name,
        grade,
        track,
        strand,
        gender,
        status,
        current_section_id: Some(unclassified.id),
    };
    if let Err(e) = store.insert_student(&student) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    ok(&req.id, json!({ "studentId": student.id, "student": student }))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = SqliteStore::new(conn);
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let mut student = match store.student(&student_id) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let before_key = student.key();
    let was_enrolled = student.is_enrolled();

    for (key, slot) in [
        ("firstName", &mut student.first_name),
        ("lastName", &mut student.last_name),
    ] {
        if req.params.get(key).is_some() {
            match required_str(req, key) {
                Ok(v) => *slot = v,
                Err(resp) => return resp,
            }
        }
    }
    for (key, slot) in [
        ("grade", &mut student.grade),
        ("track", &mut student.track),
        ("strand", &mut student.strand),
    ] {
        match patch_str(req, key) {
            Ok(Some(v)) => *slot = v,
            Ok(None) => {}
            Err(resp) => return resp,
        }
    }
    match patch_str(req, "gender") {
        Ok(Some(v)) => student.gender = v.as_deref().and_then(Gender::parse),
        Ok(None) => {}
        Err(resp) => return resp,
    }
    match parse_status(req) {
        Ok(Some(s)) => student.status = s,
        Ok(None) => {}
        Err(resp) => return resp,
    }

    let key_changed = student.key() != before_key;
    let re_enrolled = !was_enrolled && student.is_enrolled();
    if key_changed || re_enrolled {
        let policy = match load_assign_policy(conn) {
            Ok(p) => p,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        let placed_in = match student.current_section_id.as_deref() {
            Some(sid) => match store.section(sid) {
                Ok(s) => s.filter(|s| !policy.is_sentinel_name(&s.name)),
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            },
            None => None,
        };
        if let Some(section) = placed_in {
            // A placed student must keep matching the section it sits in.
            if key_changed {
                return err(
                    &req.id,
                    "validation_failed",
                    "grade/track/strand cannot change while the student is placed in a section",
                    Some(json!({ "reason": "placed_student_key_change" })),
                );
            }
            let occupancy = match store.enrolled_students(&student.school_year_id) {
                Ok(v) => v
                    .iter()
                    .filter(|s| {
                        s.id != student.id
                            && s.current_section_id.as_deref() == Some(section.id.as_str())
                    })
                    .count(),
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            };
            if occupancy >= policy.max_capacity as usize {
                return err(
                    &req.id,
                    "validation_failed",
                    Rejection::AtCapacity.to_string(),
                    Some(json!({ "reason": Rejection::AtCapacity.reason() })),
                );
            }
        }
    }

    if let Err(e) = store.update_student(&student) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "student": student }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        _ => None,
    }
}
