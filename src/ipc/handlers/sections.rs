use crate::assign::tracker::CapacityTracker;
use crate::assign::AssignPolicy;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::load_assign_policy;
use crate::ipc::helpers::{optional_str, patch_str, required_str, resolve_year_id};
use crate::ipc::types::{AppState, Request};
use crate::model::Section;
use crate::store::{SectionRepo, SqliteStore, StudentRepo};
use serde_json::json;
use uuid::Uuid;

fn load_policy(conn: &rusqlite::Connection, req: &Request) -> Result<AssignPolicy, serde_json::Value> {
    load_assign_policy(conn).map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))
}

fn handle_sections_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "sections": [] }));
    };
    let store = SqliteStore::new(conn);
    let year_id = match resolve_year_id(req, &store) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let policy = match load_policy(conn, req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let include_archived = req
        .params
        .get("includeArchived")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let sections = match store.sections_for_year(&year_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    // Counts are derived per read from the enrolled population.
    let tracker = match store.enrolled_students(&year_id) {
        Ok(students) => CapacityTracker::seed(&students),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows: Vec<serde_json::Value> = sections
        .iter()
        .filter(|s| include_archived || !s.is_archived)
        .map(|s| {
            json!({
                "id": s.id,
                "schoolYearId": s.school_year_id,
                "name": s.name,
                "grade": s.grade,
                "track": s.track,
                "strand": s.strand,
                "isArchived": s.is_archived,
                "isUnclassified": policy.is_sentinel_name(&s.name),
                "count": tracker.get(&s.id),
                "capacity": policy.max_capacity,
            })
        })
        .collect();

    ok(
        &req.id,
        json!({ "schoolYearId": year_id, "sections": rows }),
    )
}

fn handle_sections_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = SqliteStore::new(conn);
    let year_id = match resolve_year_id(req, &store) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let policy = match load_policy(conn, req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if policy.is_sentinel_name(&name) {
        return err(
            &req.id,
            "bad_params",
            "the unclassified section is created with the school year",
            None,
        );
    }
    let grade = match required_str(req, "grade") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let track = match required_str(req, "track") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let strand = match optional_str(req, "strand") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let section = Section {
        id: Uuid::new_v4().to_string(),
        school_year_id: year_id,
        name,
        grade: Some(grade),
        track: Some(track),
        strand,
        is_archived: false,
    };
    if let Err(e) = store.insert_section(&section) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "sections" })),
        );
    }

    ok(&req.id, json!({ "sectionId": section.id, "section": section }))
}

fn load_editable_section(
    req: &Request,
    store: &SqliteStore<'_>,
    policy: &AssignPolicy,
) -> Result<Section, serde_json::Value> {
    let section_id = required_str(req, "sectionId")?;
    let section = match store.section(&section_id) {
        Ok(Some(s)) => s,
        Ok(None) => return Err(err(&req.id, "not_found", "section not found", None)),
        Err(e) => return Err(err(&req.id, "db_query_failed", e.to_string(), None)),
    };
    if policy.is_sentinel_name(&section.name) {
        return Err(err(
            &req.id,
            "bad_params",
            "the unclassified section cannot be edited",
            None,
        ));
    }
    Ok(section)
}

fn handle_sections_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = SqliteStore::new(conn);
    let policy = match load_policy(conn, req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let mut section = match load_editable_section(req, &store, &policy) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let before_key = section.key();

    if req.params.get("name").is_some() {
        match required_str(req, "name") {
            Ok(v) if policy.is_sentinel_name(&v) => {
                return err(&req.id, "bad_params", "name is reserved", None)
            }
            Ok(v) => section.name = v,
            Err(resp) => return resp,
        }
    }
    for (key, slot) in [("grade", &mut section.grade), ("track", &mut section.track)] {
        if req.params.get(key).is_some() {
            match required_str(req, key) {
                Ok(v) => *slot = Some(v),
                Err(resp) => return resp,
            }
        }
    }
    match patch_str(req, "strand") {
        Ok(Some(v)) => section.strand = v,
        Ok(None) => {}
        Err(resp) => return resp,
    }

    // Students sitting here, whatever their status, were matched on the old key.
    if section.key() != before_key {
        let populated = match store.students_for_year(&section.school_year_id) {
            Ok(v) => v
                .iter()
                .any(|s| s.current_section_id.as_deref() == Some(section.id.as_str())),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if populated {
            return err(
                &req.id,
                "validation_failed",
                "grade/track/strand cannot change while students are placed in the section",
                Some(json!({ "reason": "populated_section_key_change" })),
            );
        }
    }

    if let Err(e) = store.update_section(&section) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "section": section }))
}

fn handle_sections_archive(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = SqliteStore::new(conn);
    let policy = match load_policy(conn, req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let mut section = match load_editable_section(req, &store, &policy) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    section.is_archived = req
        .params
        .get("archived")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    if let Err(e) = store.update_section(&section) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(
        &req.id,
        json!({ "sectionId": section.id, "isArchived": section.is_archived }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sections.list" => Some(handle_sections_list(state, req)),
        "sections.create" => Some(handle_sections_create(state, req)),
        "sections.update" => Some(handle_sections_update(state, req)),
        "sections.archive" => Some(handle_sections_archive(state, req)),
        _ => None,
    }
}
