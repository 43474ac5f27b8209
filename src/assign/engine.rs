use super::eligibility::{filter, group_by_key, is_usable_section};
use super::policy::select_section;
use super::tracker::CapacityTracker;
use super::{AssignError, AssignPolicy, Rejection};
use crate::model::{AssignmentRecord, SchoolYear, Section, Student};
use crate::store::{ResetSummary, SchoolYearRepo, SectionRepo, Store};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipBreakdown {
    pub missing_key: usize,
    pub no_matching_section: usize,
    pub at_capacity: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentPlan {
    pub candidates: usize,
    pub assigned: Vec<AssignmentRecord>,
    pub skipped: usize,
    pub skips: SkipBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoAssignSummary {
    pub school_year_id: String,
    #[serde(flatten)]
    pub plan: AssignmentPlan,
}

/// Plan placements over an in-memory snapshot of one school year.
///
/// Capacity counts are seeded from every Enrolled student in `students` and
/// updated after each placement, so later students see earlier ones.
pub fn plan<R: Rng>(
    students: &[Student],
    sections: &[Section],
    unclassified_id: &str,
    policy: &AssignPolicy,
    rng: &mut R,
) -> AssignmentPlan {
    let eligible = filter(students, sections, unclassified_id, policy);
    let pools = group_by_key(&eligible.usable_sections);
    let mut tracker = CapacityTracker::seed(students);

    let mut order = eligible.candidates;
    order.shuffle(rng);

    let mut out = AssignmentPlan {
        candidates: order.len(),
        ..AssignmentPlan::default()
    };

    for student in &order {
        let Some(key) = student.key() else {
            out.skips.missing_key += 1;
            continue;
        };
        let Some(pool) = pools.get(&key).filter(|p| !p.is_empty()) else {
            debug!(student_id = %student.id, key = %key, "no section for key");
            out.skips.no_matching_section += 1;
            continue;
        };
        let Some(section) = select_section(student, pool, &tracker, policy, rng) else {
            debug!(student_id = %student.id, key = %key, "every matching section is full");
            out.skips.at_capacity += 1;
            continue;
        };
        tracker.apply(&section.id, student.gender.as_ref());
        out.assigned.push(AssignmentRecord {
            student_id: student.id.clone(),
            section_id: section.id.clone(),
        });
    }

    out.skipped = out.skips.missing_key + out.skips.no_matching_section + out.skips.at_capacity;
    out
}

fn require_unclassified<S>(
    store: &S,
    year: &SchoolYear,
    policy: &AssignPolicy,
) -> Result<Section, AssignError>
where
    S: SectionRepo + ?Sized,
{
    store
        .section_by_name(&year.id, &policy.unclassified_name)?
        .ok_or_else(|| {
            AssignError::PreconditionMissing(format!(
                "no \"{}\" section in school year {}",
                policy.unclassified_name, year.code
            ))
        })
}

pub fn require_active_year<S>(store: &S) -> Result<SchoolYear, AssignError>
where
    S: SchoolYearRepo + ?Sized,
{
    store
        .active_school_year()?
        .ok_or_else(|| AssignError::PreconditionMissing("no active school year".into()))
}

/// Bulk-place every unclassified Enrolled student of the active school year.
///
/// Placements are committed one by one. A failed commit stops the run and
/// reports how many were already committed; those stay in place.
pub fn auto_assign<S, R>(
    store: &S,
    policy: &AssignPolicy,
    rng: &mut R,
) -> Result<AutoAssignSummary, AssignError>
where
    S: Store + ?Sized,
    R: Rng,
{
    let year = require_active_year(store)?;
    let unclassified = require_unclassified(store, &year, policy)?;

    let students = store.enrolled_students(&year.id)?;
    let sections = store.sections_for_year(&year.id)?;
    let plan = plan(&students, &sections, &unclassified.id, policy, rng);

    for (committed, record) in plan.assigned.iter().enumerate() {
        if let Err(source) = store.commit_placement(&year.id, record) {
            warn!(
                school_year = %year.code,
                committed,
                error = %source,
                "auto-assign stopped on a failed write"
            );
            return Err(AssignError::Persistence { committed, source });
        }
    }

    info!(
        school_year = %year.code,
        candidates = plan.candidates,
        assigned = plan.assigned.len(),
        skipped = plan.skipped,
        "auto-assign finished"
    );
    Ok(AutoAssignSummary {
        school_year_id: year.id,
        plan,
    })
}

/// Manually place one student. Every check runs before any write.
pub fn assign_one<S>(
    store: &S,
    policy: &AssignPolicy,
    student_id: &str,
    section_id: &str,
) -> Result<AssignmentRecord, AssignError>
where
    S: Store + ?Sized,
{
    let student = store
        .student(student_id)?
        .ok_or_else(|| AssignError::NotFound(format!("student {}", student_id)))?;
    if !student.is_enrolled() {
        return Err(AssignError::ValidationFailed(Rejection::NotEnrolled));
    }
    let year = store
        .school_year(&student.school_year_id)?
        .ok_or_else(|| AssignError::NotFound(format!("school year {}", student.school_year_id)))?;
    let unclassified = require_unclassified(store, &year, policy)?;

    let section = store
        .section(section_id)?
        .ok_or(AssignError::ValidationFailed(Rejection::SectionMissing))?;
    if section.is_archived {
        return Err(AssignError::ValidationFailed(Rejection::Archived));
    }
    if !is_usable_section(&section, &unclassified.id, policy) {
        return Err(AssignError::ValidationFailed(Rejection::Sentinel));
    }
    if section.school_year_id != student.school_year_id {
        return Err(AssignError::ValidationFailed(Rejection::OtherSchoolYear));
    }
    match (student.key(), section.key()) {
        (Some(a), Some(b)) if a == b => {}
        _ => return Err(AssignError::ValidationFailed(Rejection::KeyMismatch)),
    }

    let occupancy = store
        .enrolled_students(&year.id)?
        .iter()
        .filter(|s| s.id != student.id && s.current_section_id.as_deref() == Some(section.id.as_str()))
        .count();
    if occupancy >= policy.max_capacity as usize {
        return Err(AssignError::ValidationFailed(Rejection::AtCapacity));
    }

    let record = AssignmentRecord {
        student_id: student.id.clone(),
        section_id: section.id.clone(),
    };
    store.commit_placement(&year.id, &record)?;
    debug!(student_id, section = %section.name, "manual placement");
    Ok(record)
}

/// Send every Enrolled student of the year back to the unclassified section.
pub fn reset_assignments<S>(
    store: &S,
    policy: &AssignPolicy,
    school_year_id: &str,
) -> Result<ResetSummary, AssignError>
where
    S: Store + ?Sized,
{
    let year = store
        .school_year(school_year_id)?
        .ok_or_else(|| AssignError::NotFound(format!("school year {}", school_year_id)))?;
    let unclassified = require_unclassified(store, &year, policy)?;
    let summary = store.reset_year(&year.id, &unclassified.id)?;
    info!(
        school_year = %year.code,
        moved = summary.moved,
        deleted = summary.deleted,
        "assignments reset"
    );
    Ok(summary)
}
