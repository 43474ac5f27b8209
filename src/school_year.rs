//! School-year lifecycle: creation and the single-Active activation switch.

use crate::assign::AssignPolicy;
use crate::model::{SchoolYear, SchoolYearStatus, Section};
use crate::store::{SchoolYearRepo, SectionRepo, StoreError};
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivationMode {
    /// One transaction flips the previous Active row and the target.
    Atomic,
    /// Two separate writes. Between them no school year is Active, and a
    /// concurrent reader can observe that state.
    Sequential,
}

impl ActivationMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "atomic" => Some(Self::Atomic),
            "sequential" => Some(Self::Sequential),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationOutcome {
    pub activated: String,
    pub deactivated: Vec<String>,
    pub mode_used: ActivationMode,
}

#[derive(Debug, Error)]
pub enum SchoolYearError {
    #[error("invalid school year: {0}")]
    Invalid(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SchoolYearError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "bad_params",
            Self::NotFound(_) => "not_found",
            Self::Store(StoreError::NotFound(_)) => "not_found",
            Self::Store(_) => "db_update_failed",
        }
    }
}

/// New years always start Inactive and come with their unclassified section.
pub fn create_school_year<S>(
    store: &S,
    policy: &AssignPolicy,
    code: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<SchoolYear, SchoolYearError>
where
    S: SchoolYearRepo + SectionRepo + ?Sized,
{
    let code = code.trim();
    if code.is_empty() {
        return Err(SchoolYearError::Invalid("code must not be empty".into()));
    }
    if start_date >= end_date {
        return Err(SchoolYearError::Invalid(
            "startDate must be before endDate".into(),
        ));
    }

    let year = SchoolYear {
        id: Uuid::new_v4().to_string(),
        code: code.to_string(),
        status: SchoolYearStatus::Inactive,
        start_date,
        end_date,
    };
    store.insert_school_year(&year)?;
    store.insert_section(&Section {
        id: Uuid::new_v4().to_string(),
        school_year_id: year.id.clone(),
        name: policy.unclassified_name.clone(),
        grade: None,
        track: None,
        strand: None,
        is_archived: false,
    })?;
    Ok(year)
}

pub fn activate_school_year<S>(
    store: &S,
    target_id: &str,
    mode: ActivationMode,
) -> Result<ActivationOutcome, SchoolYearError>
where
    S: SchoolYearRepo + ?Sized,
{
    let target = store
        .school_year(target_id)?
        .ok_or_else(|| SchoolYearError::NotFound(format!("school year {}", target_id)))?;

    if mode == ActivationMode::Atomic {
        match store.activate_atomic(&target.id) {
            Ok(deactivated) => {
                info!(school_year = %target.code, ?deactivated, "school year activated");
                return Ok(ActivationOutcome {
                    activated: target.id,
                    deactivated,
                    mode_used: ActivationMode::Atomic,
                });
            }
            Err(StoreError::Unsupported(what)) => {
                warn!(
                    school_year = %target.code,
                    unsupported = what,
                    "atomic activation unavailable; using sequential writes"
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    let deactivated = store.deactivate_all()?;
    // No Active school year exists until the next write lands.
    if !store.set_school_year_status(&target.id, SchoolYearStatus::Active)? {
        return Err(SchoolYearError::NotFound(format!("school year {}", target.id)));
    }
    warn!(
        school_year = %target.code,
        ?deactivated,
        "school year activated with sequential writes"
    );
    Ok(ActivationOutcome {
        activated: target.id,
        deactivated: deactivated.into_iter().filter(|id| id != target_id).collect(),
        mode_used: ActivationMode::Sequential,
    })
}

/// Give every year's unclassified section the name `to`. Nothing is written
/// when a regular section in any year already uses that name.
pub fn rename_unclassified_sections<S>(
    store: &S,
    from: &str,
    to: &str,
) -> Result<usize, SchoolYearError>
where
    S: SchoolYearRepo + SectionRepo + ?Sized,
{
    let to = to.trim();
    let mut sentinels = Vec::new();
    for year in store.list_school_years()? {
        let current = store.section_by_name(&year.id, from)?;
        if let Some(taken) = store.section_by_name(&year.id, to)? {
            if current.as_ref().map(|c| c.id.as_str()) != Some(taken.id.as_str()) {
                return Err(SchoolYearError::Invalid(format!(
                    "section name \"{}\" is already used in school year {}",
                    to, year.code
                )));
            }
        }
        sentinels.extend(current);
    }

    let renamed = sentinels.len();
    for mut section in sentinels {
        section.name = to.to_string();
        store.update_section(&section)?;
    }
    info!(from, to, renamed, "unclassified sections renamed");
    Ok(renamed)
}
