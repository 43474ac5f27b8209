//! Section assignment core: eligibility, capacity tracking, section scoring
//! and the orchestration of bulk, single and reset operations.

pub mod eligibility;
pub mod engine;
pub mod policy;
pub mod tracker;

use crate::store::StoreError;
use std::fmt;
use thiserror::Error;

pub const DEFAULT_MAX_CAPACITY: u32 = 40;
pub const DEFAULT_GENDER_PENALTY_WEIGHT: f64 = 0.08;
pub const DEFAULT_TIE_BREAK_JITTER: f64 = 0.001;
pub const DEFAULT_UNCLASSIFIED_NAME: &str = "Unclassified";

/// Tunables for one assignment run, loaded from the `assignment` setup section.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignPolicy {
    pub max_capacity: u32,
    pub gender_penalty_weight: f64,
    pub tie_break_jitter: f64,
    pub unclassified_name: String,
}

impl Default for AssignPolicy {
    fn default() -> Self {
        Self {
            max_capacity: DEFAULT_MAX_CAPACITY,
            gender_penalty_weight: DEFAULT_GENDER_PENALTY_WEIGHT,
            tie_break_jitter: DEFAULT_TIE_BREAK_JITTER,
            unclassified_name: DEFAULT_UNCLASSIFIED_NAME.to_string(),
        }
    }
}

impl AssignPolicy {
    pub fn is_sentinel_name(&self, name: &str) -> bool {
        name.trim()
            .eq_ignore_ascii_case(self.unclassified_name.trim())
    }
}

/// Why a manual placement was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotEnrolled,
    SectionMissing,
    Archived,
    Sentinel,
    OtherSchoolYear,
    KeyMismatch,
    AtCapacity,
}

impl Rejection {
    pub fn reason(self) -> &'static str {
        match self {
            Self::NotEnrolled => "not_enrolled",
            Self::SectionMissing => "section_missing",
            Self::Archived => "archived",
            Self::Sentinel => "sentinel",
            Self::OtherSchoolYear => "other_school_year",
            Self::KeyMismatch => "key_mismatch",
            Self::AtCapacity => "at_capacity",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::NotEnrolled => "student is not enrolled",
            Self::SectionMissing => "section does not exist",
            Self::Archived => "section is archived",
            Self::Sentinel => "cannot assign to the unclassified section",
            Self::OtherSchoolYear => "section belongs to a different school year",
            Self::KeyMismatch => "grade/track/strand does not match the section",
            Self::AtCapacity => "section is at maximum capacity",
        };
        f.write_str(msg)
    }
}

#[derive(Debug, Error)]
pub enum AssignError {
    /// No active school year, or no unclassified section for it.
    #[error("precondition missing: {0}")]
    PreconditionMissing(String),

    #[error("validation failed: {0}")]
    ValidationFailed(Rejection),

    #[error("not found: {0}")]
    NotFound(String),

    /// Writes before the failure stay committed.
    #[error("persistence failure after {committed} committed placement(s): {source}")]
    Persistence {
        committed: usize,
        #[source]
        source: StoreError,
    },
}

impl From<StoreError> for AssignError {
    fn from(source: StoreError) -> Self {
        Self::Persistence {
            committed: 0,
            source,
        }
    }
}

impl AssignError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::PreconditionMissing(_) => "precondition_missing",
            Self::ValidationFailed(_) => "validation_failed",
            Self::NotFound(_) => "not_found",
            Self::Persistence { .. } => "db_update_failed",
        }
    }
}
