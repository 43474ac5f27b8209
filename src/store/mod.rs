//! Persistence seam between the assignment core and the workspace database.
//!
//! The core only sees these traits. `SqliteStore` backs the sidecar; tests
//! use the in-memory fake.

#[cfg(test)]
pub mod memory;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::model::{AssignmentRecord, SchoolYear, SchoolYearStatus, Section, Student};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The backing store cannot perform the requested primitive. `SqliteStore`
    /// reports this for atomic activation when its connection is already
    /// inside a transaction.
    #[error("unsupported by this store: {0}")]
    Unsupported(&'static str),

    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetSummary {
    pub moved: usize,
    pub deleted: usize,
}

pub trait SchoolYearRepo {
    fn list_school_years(&self) -> Result<Vec<SchoolYear>, StoreError>;
    fn school_year(&self, id: &str) -> Result<Option<SchoolYear>, StoreError>;
    fn active_school_year(&self) -> Result<Option<SchoolYear>, StoreError>;
    fn insert_school_year(&self, year: &SchoolYear) -> Result<(), StoreError>;

    /// Flip the current Active row to Inactive and `id` to Active as one unit.
    /// Returns the ids that were deactivated.
    fn activate_atomic(&self, id: &str) -> Result<Vec<String>, StoreError>;

    /// Set every Active row to Inactive. Returns the ids touched.
    fn deactivate_all(&self) -> Result<Vec<String>, StoreError>;

    /// Returns false when no row has that id.
    fn set_school_year_status(&self, id: &str, status: SchoolYearStatus)
        -> Result<bool, StoreError>;
}

pub trait SectionRepo {
    fn sections_for_year(&self, school_year_id: &str) -> Result<Vec<Section>, StoreError>;
    fn section(&self, id: &str) -> Result<Option<Section>, StoreError>;
    fn section_by_name(
        &self,
        school_year_id: &str,
        name: &str,
    ) -> Result<Option<Section>, StoreError>;
    fn insert_section(&self, section: &Section) -> Result<(), StoreError>;
    fn update_section(&self, section: &Section) -> Result<(), StoreError>;
}

pub trait StudentRepo {
    /// Students of a school year with status Enrolled.
    fn enrolled_students(&self, school_year_id: &str) -> Result<Vec<Student>, StoreError>;
    fn students_for_year(&self, school_year_id: &str) -> Result<Vec<Student>, StoreError>;
    fn student(&self, id: &str) -> Result<Option<Student>, StoreError>;
    fn insert_student(&self, student: &Student) -> Result<(), StoreError>;
    fn update_student(&self, student: &Student) -> Result<(), StoreError>;

    /// Point the student at `record.section_id` and upsert the
    /// `(school_year_id, student_id)` join row. Both writes are guarded by
    /// `school_year_id`.
    fn commit_placement(
        &self,
        school_year_id: &str,
        record: &AssignmentRecord,
    ) -> Result<(), StoreError>;

    /// Move every Enrolled student of the year into `unclassified_id` and drop
    /// the year's join rows.
    fn reset_year(
        &self,
        school_year_id: &str,
        unclassified_id: &str,
    ) -> Result<ResetSummary, StoreError>;
}

/// Everything the sidecar handlers need from one store.
pub trait Store: SchoolYearRepo + SectionRepo + StudentRepo {}

impl<T: SchoolYearRepo + SectionRepo + StudentRepo> Store for T {}
