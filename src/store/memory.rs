use super::{ResetSummary, SchoolYearRepo, SectionRepo, StoreError, StudentRepo};
use crate::model::{AssignmentRecord, SchoolYear, SchoolYearStatus, Section, Student};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

/// In-memory fake with knobs for failure injection.
#[derive(Default)]
pub struct MemoryStore {
    pub years: RefCell<Vec<SchoolYear>>,
    pub sections: RefCell<Vec<Section>>,
    pub students: RefCell<Vec<Student>>,
    /// `(school_year_id, student_id) -> section_id`
    pub join_rows: RefCell<BTreeMap<(String, String), String>>,
    /// Every write that touched a student, in order.
    pub writes: RefCell<Vec<AssignmentRecord>>,
    pub without_atomic_activation: bool,
    /// Fail every commit once this many have succeeded.
    pub fail_after_commits: Cell<Option<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_year(self, year: SchoolYear) -> Self {
        self.years.borrow_mut().push(year);
        self
    }

    pub fn with_section(self, section: Section) -> Self {
        self.sections.borrow_mut().push(section);
        self
    }

    pub fn with_student(self, student: Student) -> Self {
        self.students.borrow_mut().push(student);
        self
    }

    pub fn status_of(&self, year_id: &str) -> Option<SchoolYearStatus> {
        self.years
            .borrow()
            .iter()
            .find(|y| y.id == year_id)
            .map(|y| y.status)
    }

    pub fn section_of(&self, student_id: &str) -> Option<String> {
        self.students
            .borrow()
            .iter()
            .find(|s| s.id == student_id)
            .and_then(|s| s.current_section_id.clone())
    }
}

impl SchoolYearRepo for MemoryStore {
    fn list_school_years(&self) -> Result<Vec<SchoolYear>, StoreError> {
        Ok(self.years.borrow().clone())
    }

    fn school_year(&self, id: &str) -> Result<Option<SchoolYear>, StoreError> {
        Ok(self.years.borrow().iter().find(|y| y.id == id).cloned())
    }

    fn active_school_year(&self) -> Result<Option<SchoolYear>, StoreError> {
        Ok(self
            .years
            .borrow()
            .iter()
            .find(|y| y.status == SchoolYearStatus::Active)
            .cloned())
    }

    fn insert_school_year(&self, year: &SchoolYear) -> Result<(), StoreError> {
        self.years.borrow_mut().push(year.clone());
        Ok(())
    }

    fn activate_atomic(&self, id: &str) -> Result<Vec<String>, StoreError> {
        if self.without_atomic_activation {
            return Err(StoreError::Unsupported("atomic school year activation"));
        }
        let mut years = self.years.borrow_mut();
        if !years.iter().any(|y| y.id == id) {
            return Err(StoreError::NotFound(format!("school year {}", id)));
        }
        let mut deactivated = Vec::new();
        for y in years.iter_mut() {
            if y.id == id {
                y.status = SchoolYearStatus::Active;
            } else if y.status == SchoolYearStatus::Active {
                y.status = SchoolYearStatus::Inactive;
                deactivated.push(y.id.clone());
            }
        }
        Ok(deactivated)
    }

    fn deactivate_all(&self) -> Result<Vec<String>, StoreError> {
        let mut deactivated = Vec::new();
        for y in self.years.borrow_mut().iter_mut() {
            if y.status == SchoolYearStatus::Active {
                y.status = SchoolYearStatus::Inactive;
                deactivated.push(y.id.clone());
            }
        }
        Ok(deactivated)
    }

    fn set_school_year_status(
        &self,
        id: &str,
        status: SchoolYearStatus,
    ) -> Result<bool, StoreError> {
        match self.years.borrow_mut().iter_mut().find(|y| y.id == id) {
            Some(y) => {
                y.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl SectionRepo for MemoryStore {
    fn sections_for_year(&self, school_year_id: &str) -> Result<Vec<Section>, StoreError> {
        Ok(self
            .sections
            .borrow()
            .iter()
            .filter(|s| s.school_year_id == school_year_id)
            .cloned()
            .collect())
    }

    fn section(&self, id: &str) -> Result<Option<Section>, StoreError> {
        Ok(self.sections.borrow().iter().find(|s| s.id == id).cloned())
    }

    fn section_by_name(
        &self,
        school_year_id: &str,
        name: &str,
    ) -> Result<Option<Section>, StoreError> {
        Ok(self
            .sections
            .borrow()
            .iter()
            .find(|s| {
                s.school_year_id == school_year_id && s.name.trim().eq_ignore_ascii_case(name.trim())
            })
            .cloned())
    }

    fn insert_section(&self, section: &Section) -> Result<(), StoreError> {
        self.sections.borrow_mut().push(section.clone());
        Ok(())
    }

    fn update_section(&self, section: &Section) -> Result<(), StoreError> {
        let mut sections = self.sections.borrow_mut();
        let slot = sections
            .iter_mut()
            .find(|s| s.id == section.id)
            .ok_or_else(|| StoreError::NotFound(format!("section {}", section.id)))?;
        *slot = section.clone();
        Ok(())
    }
}

impl StudentRepo for MemoryStore {
    fn enrolled_students(&self, school_year_id: &str) -> Result<Vec<Student>, StoreError> {
        Ok(self
            .students
            .borrow()
            .iter()
            .filter(|s| s.school_year_id == school_year_id && s.is_enrolled())
            .cloned()
            .collect())
    }

    fn students_for_year(&self, school_year_id: &str) -> Result<Vec<Student>, StoreError> {
        Ok(self
            .students
            .borrow()
            .iter()
            .filter(|s| s.school_year_id == school_year_id)
            .cloned()
            .collect())
    }

    fn student(&self, id: &str) -> Result<Option<Student>, StoreError> {
        Ok(self.students.borrow().iter().find(|s| s.id == id).cloned())
    }

    fn insert_student(&self, student: &Student) -> Result<(), StoreError> {
        self.students.borrow_mut().push(student.clone());
        Ok(())
    }

    fn update_student(&self, student: &Student) -> Result<(), StoreError> {
        let mut students = self.students.borrow_mut();
        let slot = students
            .iter_mut()
            .find(|s| s.id == student.id)
            .ok_or_else(|| StoreError::NotFound(format!("student {}", student.id)))?;
        *slot = student.clone();
        Ok(())
    }

    fn commit_placement(
        &self,
        school_year_id: &str,
        record: &AssignmentRecord,
    ) -> Result<(), StoreError> {
        if let Some(limit) = self.fail_after_commits.get() {
            if self.writes.borrow().len() >= limit {
                return Err(StoreError::Unsupported("injected commit failure"));
            }
        }
        let mut students = self.students.borrow_mut();
        let student = students
            .iter_mut()
            .find(|s| s.id == record.student_id && s.school_year_id == school_year_id)
            .ok_or_else(|| StoreError::NotFound(format!("student {}", record.student_id)))?;
        student.current_section_id = Some(record.section_id.clone());
        self.join_rows.borrow_mut().insert(
            (school_year_id.to_string(), record.student_id.clone()),
            record.section_id.clone(),
        );
        self.writes.borrow_mut().push(record.clone());
        Ok(())
    }

    fn reset_year(
        &self,
        school_year_id: &str,
        unclassified_id: &str,
    ) -> Result<ResetSummary, StoreError> {
        let mut moved = 0;
        for s in self.students.borrow_mut().iter_mut() {
            if s.school_year_id == school_year_id
                && s.is_enrolled()
                && s.current_section_id.as_deref() != Some(unclassified_id)
            {
                s.current_section_id = Some(unclassified_id.to_string());
                moved += 1;
            }
        }
        let mut rows = self.join_rows.borrow_mut();
        let before = rows.len();
        rows.retain(|(year, _), _| year != school_year_id);
        Ok(ResetSummary {
            moved,
            deleted: before - rows.len(),
        })
    }
}
