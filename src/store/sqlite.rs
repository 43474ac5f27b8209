use super::{ResetSummary, SchoolYearRepo, SectionRepo, StoreError, StudentRepo};
use crate::model::{
    AssignmentRecord, EnrollmentStatus, Gender, SchoolYear, SchoolYearStatus, Section, Student,
};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::debug;

const DATE_FORMAT: &str = "%Y-%m-%d";

const SCHOOL_YEAR_COLUMNS: &str = "id, code, status, start_date, end_date";
const SECTION_COLUMNS: &str = "id, school_year_id, name, grade, track, strand, is_archived";
const STUDENT_COLUMNS: &str = "id, school_year_id, first_name, last_name, grade, track, strand, gender, status, current_section_id";

/// Repository implementation over the workspace connection.
pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn parse_date(idx: usize, raw: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .map_err(|e| conversion_error(idx, format!("bad date {:?}: {}", raw, e)))
}

fn school_year_from_row(row: &Row<'_>) -> rusqlite::Result<SchoolYear> {
    let status_raw: String = row.get(2)?;
    let status = SchoolYearStatus::parse(&status_raw)
        .ok_or_else(|| conversion_error(2, format!("unknown school year status {:?}", status_raw)))?;
    Ok(SchoolYear {
        id: row.get(0)?,
        code: row.get(1)?,
        status,
        start_date: parse_date(3, row.get(3)?)?,
        end_date: parse_date(4, row.get(4)?)?,
    })
}

fn section_from_row(row: &Row<'_>) -> rusqlite::Result<Section> {
    let archived: i64 = row.get(6)?;
    Ok(Section {
        id: row.get(0)?,
        school_year_id: row.get(1)?,
        name: row.get(2)?,
        grade: row.get(3)?,
        track: row.get(4)?,
        strand: row.get(5)?,
        is_archived: archived != 0,
    })
}

fn student_from_row(row: &Row<'_>) -> rusqlite::Result<Student> {
    let gender: Option<String> = row.get(7)?;
    let status_raw: String = row.get(8)?;
    let status = EnrollmentStatus::parse(&status_raw)
        .ok_or_else(|| conversion_error(8, format!("unknown enrollment status {:?}", status_raw)))?;
    Ok(Student {
        id: row.get(0)?,
        school_year_id: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        grade: row.get(4)?,
        track: row.get(5)?,
        strand: row.get(6)?,
        gender: gender.as_deref().and_then(Gender::parse),
        status,
        current_section_id: row.get(9)?,
    })
}

impl SchoolYearRepo for SqliteStore<'_> {
    fn list_school_years(&self) -> Result<Vec<SchoolYear>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM school_years ORDER BY start_date DESC, code",
            SCHOOL_YEAR_COLUMNS
        ))?;
        let years = stmt
            .query_map([], school_year_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(years)
    }

    fn school_year(&self, id: &str) -> Result<Option<SchoolYear>, StoreError> {
        let year = self
            .conn
            .query_row(
                &format!("SELECT {} FROM school_years WHERE id = ?", SCHOOL_YEAR_COLUMNS),
                [id],
                school_year_from_row,
            )
            .optional()?;
        Ok(year)
    }

    fn active_school_year(&self) -> Result<Option<SchoolYear>, StoreError> {
        let year = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM school_years WHERE status = 'Active' LIMIT 1",
                    SCHOOL_YEAR_COLUMNS
                ),
                [],
                school_year_from_row,
            )
            .optional()?;
        Ok(year)
    }

    fn insert_school_year(&self, year: &SchoolYear) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO school_years(id, code, status, start_date, end_date, created_at)
             VALUES(?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
            (
                &year.id,
                &year.code,
                year.status.as_str(),
                year.start_date.format(DATE_FORMAT).to_string(),
                year.end_date.format(DATE_FORMAT).to_string(),
            ),
        )?;
        Ok(())
    }

    fn activate_atomic(&self, id: &str) -> Result<Vec<String>, StoreError> {
        // SQLite cannot nest BEGIN inside a caller's transaction.
        if !self.conn.is_autocommit() {
            return Err(StoreError::Unsupported("activation inside an open transaction"));
        }
        let tx = self.conn.unchecked_transaction()?;
        let exists: Option<i64> = tx
            .query_row("SELECT 1 FROM school_years WHERE id = ?", [id], |r| r.get(0))
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::NotFound(format!("school year {}", id)));
        }

        let deactivated = {
            let mut stmt =
                tx.prepare("SELECT id FROM school_years WHERE status = 'Active' AND id <> ?")?;
            let ids = stmt
                .query_map([id], |r| r.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };
        tx.execute(
            "UPDATE school_years SET status = 'Inactive' WHERE status = 'Active' AND id <> ?",
            [id],
        )?;
        tx.execute("UPDATE school_years SET status = 'Active' WHERE id = ?", [id])?;
        tx.commit()?;
        Ok(deactivated)
    }

    fn deactivate_all(&self) -> Result<Vec<String>, StoreError> {
        let ids = {
            let mut stmt = self
                .conn
                .prepare("SELECT id FROM school_years WHERE status = 'Active'")?;
            let ids = stmt
                .query_map([], |r| r.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };
        self.conn.execute(
            "UPDATE school_years SET status = 'Inactive' WHERE status = 'Active'",
            [],
        )?;
        Ok(ids)
    }

    fn set_school_year_status(
        &self,
        id: &str,
        status: SchoolYearStatus,
    ) -> Result<bool, StoreError> {
        let n = self.conn.execute(
            "UPDATE school_years SET status = ? WHERE id = ?",
            (status.as_str(), id),
        )?;
        Ok(n > 0)
    }
}

impl SectionRepo for SqliteStore<'_> {
    fn sections_for_year(&self, school_year_id: &str) -> Result<Vec<Section>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM sections WHERE school_year_id = ? ORDER BY name",
            SECTION_COLUMNS
        ))?;
        let sections = stmt
            .query_map([school_year_id], section_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sections)
    }

    fn section(&self, id: &str) -> Result<Option<Section>, StoreError> {
        let section = self
            .conn
            .query_row(
                &format!("SELECT {} FROM sections WHERE id = ?", SECTION_COLUMNS),
                [id],
                section_from_row,
            )
            .optional()?;
        Ok(section)
    }

    fn section_by_name(
        &self,
        school_year_id: &str,
        name: &str,
    ) -> Result<Option<Section>, StoreError> {
        let section = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM sections
                     WHERE school_year_id = ? AND lower(trim(name)) = lower(trim(?))
                     ORDER BY rowid
                     LIMIT 1",
                    SECTION_COLUMNS
                ),
                (school_year_id, name),
                section_from_row,
            )
            .optional()?;
        Ok(section)
    }

    fn insert_section(&self, section: &Section) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO sections(id, school_year_id, name, grade, track, strand, is_archived)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                &section.id,
                &section.school_year_id,
                &section.name,
                section.grade.as_deref(),
                section.track.as_deref(),
                section.strand.as_deref(),
                section.is_archived as i64,
            ),
        )?;
        Ok(())
    }

    fn update_section(&self, section: &Section) -> Result<(), StoreError> {
        let n = self.conn.execute(
            "UPDATE sections
             SET name = ?, grade = ?, track = ?, strand = ?, is_archived = ?
             WHERE id = ? AND school_year_id = ?",
            (
                &section.name,
                section.grade.as_deref(),
                section.track.as_deref(),
                section.strand.as_deref(),
                section.is_archived as i64,
                &section.id,
                &section.school_year_id,
            ),
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("section {}", section.id)));
        }
        Ok(())
    }
}

impl StudentRepo for SqliteStore<'_> {
    fn enrolled_students(&self, school_year_id: &str) -> Result<Vec<Student>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM students
             WHERE school_year_id = ? AND status = 'Enrolled'
             ORDER BY last_name, first_name, id",
            STUDENT_COLUMNS
        ))?;
        let students = stmt
            .query_map([school_year_id], student_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(students)
    }

    fn students_for_year(&self, school_year_id: &str) -> Result<Vec<Student>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM students
             WHERE school_year_id = ?
             ORDER BY last_name, first_name, id",
            STUDENT_COLUMNS
        ))?;
        let students = stmt
            .query_map([school_year_id], student_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(students)
    }

    fn student(&self, id: &str) -> Result<Option<Student>, StoreError> {
        let student = self
            .conn
            .query_row(
                &format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS),
                [id],
                student_from_row,
            )
            .optional()?;
        Ok(student)
    }

    fn insert_student(&self, student: &Student) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO students(
               id,
               school_year_id,
               first_name,
               last_name,
               grade,
               track,
               strand,
               gender,
               status,
               current_section_id,
               updated_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
            (
                &student.id,
                &student.school_year_id,
                &student.first_name,
                &student.last_name,
                student.grade.as_deref(),
                student.track.as_deref(),
                student.strand.as_deref(),
                student.gender.as_ref().map(Gender::as_str),
                student.status.as_str(),
                student.current_section_id.as_deref(),
            ),
        )?;
        Ok(())
    }

    fn update_student(&self, student: &Student) -> Result<(), StoreError> {
        let n = self.conn.execute(
            "UPDATE students
             SET first_name = ?,
                 last_name = ?,
                 grade = ?,
                 track = ?,
                 strand = ?,
                 gender = ?,
                 status = ?,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
             WHERE id = ? AND school_year_id = ?",
            (
                &student.first_name,
                &student.last_name,
                student.grade.as_deref(),
                student.track.as_deref(),
                student.strand.as_deref(),
                student.gender.as_ref().map(Gender::as_str),
                student.status.as_str(),
                &student.id,
                &student.school_year_id,
            ),
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("student {}", student.id)));
        }
        Ok(())
    }

    fn commit_placement(
        &self,
        school_year_id: &str,
        record: &AssignmentRecord,
    ) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        // The section must live in the same school year as the student.
        let n = tx.execute(
            "UPDATE students
             SET current_section_id = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
             WHERE id = ?2
               AND school_year_id = ?3
               AND EXISTS (SELECT 1 FROM sections WHERE id = ?1 AND school_year_id = ?3)",
            (&record.section_id, &record.student_id, school_year_id),
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!(
                "student {} / section {} in school year {}",
                record.student_id, record.section_id, school_year_id
            )));
        }
        tx.execute(
            "INSERT INTO section_assignments(school_year_id, student_id, section_id, assigned_at)
             VALUES(?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))
             ON CONFLICT(school_year_id, student_id) DO UPDATE SET
               section_id = excluded.section_id,
               assigned_at = excluded.assigned_at",
            (school_year_id, &record.student_id, &record.section_id),
        )?;
        tx.commit()?;
        debug!(
            student_id = %record.student_id,
            section_id = %record.section_id,
            "placement committed"
        );
        Ok(())
    }

    fn reset_year(
        &self,
        school_year_id: &str,
        unclassified_id: &str,
    ) -> Result<ResetSummary, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let moved = tx.execute(
            "UPDATE students
             SET current_section_id = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
             WHERE school_year_id = ?2
               AND status = 'Enrolled'
               AND (current_section_id IS NULL OR current_section_id <> ?1)",
            (unclassified_id, school_year_id),
        )?;
        let deleted = tx.execute(
            "DELETE FROM section_assignments WHERE school_year_id = ?",
            [school_year_id],
        )?;
        tx.commit()?;
        Ok(ResetSummary { moved, deleted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("schema");
        conn
    }

    fn year(id: &str, code: &str, status: SchoolYearStatus) -> SchoolYear {
        SchoolYear {
            id: id.into(),
            code: code.into(),
            status,
            start_date: NaiveDate::from_ymd_opt(2025, 6, 1).expect("date"),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 31).expect("date"),
        }
    }

    fn section(id: &str, year_id: &str, name: &str) -> Section {
        Section {
            id: id.into(),
            school_year_id: year_id.into(),
            name: name.into(),
            grade: Some("11".into()),
            track: Some("Academic".into()),
            strand: None,
            is_archived: false,
        }
    }

    fn student(id: &str, year_id: &str, section_id: Option<&str>) -> Student {
        Student {
            id: id.into(),
            school_year_id: year_id.into(),
            first_name: "Ana".into(),
            last_name: id.into(),
            grade: Some("11".into()),
            track: Some("Academic".into()),
            strand: None,
            gender: Some(Gender::Female),
            status: EnrollmentStatus::Enrolled,
            current_section_id: section_id.map(str::to_string),
        }
    }

    #[test]
    fn activate_inside_open_transaction_falls_back_to_sequential() {
        use crate::school_year::{activate_school_year, ActivationMode};

        let conn = setup();
        SqliteStore::new(&conn)
            .insert_school_year(&year("y25", "2025", SchoolYearStatus::Active))
            .expect("insert");
        SqliteStore::new(&conn)
            .insert_school_year(&year("y26", "2026", SchoolYearStatus::Inactive))
            .expect("insert");

        let tx = conn.unchecked_transaction().expect("tx");
        let store = SqliteStore::new(&tx);
        assert!(matches!(
            store.activate_atomic("y26"),
            Err(StoreError::Unsupported(_))
        ));
        let out = activate_school_year(&store, "y26", ActivationMode::Atomic).expect("activate");
        assert_eq!(out.mode_used, ActivationMode::Sequential);
        assert_eq!(out.deactivated, vec!["y25".to_string()]);
        tx.commit().expect("commit");

        let active = SqliteStore::new(&conn)
            .active_school_year()
            .expect("query")
            .expect("active");
        assert_eq!(active.id, "y26");
    }

    #[test]
    fn activate_atomic_flips_previous_active() {
        let conn = setup();
        let store = SqliteStore::new(&conn);
        store
            .insert_school_year(&year("y25", "2025", SchoolYearStatus::Active))
            .expect("insert");
        store
            .insert_school_year(&year("y26", "2026", SchoolYearStatus::Inactive))
            .expect("insert");

        let deactivated = store.activate_atomic("y26").expect("activate");
        assert_eq!(deactivated, vec!["y25".to_string()]);
        let active = store.active_school_year().expect("query").expect("active");
        assert_eq!(active.id, "y26");
        assert_eq!(
            store.school_year("y25").expect("q").expect("row").status,
            SchoolYearStatus::Inactive
        );
    }

    #[test]
    fn activate_atomic_unknown_target_leaves_state() {
        let conn = setup();
        let store = SqliteStore::new(&conn);
        store
            .insert_school_year(&year("y25", "2025", SchoolYearStatus::Active))
            .expect("insert");
        let res = store.activate_atomic("missing");
        assert!(matches!(res, Err(StoreError::NotFound(_))));
        assert_eq!(
            store.active_school_year().expect("q").map(|y| y.id),
            Some("y25".to_string())
        );
    }

    #[test]
    fn commit_placement_rejects_cross_year_section() {
        let conn = setup();
        let store = SqliteStore::new(&conn);
        store
            .insert_school_year(&year("y25", "2025", SchoolYearStatus::Active))
            .expect("insert");
        store
            .insert_school_year(&year("y26", "2026", SchoolYearStatus::Inactive))
            .expect("insert");
        store.insert_section(&section("s26", "y26", "Rizal")).expect("section");
        store.insert_student(&student("st1", "y25", None)).expect("student");

        let res = store.commit_placement(
            "y25",
            &AssignmentRecord {
                student_id: "st1".into(),
                section_id: "s26".into(),
            },
        );
        assert!(matches!(res, Err(StoreError::NotFound(_))));
        let join_rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM section_assignments", [], |r| r.get(0))
            .expect("count");
        assert_eq!(join_rows, 0);
    }

    #[test]
    fn commit_placement_upserts_single_join_row() {
        let conn = setup();
        let store = SqliteStore::new(&conn);
        store
            .insert_school_year(&year("y25", "2025", SchoolYearStatus::Active))
            .expect("insert");
        store.insert_section(&section("a", "y25", "Rizal")).expect("a");
        store.insert_section(&section("b", "y25", "Bonifacio")).expect("b");
        store.insert_student(&student("st1", "y25", None)).expect("student");

        for sid in ["a", "b"] {
            store
                .commit_placement(
                    "y25",
                    &AssignmentRecord {
                        student_id: "st1".into(),
                        section_id: sid.into(),
                    },
                )
                .expect("commit");
        }

        let rows: Vec<String> = conn
            .prepare("SELECT section_id FROM section_assignments WHERE student_id = 'st1'")
            .expect("prepare")
            .query_map([], |r| r.get(0))
            .expect("query")
            .collect::<Result<_, _>>()
            .expect("collect");
        assert_eq!(rows, vec!["b".to_string()]);
        assert_eq!(
            store
                .student("st1")
                .expect("q")
                .expect("row")
                .current_section_id
                .as_deref(),
            Some("b")
        );
    }

    #[test]
    fn reset_year_moves_enrolled_and_clears_join_rows() {
        let conn = setup();
        let store = SqliteStore::new(&conn);
        store
            .insert_school_year(&year("y25", "2025", SchoolYearStatus::Active))
            .expect("insert");
        store.insert_section(&section("u", "y25", "Unclassified")).expect("u");
        store.insert_section(&section("a", "y25", "Rizal")).expect("a");
        for i in 0..3 {
            let id = format!("st{}", i);
            store.insert_student(&student(&id, "y25", Some("u"))).expect("student");
            store
                .commit_placement(
                    "y25",
                    &AssignmentRecord {
                        student_id: id,
                        section_id: "a".into(),
                    },
                )
                .expect("commit");
        }
        let mut withdrawn = student("gone", "y25", Some("a"));
        withdrawn.status = EnrollmentStatus::Withdrawn;
        store.insert_student(&withdrawn).expect("withdrawn");

        let summary = store.reset_year("y25", "u").expect("reset");
        assert_eq!(summary, ResetSummary { moved: 3, deleted: 3 });
        assert_eq!(
            store
                .student("gone")
                .expect("q")
                .expect("row")
                .current_section_id
                .as_deref(),
            Some("a")
        );
    }
}
