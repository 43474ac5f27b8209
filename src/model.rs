use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Gender {
    Male,
    Female,
    Other(String),
}

impl Gender {
    /// Loose parse used at the IPC and db boundaries. Empty text means unknown.
    pub fn parse(raw: &str) -> Option<Self> {
        let t = raw.trim();
        if t.is_empty() {
            return None;
        }
        match t.to_ascii_lowercase().as_str() {
            "male" | "m" => Some(Self::Male),
            "female" | "f" => Some(Self::Female),
            _ => Some(Self::Other(t.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other(s) => s.as_str(),
        }
    }
}

impl Serialize for Gender {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EnrollmentStatus {
    Enrolled,
    Pending,
    Withdrawn,
}

impl EnrollmentStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "enrolled" => Some(Self::Enrolled),
            "pending" => Some(Self::Pending),
            "withdrawn" => Some(Self::Withdrawn),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enrolled => "Enrolled",
            Self::Pending => "Pending",
            Self::Withdrawn => "Withdrawn",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchoolYearStatus {
    Active,
    Inactive,
}

impl SchoolYearStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Inactive => "Inactive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolYear {
    pub id: String,
    pub code: String,
    pub status: SchoolYearStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub school_year_id: String,
    pub name: String,
    pub grade: Option<String>,
    pub track: Option<String>,
    pub strand: Option<String>,
    pub is_archived: bool,
}

impl Section {
    pub fn key(&self) -> Option<SectionKey> {
        SectionKey::from_parts(
            self.grade.as_deref(),
            self.track.as_deref(),
            self.strand.as_deref(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub school_year_id: String,
    pub first_name: String,
    pub last_name: String,
    pub grade: Option<String>,
    pub track: Option<String>,
    pub strand: Option<String>,
    pub gender: Option<Gender>,
    pub status: EnrollmentStatus,
    pub current_section_id: Option<String>,
}

impl Student {
    pub fn key(&self) -> Option<SectionKey> {
        SectionKey::from_parts(
            self.grade.as_deref(),
            self.track.as_deref(),
            self.strand.as_deref(),
        )
    }

    pub fn is_enrolled(&self) -> bool {
        self.status == EnrollmentStatus::Enrolled
    }
}

/// Exact `(grade, track, strand)` match key. A `None` strand only matches
/// another `None` strand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SectionKey {
    pub grade: String,
    pub track: String,
    pub strand: Option<String>,
}

impl SectionKey {
    pub fn from_parts(grade: Option<&str>, track: Option<&str>, strand: Option<&str>) -> Option<Self> {
        Some(Self {
            grade: grade?.to_string(),
            track: track?.to_string(),
            strand: strand.map(str::to_string),
        })
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.grade,
            self.track,
            self.strand.as_deref().unwrap_or("-")
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionCount {
    pub total: u32,
    pub male: u32,
    pub female: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRecord {
    pub student_id: String,
    pub section_id: String,
}
