use super::AssignPolicy;
use crate::model::{Section, SectionKey, Student};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Eligible {
    pub candidates: Vec<Student>,
    pub usable_sections: Vec<Section>,
}

/// A student is a candidate when Enrolled and either unplaced or sitting in
/// the unclassified section.
pub fn is_candidate(student: &Student, unclassified_id: &str) -> bool {
    student.is_enrolled()
        && student
            .current_section_id
            .as_deref()
            .map_or(true, |sid| sid == unclassified_id)
}

pub fn is_usable_section(section: &Section, unclassified_id: &str, policy: &AssignPolicy) -> bool {
    !section.is_archived && section.id != unclassified_id && !policy.is_sentinel_name(&section.name)
}

pub fn filter(
    students: &[Student],
    sections: &[Section],
    unclassified_id: &str,
    policy: &AssignPolicy,
) -> Eligible {
    Eligible {
        candidates: students
            .iter()
            .filter(|s| is_candidate(s, unclassified_id))
            .cloned()
            .collect(),
        usable_sections: sections
            .iter()
            .filter(|s| is_usable_section(s, unclassified_id, policy))
            .cloned()
            .collect(),
    }
}

/// Sections without grade or track have no key and are never targets.
pub fn group_by_key(sections: &[Section]) -> HashMap<SectionKey, Vec<Section>> {
    let mut groups: HashMap<SectionKey, Vec<Section>> = HashMap::new();
    for section in sections {
        if let Some(key) = section.key() {
            groups.entry(key).or_default().push(section.clone());
        }
    }
    groups
}
