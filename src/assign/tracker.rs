use crate::model::{Gender, SectionCount, Student};
use std::collections::HashMap;

/// Running per-section totals for one assignment run.
#[derive(Debug, Clone, Default)]
pub struct CapacityTracker {
    counts: HashMap<String, SectionCount>,
}

impl CapacityTracker {
    /// Count Enrolled students by their current section.
    pub fn seed<'a, I>(students: I) -> Self
    where
        I: IntoIterator<Item = &'a Student>,
    {
        let mut tracker = Self::default();
        for s in students {
            if !s.is_enrolled() {
                continue;
            }
            if let Some(section_id) = s.current_section_id.as_deref() {
                tracker.apply(section_id, s.gender.as_ref());
            }
        }
        tracker
    }

    pub fn get(&self, section_id: &str) -> SectionCount {
        self.counts.get(section_id).copied().unwrap_or_default()
    }

    pub fn apply(&mut self, section_id: &str, gender: Option<&Gender>) {
        let c = self.counts.entry(section_id.to_string()).or_default();
        c.total += 1;
        match gender {
            Some(Gender::Male) => c.male += 1,
            Some(Gender::Female) => c.female += 1,
            _ => {}
        }
    }
}
