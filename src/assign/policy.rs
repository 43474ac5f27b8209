use super::tracker::CapacityTracker;
use super::AssignPolicy;
use crate::model::{Gender, Section, SectionCount, Student};
use rand::Rng;

/// Gap between male and female counts, optionally after adding one student.
fn imbalance(count: SectionCount, added: Option<&Gender>) -> i64 {
    let mut male = count.male as i64;
    let mut female = count.female as i64;
    match added {
        Some(Gender::Male) => male += 1,
        Some(Gender::Female) => female += 1,
        _ => {}
    }
    (male - female).abs()
}

/// Positive when the placement widens the gap, negative when it narrows it.
pub fn gender_penalty(count: SectionCount, gender: Option<&Gender>, weight: f64) -> f64 {
    match gender {
        Some(g @ (Gender::Male | Gender::Female)) => {
            let before = imbalance(count, None);
            let after = imbalance(count, Some(g));
            (after - before) as f64 * weight
        }
        _ => 0.0,
    }
}

pub fn fill_score(count: SectionCount, max_capacity: u32) -> f64 {
    count.total as f64 / max_capacity as f64
}

/// Deterministic part of a candidate's score. Lower is better.
pub fn base_score(count: SectionCount, gender: Option<&Gender>, policy: &AssignPolicy) -> f64 {
    fill_score(count, policy.max_capacity)
        + gender_penalty(count, gender, policy.gender_penalty_weight)
}

/// Greedy pick among sections sharing the student's key. `None` when every
/// candidate is full or there are none.
pub fn select_section<'s, R>(
    student: &Student,
    candidates: &'s [Section],
    tracker: &CapacityTracker,
    policy: &AssignPolicy,
    rng: &mut R,
) -> Option<&'s Section>
where
    R: Rng,
{
    let mut best: Option<(&'s Section, f64)> = None;
    for section in candidates {
        let count = tracker.get(&section.id);
        if count.total >= policy.max_capacity {
            continue;
        }
        let jitter = if policy.tie_break_jitter > 0.0 {
            rng.random::<f64>() * policy.tie_break_jitter
        } else {
            0.0
        };
        let score = base_score(count, student.gender.as_ref(), policy) + jitter;
        match best {
            Some((_, best_score)) if best_score <= score => {}
            _ => best = Some((section, score)),
        }
    }
    best.map(|(section, _)| section)
}
