use serde::{Deserialize, Serialize};

use crate::answers::{ErrorMap, ResponseMap, value_is_empty};
use crate::disposition::Flagged;
use crate::spec::questionnaire::{Questionnaire, Section};
use crate::spec::tree::SectionKey;

/// Classification of one section in the progress strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SectionStatus {
    Pending,
    Completed,
    Error,
    Disabled,
    Active,
    ActiveError,
    ActiveDisabled,
}

impl SectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionStatus::Pending => "pending",
            SectionStatus::Completed => "completed",
            SectionStatus::Error => "error",
            SectionStatus::Disabled => "disabled",
            SectionStatus::Active => "active",
            SectionStatus::ActiveError => "active-error",
            SectionStatus::ActiveDisabled => "active-disabled",
        }
    }
}

/// Badge shown for the section under the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BadgeStatus {
    #[default]
    Pending,
    Completed,
    Error,
    Disabled,
}

impl BadgeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BadgeStatus::Pending => "pending",
            BadgeStatus::Completed => "completed",
            BadgeStatus::Error => "error",
            BadgeStatus::Disabled => "disabled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub required_total: usize,
    pub required_completed: usize,
    pub optional_total: usize,
    pub optional_completed: usize,
    pub required_percent: u32,
    pub optional_percent: u32,
    /// Section statuses grouped by page.
    pub pages: Vec<Vec<SectionStatus>>,
    pub current: BadgeStatus,
    /// Position of the cursor's section counted across all pages.
    pub current_global_index: usize,
}

impl ProgressReport {
    pub fn total(&self) -> usize {
        self.required_total + self.optional_total
    }

    pub fn completed(&self) -> usize {
        self.required_completed + self.optional_completed
    }
}

/// Aggregates completion over every in-scope field and classifies each section.
///
/// A field is complete when it holds a non-empty value and neither it nor any
/// path under it has an error. With no required fields the required percentage
/// is 100; with no optional fields the optional percentage is 0.
pub fn compute_progress(
    questionnaire: &Questionnaire,
    responses: &ResponseMap,
    errors: &ErrorMap,
    cursor: SectionKey,
) -> ProgressReport {
    let mut report = ProgressReport::default();

    for (_, section) in questionnaire.sections() {
        if section.is_bypassed() {
            continue;
        }
        for field in section.fields.iter().filter(|field| !field.is_bypassed()) {
            let complete = !errors.has_error_for(&field.id)
                && !value_is_empty(field, responses.get(&field.id));
            if field.required {
                report.required_total += 1;
                report.required_completed += usize::from(complete);
            } else {
                report.optional_total += 1;
                report.optional_completed += usize::from(complete);
            }
        }
    }
    report.required_percent = percent(report.required_completed, report.required_total, 100);
    report.optional_percent = percent(report.optional_completed, report.optional_total, 0);

    let mut global_index = 0;
    for (page_idx, page) in questionnaire.pages().iter().enumerate() {
        let mut statuses = Vec::with_capacity(page.sections.len());
        for (section_idx, section) in page.sections.iter().enumerate() {
            let active = cursor == SectionKey::new(page_idx, section_idx);
            if active {
                report.current_global_index = global_index;
            }
            let (status, badge) = classify(section, responses, errors, active);
            if let Some(badge) = badge {
                report.current = badge;
            }
            statuses.push(status);
            global_index += 1;
        }
        report.pages.push(statuses);
    }

    report
}

/// `round(100 * completed / total)`, half rounding up.
fn percent(completed: usize, total: usize, when_empty: u32) -> u32 {
    if total == 0 {
        return when_empty;
    }
    ((200 * completed + total) / (2 * total)) as u32
}

fn classify(
    section: &Section,
    responses: &ResponseMap,
    errors: &ErrorMap,
    active: bool,
) -> (SectionStatus, Option<BadgeStatus>) {
    if section.is_bypassed() {
        return if active {
            (SectionStatus::ActiveDisabled, Some(BadgeStatus::Disabled))
        } else {
            (SectionStatus::Disabled, None)
        };
    }

    let in_scope = || section.fields.iter().filter(|field| !field.is_bypassed());
    let has_error = in_scope().any(|field| errors.has_error_for(&field.id));
    let has_data = in_scope().any(|field| !value_is_empty(field, responses.get(&field.id)));
    let required_filled = in_scope()
        .filter(|field| field.required)
        .all(|field| !value_is_empty(field, responses.get(&field.id)));
    let has_required = in_scope().any(|field| field.required);
    let completed = !has_error && required_filled && (has_data || has_required);

    if active {
        let badge = if has_error {
            BadgeStatus::Error
        } else if completed {
            BadgeStatus::Completed
        } else {
            BadgeStatus::Pending
        };
        let status = if has_error {
            SectionStatus::ActiveError
        } else {
            SectionStatus::Active
        };
        return (status, Some(badge));
    }

    let status = if has_error {
        SectionStatus::Error
    } else if completed {
        SectionStatus::Completed
    } else {
        SectionStatus::Pending
    };
    (status, None)
}

/// "Page X of Y" and "Section X of Y" counters shown in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCounts {
    pub page_number: usize,
    pub page_count: usize,
    pub section_number: usize,
    pub section_count: usize,
}

/// Counts pages and sections the user can still reach.
///
/// Excluded sections drop out of both counts; skipped sections still count.
/// A page counts when at least one of its sections is not excluded.
pub fn step_counts(questionnaire: &Questionnaire, cursor: SectionKey) -> StepCounts {
    let mut counts = StepCounts {
        page_number: 1,
        page_count: 0,
        section_number: 1,
        section_count: 0,
    };

    for (page_idx, page) in questionnaire.pages().iter().enumerate() {
        if page.sections.iter().any(|section| !section.exclude) {
            counts.page_count += 1;
            if page_idx == cursor.page {
                counts.page_number = counts.page_count;
            }
        }
    }

    if let Some(page) = questionnaire.page(cursor.page) {
        for (section_idx, section) in page.sections.iter().enumerate() {
            if section.exclude {
                continue;
            }
            counts.section_count += 1;
            if section_idx == cursor.section {
                counts.section_number = counts.section_count;
            }
        }
    }
    counts.section_count = counts.section_count.max(1);
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(percent(3, 10, 100), 30);
        assert_eq!(percent(1, 3, 100), 33);
        assert_eq!(percent(2, 3, 100), 67);
        assert_eq!(percent(1, 8, 0), 13);
        assert_eq!(percent(0, 0, 100), 100);
        assert_eq!(percent(0, 0, 0), 0);
    }
}
