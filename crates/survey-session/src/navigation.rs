use survey_spec::{Flagged, Questionnaire, ResponseMap, SectionKey, value_is_empty};

/// Result of a cursor move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    Moved(SectionKey),
    /// Already at the boundary; the cursor did not change.
    Stayed(SectionKey),
}

impl Movement {
    pub fn key(&self) -> SectionKey {
        match self {
            Movement::Moved(key) | Movement::Stayed(key) => *key,
        }
    }

    pub fn moved(&self) -> bool {
        matches!(self, Movement::Moved(_))
    }
}

/// Sequential cursor over `(page, section)` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Navigator {
    cursor: SectionKey,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(cursor: SectionKey) -> Self {
        Self { cursor }
    }

    pub fn cursor(&self) -> SectionKey {
        self.cursor
    }

    pub fn is_first(&self) -> bool {
        self.cursor == SectionKey::default()
    }

    pub fn is_last(&self, questionnaire: &Questionnaire) -> bool {
        self.cursor == questionnaire.last_key()
    }

    /// Next section, rolling into the next page; clamps at the last section.
    pub fn advance(&mut self, questionnaire: &Questionnaire) -> Movement {
        let SectionKey { page, section } = self.cursor;
        let next = if section + 1 < questionnaire.section_count(page) {
            SectionKey::new(page, section + 1)
        } else if page + 1 < questionnaire.page_count() {
            SectionKey::new(page + 1, 0)
        } else {
            return Movement::Stayed(self.cursor);
        };
        self.cursor = next;
        Movement::Moved(next)
    }

    /// Previous section, rolling back to the last section of the previous page.
    pub fn retreat(&mut self, questionnaire: &Questionnaire) -> Movement {
        let SectionKey { page, section } = self.cursor;
        let previous = if section > 0 {
            SectionKey::new(page, section - 1)
        } else if page > 0 {
            SectionKey::new(page - 1, questionnaire.section_count(page - 1).saturating_sub(1))
        } else {
            return Movement::Stayed(self.cursor);
        };
        self.cursor = previous;
        Movement::Moved(previous)
    }

    /// Moves to `key` when it exists.
    pub fn jump(&mut self, questionnaire: &Questionnaire, key: SectionKey) -> Movement {
        if questionnaire.section(key).is_none() {
            return Movement::Stayed(self.cursor);
        }
        self.cursor = key;
        Movement::Moved(key)
    }

    pub fn reset(&mut self) {
        self.cursor = SectionKey::default();
    }
}

/// Where a restored session picks up.
///
/// The first section, in page/section order, that is in scope and holds an
/// in-scope field with an empty response; the last section when none does.
pub fn resume_point(questionnaire: &Questionnaire, responses: &ResponseMap) -> SectionKey {
    questionnaire
        .sections()
        .find(|(_, section)| {
            !section.is_bypassed()
                && section
                    .fields
                    .iter()
                    .filter(|field| !field.is_bypassed())
                    .any(|field| value_is_empty(field, responses.get(&field.id)))
        })
        .map(|(key, _)| key)
        .unwrap_or_else(|| questionnaire.last_key())
}
