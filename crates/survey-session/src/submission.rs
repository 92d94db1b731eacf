use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use survey_spec::{Flagged, Questionnaire, ResponseMap};

use crate::error::PersistenceError;
use crate::persistence::FlagSnapshot;

/// `section id -> field id -> value`
pub type SectionAnswers = BTreeMap<String, BTreeMap<String, Value>>;

/// Final document handed over on submit.
///
/// Answers are nested `page id -> section id -> field id -> value` and only
/// cover in-scope fields with a recorded response. Empty sections and pages
/// are left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    #[serde(flatten)]
    pub flags: FlagSnapshot,
    #[serde(rename = "_submittedAt")]
    pub submitted_at: DateTime<Utc>,
    #[serde(flatten)]
    pub pages: BTreeMap<String, SectionAnswers>,
}

impl Submission {
    pub fn build(
        questionnaire: &Questionnaire,
        responses: &ResponseMap,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        let mut pages: BTreeMap<String, SectionAnswers> = BTreeMap::new();
        for (key, section) in questionnaire.sections() {
            if section.is_bypassed() {
                continue;
            }
            let answers: BTreeMap<String, Value> = section
                .fields
                .iter()
                .filter(|field| !field.is_bypassed())
                .filter_map(|field| {
                    responses
                        .get(&field.id)
                        .map(|value| (field.id.clone(), value.clone()))
                })
                .collect();
            if answers.is_empty() {
                continue;
            }
            let Some(page) = questionnaire.page(key.page) else {
                continue;
            };
            pages
                .entry(page.id.clone())
                .or_default()
                .insert(section.id.clone(), answers);
        }

        Self {
            flags: FlagSnapshot::capture(questionnaire),
            submitted_at,
            pages,
        }
    }

    pub fn answer(&self, page: &str, section: &str, field: &str) -> Option<&Value> {
        self.pages.get(page)?.get(section)?.get(field)
    }

    pub fn to_json_pretty(&self) -> Result<String, PersistenceError> {
        serde_json::to_string_pretty(self).map_err(PersistenceError::Encode)
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>, PersistenceError> {
        serde_cbor::to_vec(self).map_err(PersistenceError::Cbor)
    }

    /// `questionnaire_response_YYYY-MM-DDTHH-MM-SS.json`
    pub fn file_name(&self) -> String {
        format!(
            "questionnaire_response_{}.json",
            self.submitted_at.format("%Y-%m-%dT%H-%M-%S")
        )
    }
}
