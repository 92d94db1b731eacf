use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use survey_spec::{
    Disposition, Flagged, Questionnaire, ResponseMap, SectionKey, resolve_dispositions,
};

use crate::error::PersistenceError;
use crate::submission::Submission;

/// Marker map keyed by section composite id or field id; only `true` entries are written.
pub type FlagMap = BTreeMap<String, bool>;

/// Top-level snapshot keys that carry flags or save state rather than answers.
pub const METADATA_KEYS: [&str; 5] = [
    "_excludedSections",
    "_skippedSections",
    "_excludedFields",
    "_skippedFields",
    "_unsaved",
];

/// The four side-channel maps carrying exclude/skip flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSnapshot {
    #[serde(rename = "_excludedSections", default)]
    pub excluded_sections: FlagMap,
    #[serde(rename = "_skippedSections", default)]
    pub skipped_sections: FlagMap,
    #[serde(rename = "_excludedFields", default)]
    pub excluded_fields: FlagMap,
    #[serde(rename = "_skippedFields", default)]
    pub skipped_fields: FlagMap,
}

impl FlagSnapshot {
    /// Records every flagged section and field node of `questionnaire`.
    ///
    /// Field maps are keyed by id alone. When several nodes share an id, the
    /// first one in page, section and depth-first order decides the entry,
    /// and a restore applies that entry to every node carrying the id.
    pub fn capture(questionnaire: &Questionnaire) -> Self {
        let mut flags = Self::default();
        for (key, section) in questionnaire.sections() {
            match section.disposition() {
                Disposition::Excluded => {
                    flags.excluded_sections.insert(key.composite_id(), true);
                }
                Disposition::Skipped => {
                    flags.skipped_sections.insert(key.composite_id(), true);
                }
                Disposition::Included => {}
            }
        }
        for (id, disposition) in resolve_dispositions(questionnaire) {
            match disposition {
                Disposition::Excluded => {
                    flags.excluded_fields.insert(id, true);
                }
                Disposition::Skipped => {
                    flags.skipped_fields.insert(id, true);
                }
                Disposition::Included => {}
            }
        }
        flags
    }

    pub fn section_disposition(&self, key: SectionKey) -> Disposition {
        disposition_of(&self.excluded_sections, &self.skipped_sections, &key.composite_id())
    }

    pub fn field_disposition(&self, id: &str) -> Disposition {
        disposition_of(&self.excluded_fields, &self.skipped_fields, id)
    }
}

/// Exclude wins when both maps flag the same key.
fn disposition_of(excluded: &FlagMap, skipped: &FlagMap, key: &str) -> Disposition {
    if excluded.get(key).copied().unwrap_or(false) {
        Disposition::Excluded
    } else if skipped.get(key).copied().unwrap_or(false) {
        Disposition::Skipped
    } else {
        Disposition::Included
    }
}

/// Full-state snapshot exchanged with the persistence gateway.
///
/// Responses sit at the top level next to the flag maps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(flatten)]
    pub flags: FlagSnapshot,
    /// Set on the teardown save.
    #[serde(rename = "_unsaved", default, skip_serializing_if = "is_false")]
    pub unsaved: bool,
    #[serde(flatten)]
    pub responses: ResponseMap,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// Result of `load_latest`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatestSnapshot {
    pub exists: bool,
    pub data: Option<PersistedState>,
    pub version_file: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl LatestSnapshot {
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn found(data: PersistedState) -> Self {
        Self {
            exists: true,
            data: Some(data),
            version_file: None,
            last_modified: None,
        }
    }
}

/// External store the session persists through.
pub trait PersistenceGateway {
    fn load_latest(&mut self) -> Result<LatestSnapshot, PersistenceError>;

    /// Full overwrite of the latest snapshot.
    fn save_version(&mut self, state: &PersistedState) -> Result<(), PersistenceError>;

    fn reset(&mut self) -> Result<(), PersistenceError>;

    /// Stores a final submission, returning its version number when the gateway
    /// keeps one.
    fn archive(&mut self, _submission: &Submission) -> Result<Option<u32>, PersistenceError> {
        Ok(None)
    }
}

/// In-process gateway holding the latest snapshot, with switchable failures.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    latest: Option<PersistedState>,
    archived: Vec<Submission>,
    saves: usize,
    pub fail_load: bool,
    pub fail_save: bool,
    pub fail_reset: bool,
    pub fail_archive: bool,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(state: PersistedState) -> Self {
        Self {
            latest: Some(state),
            ..Self::default()
        }
    }

    pub fn latest(&self) -> Option<&PersistedState> {
        self.latest.as_ref()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves
    }

    pub fn archived(&self) -> &[Submission] {
        &self.archived
    }

    fn unavailable(operation: &str) -> PersistenceError {
        PersistenceError::Unavailable(format!("{operation} rejected"))
    }
}

impl PersistenceGateway for MemoryGateway {
    fn load_latest(&mut self) -> Result<LatestSnapshot, PersistenceError> {
        if self.fail_load {
            return Err(Self::unavailable("load"));
        }
        Ok(match &self.latest {
            Some(state) => LatestSnapshot::found(state.clone()),
            None => LatestSnapshot::missing(),
        })
    }

    fn save_version(&mut self, state: &PersistedState) -> Result<(), PersistenceError> {
        if self.fail_save {
            return Err(Self::unavailable("save"));
        }
        self.latest = Some(state.clone());
        self.saves += 1;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), PersistenceError> {
        if self.fail_reset {
            return Err(Self::unavailable("reset"));
        }
        self.latest = None;
        Ok(())
    }

    fn archive(&mut self, submission: &Submission) -> Result<Option<u32>, PersistenceError> {
        if self.fail_archive {
            return Err(Self::unavailable("archive"));
        }
        self.archived.push(submission.clone());
        self.latest = None;
        Ok(u32::try_from(self.archived.len()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_flattens_responses_next_to_flag_maps() {
        let mut state = PersistedState::default();
        state.responses.insert("name".into(), json!("Ada"));
        state.flags.excluded_sections.insert("0-1".into(), true);
        state.flags.skipped_fields.insert("age".into(), true);

        let value = serde_json::to_value(&state).expect("encode");
        assert_eq!(value["name"], "Ada");
        assert_eq!(value["_excludedSections"]["0-1"], true);
        assert_eq!(value["_skippedFields"]["age"], true);
        assert!(value.get("_unsaved").is_none());

        let decoded: PersistedState = serde_json::from_value(value).expect("decode");
        assert_eq!(decoded, state);
    }

    #[test]
    fn decodes_snapshot_without_flag_maps() {
        let decoded: PersistedState =
            serde_json::from_value(json!({ "name": "Ada", "_unsaved": true })).expect("decode");
        assert!(decoded.unsaved);
        assert!(decoded.flags.excluded_fields.is_empty());
        assert_eq!(decoded.responses.get("name"), Some(&json!("Ada")));
        assert!(!decoded.responses.contains_key("_unsaved"));
    }

    #[test]
    fn exclude_wins_over_skip_on_read() {
        let mut flags = FlagSnapshot::default();
        flags.excluded_fields.insert("a".into(), true);
        flags.skipped_fields.insert("a".into(), true);
        flags.skipped_sections.insert("1-0".into(), true);
        flags.excluded_fields.insert("b".into(), false);
        assert_eq!(flags.field_disposition("a"), Disposition::Excluded);
        assert_eq!(flags.field_disposition("b"), Disposition::Included);
        assert_eq!(
            flags.section_disposition(SectionKey::new(1, 0)),
            Disposition::Skipped
        );
    }

    #[test]
    fn memory_gateway_overwrites_latest() {
        let mut gateway = MemoryGateway::new();
        assert!(!gateway.load_latest().expect("load").exists);

        let mut state = PersistedState::default();
        state.responses.insert("a".into(), json!("1"));
        gateway.save_version(&state).expect("save");
        state.responses.insert("a".into(), json!("2"));
        gateway.save_version(&state).expect("save");

        let latest = gateway.load_latest().expect("load");
        assert!(latest.exists);
        assert_eq!(latest.data.expect("data").responses["a"], json!("2"));
        assert_eq!(gateway.save_count(), 2);

        gateway.fail_save = true;
        assert!(gateway.save_version(&state).is_err());
        assert_eq!(gateway.save_count(), 2);
    }
}
