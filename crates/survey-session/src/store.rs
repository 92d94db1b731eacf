use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use survey_spec::{
    Disposition, ErrorMap, FieldAddress, FieldSpec, FlagKind, Flagged, GroupEntry, Questionnaire,
    ResponseMap, SectionKey, ValidationResult, group_entries, item_path, validate,
    validate_field, validate_section, value_is_empty,
};
use survey_spec::answers::strip_entry_values;

use crate::error::LookupError;
use crate::persistence::{FlagSnapshot, METADATA_KEYS, PersistedState};
use crate::submission::Submission;

/// Whether an edit was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Stored,
    /// The target is excluded or skipped; nothing changed.
    Ignored,
}

/// Questionnaire flags, responses and errors of one session.
///
/// Every public mutation leaves the store consistent: bypassed nodes hold no
/// response and no error, and each group and section carries the flag shared
/// by all of its children.
#[derive(Debug, Clone)]
pub struct StateStore {
    questionnaire: Questionnaire,
    responses: ResponseMap,
    errors: ErrorMap,
}

impl StateStore {
    pub fn new(questionnaire: Questionnaire) -> Self {
        Self {
            questionnaire,
            responses: ResponseMap::new(),
            errors: ErrorMap::new(),
        }
    }

    pub fn questionnaire(&self) -> &Questionnaire {
        &self.questionnaire
    }

    pub fn responses(&self) -> &ResponseMap {
        &self.responses
    }

    pub fn errors(&self) -> &ErrorMap {
        &self.errors
    }

    pub fn response(&self, field_id: &str) -> Option<&Value> {
        self.responses.get(field_id)
    }

    /// Overwrites the response of a top-level field and re-validates it.
    pub fn set_response(&mut self, field_id: &str, value: Value) -> Result<Applied, LookupError> {
        let address = self
            .questionnaire
            .locate_top_level(field_id)
            .ok_or_else(|| LookupError::UnknownField(field_id.to_string()))?;
        if self.is_bypassed_at(&address) {
            debug!(field = field_id, "ignored response for bypassed field");
            return Ok(Applied::Ignored);
        }
        self.responses.insert(field_id.to_string(), value);
        self.revalidate(&address);
        debug!(field = field_id, "response stored");
        Ok(Applied::Stored)
    }

    /// Appends an empty entry to a group, returning the new entry's index.
    pub fn add_entry(&mut self, group_id: &str) -> Result<Option<usize>, LookupError> {
        let (address, group) = self.group(group_id)?;
        if self.is_bypassed_at(&address) {
            return Ok(None);
        }
        let blank: GroupEntry = group
            .sub_fields
            .iter()
            .filter(|sub| !sub.is_bypassed())
            .map(|sub| (sub.id.clone(), sub.blank_value()))
            .collect();
        let mut entries = group_entries(self.responses.get(group_id));
        entries.push(blank);
        let index = entries.len() - 1;
        self.store_entries(group_id, entries);
        debug!(group = group_id, index, "entry added");
        Ok(Some(index))
    }

    /// Removes one entry, keeping the order of the rest.
    pub fn remove_entry(&mut self, group_id: &str, index: usize) -> Result<Applied, LookupError> {
        let (address, _) = self.group(group_id)?;
        if self.is_bypassed_at(&address) {
            return Ok(Applied::Ignored);
        }
        let mut entries = group_entries(self.responses.get(group_id));
        if index >= entries.len() {
            return Err(LookupError::UnknownEntry {
                group_id: group_id.to_string(),
                index,
            });
        }
        entries.remove(index);
        self.store_entries(group_id, entries);
        if self.errors.has_error_for(group_id) {
            self.revalidate(&address);
        }
        debug!(group = group_id, index, "entry removed");
        Ok(Applied::Stored)
    }

    /// Edits one sub-field of one entry and validates it at its item path.
    pub fn set_entry_value(
        &mut self,
        group_id: &str,
        index: usize,
        sub_id: &str,
        value: Value,
    ) -> Result<Applied, LookupError> {
        let (address, group) = self.group(group_id)?;
        let sub = group
            .sub_field(sub_id)
            .cloned()
            .ok_or_else(|| LookupError::UnknownField(sub_id.to_string()))?;
        if self.is_bypassed_at(&address) || sub.is_bypassed() {
            return Ok(Applied::Ignored);
        }
        let mut entries = group_entries(self.responses.get(group_id));
        let Some(entry) = entries.get_mut(index) else {
            return Err(LookupError::UnknownEntry {
                group_id: group_id.to_string(),
                index,
            });
        };
        entry.insert(sub_id.to_string(), value);
        let path = item_path(group_id, index, sub_id);
        let report = validate_field(&sub, &path, entry.get(sub_id));
        self.store_entries(group_id, entries);
        self.errors.apply(&report);
        if self.errors.get(group_id).is_some()
            && !value_is_empty(&group, self.responses.get(group_id))
        {
            self.errors.remove(group_id);
        }
        debug!(group = group_id, index, field = sub_id, "entry value stored");
        Ok(Applied::Stored)
    }

    /// Flips `kind` on a field found anywhere in `section`'s field tree.
    ///
    /// Activation cascades into sub-fields and drops their data. Either way the
    /// enclosing groups and section are recomputed from their children.
    pub fn toggle_field(
        &mut self,
        section: SectionKey,
        field_id: &str,
        kind: FlagKind,
    ) -> Result<Disposition, LookupError> {
        if self.questionnaire.section(section).is_none() {
            return Err(LookupError::UnknownSection(section));
        }
        let address = self.questionnaire.locate(section, field_id).ok_or_else(|| {
            LookupError::FieldNotInSection {
                field_id: field_id.to_string(),
                section,
            }
        })?;
        let field = self
            .questionnaire
            .field_mut(&address)
            .ok_or_else(|| LookupError::UnknownField(field_id.to_string()))?;
        let on = !field.flag(kind);
        field.cascade_flag(kind, on);
        let disposition = field.disposition();

        if on {
            self.purge(&address);
        }
        self.roll_up(&address);
        debug!(
            field = field_id,
            section = %section,
            flag = kind.as_str(),
            on,
            "field flag toggled"
        );
        Ok(disposition)
    }

    /// Flips `kind` on a section and cascades it onto every field below it.
    pub fn toggle_section(
        &mut self,
        key: SectionKey,
        kind: FlagKind,
    ) -> Result<Disposition, LookupError> {
        let section = self
            .questionnaire
            .section_mut(key)
            .ok_or(LookupError::UnknownSection(key))?;
        let on = !section.flag(kind);
        section.set_flag(kind, on);
        for field in &mut section.fields {
            field.cascade_flag(kind, on);
        }
        let disposition = section.disposition();
        let ids: Vec<String> = section.fields.iter().map(|field| field.id.clone()).collect();

        if on {
            for id in ids {
                self.responses.remove(&id);
                self.errors.clear_field(&id);
            }
        }
        debug!(section = %key, flag = kind.as_str(), on, "section flag toggled");
        Ok(disposition)
    }

    /// Validates every field of a section, refreshing its error entries.
    pub fn validate_section(&mut self, key: SectionKey) -> Result<bool, LookupError> {
        let section = self
            .questionnaire
            .section(key)
            .ok_or(LookupError::UnknownSection(key))?;
        let mut valid = true;
        if section.is_bypassed() {
            for field in &section.fields {
                self.errors.clear_field(&field.id);
            }
            return Ok(valid);
        }
        for report in validate_section(section, &self.responses) {
            valid &= report.is_valid();
            self.errors.apply(&report);
        }
        Ok(valid)
    }

    /// Validates the whole questionnaire and replaces the error map with the result.
    pub fn validate_all(&mut self) -> ValidationResult {
        let result = validate(&self.questionnaire, &self.responses);
        self.errors = result.error_map();
        result
    }

    /// Drops every response, error and flag.
    pub fn clear(&mut self) {
        self.responses.clear();
        self.errors.clear();
        self.questionnaire.clear_flags();
    }

    /// Replaces the current state with a persisted snapshot.
    ///
    /// Field flags cascade parents first and flagged sections cascade over
    /// them; groups and sections are then rolled up from their children.
    /// Metadata keys are dropped and data of bypassed nodes is purged.
    pub fn restore(&mut self, state: PersistedState) {
        self.clear();

        let addresses = self.questionnaire.field_addresses();
        for address in &addresses {
            let Some(field) = self.questionnaire.field_mut(address) else {
                continue;
            };
            match state.flags.field_disposition(&field.id) {
                Disposition::Excluded => field.cascade_flag(FlagKind::Exclude, true),
                Disposition::Skipped => field.cascade_flag(FlagKind::Skip, true),
                Disposition::Included => {}
            }
        }
        for (key, section) in self.questionnaire.sections_mut() {
            let kind = match state.flags.section_disposition(key) {
                Disposition::Excluded => FlagKind::Exclude,
                Disposition::Skipped => FlagKind::Skip,
                Disposition::Included => continue,
            };
            section.set_flag(kind, true);
            for field in &mut section.fields {
                field.cascade_flag(kind, true);
            }
        }

        let mut groups = addresses.clone();
        groups.sort_by_key(|address| std::cmp::Reverse(address.chain.len()));
        for address in &groups {
            self.recompute_group(address);
        }
        let keys: Vec<SectionKey> = self.questionnaire.sections().map(|(key, _)| key).collect();
        for key in keys {
            self.recompute_section(key);
        }

        self.responses = state
            .responses
            .into_iter()
            .filter(|(key, _)| !METADATA_KEYS.contains(&key.as_str()))
            .collect();

        let mut bypassed: Vec<FieldAddress> = addresses
            .into_iter()
            .filter(|address| self.is_bypassed_at(address))
            .collect();
        // Outer nodes first so nested strips run on what is left.
        bypassed.sort_by_key(|address| address.chain.len());
        for address in &bypassed {
            self.purge(address);
        }
    }

    pub fn snapshot(&self, unsaved: bool) -> PersistedState {
        PersistedState {
            flags: FlagSnapshot::capture(&self.questionnaire),
            unsaved,
            responses: self.responses.clone(),
        }
    }

    pub fn submission(&self, submitted_at: DateTime<Utc>) -> Submission {
        Submission::build(&self.questionnaire, &self.responses, submitted_at)
    }

    fn group(&self, group_id: &str) -> Result<(FieldAddress, FieldSpec), LookupError> {
        let address = self
            .questionnaire
            .locate_top_level(group_id)
            .ok_or_else(|| LookupError::UnknownField(group_id.to_string()))?;
        let group = self
            .questionnaire
            .field(&address)
            .ok_or_else(|| LookupError::UnknownField(group_id.to_string()))?;
        if !group.is_group() {
            return Err(LookupError::NotAGroup(group_id.to_string()));
        }
        Ok((address, group.clone()))
    }

    fn store_entries(&mut self, group_id: &str, entries: Vec<GroupEntry>) {
        let value = Value::Array(entries.into_iter().map(Value::Object).collect());
        self.responses.insert(group_id.to_string(), value);
    }

    /// True when the node, an enclosing group or its section is bypassed.
    fn is_bypassed_at(&self, address: &FieldAddress) -> bool {
        let section_bypassed = self
            .questionnaire
            .section(address.section)
            .is_none_or(|section| section.is_bypassed());
        section_bypassed
            || address
                .ancestors()
                .chain(std::iter::once(address.clone()))
                .any(|node| {
                    self.questionnaire
                        .field(&node)
                        .is_none_or(|field| field.is_bypassed())
                })
    }

    fn revalidate(&mut self, address: &FieldAddress) {
        let Some(field) = self.questionnaire.field(address) else {
            return;
        };
        let report = validate_field(field, &field.id, self.responses.get(&field.id));
        self.errors.apply(&report);
    }

    /// Drops the response and errors held by a node.
    fn purge(&mut self, address: &FieldAddress) {
        let Some(ids) = self.questionnaire.id_chain(address) else {
            return;
        };
        let Some((top, nested)) = ids.split_first() else {
            return;
        };
        if nested.is_empty() {
            self.responses.remove(top);
            self.errors.clear_field(top);
            return;
        }
        let path: Vec<&str> = ids.iter().map(String::as_str).collect();
        if let Some(value) = self.responses.get_mut(top) {
            strip_entry_values(value, &path[1..]);
        }
        self.errors.clear_nested(&path);
    }

    /// Recomputes enclosing groups, innermost first, then the section.
    fn roll_up(&mut self, address: &FieldAddress) {
        for ancestor in address.ancestors() {
            if self.recompute_group(&ancestor) {
                self.purge(&ancestor);
            }
        }
        self.recompute_section(address.section);
    }

    /// Sets a group's flags from its sub-fields; true when it became bypassed.
    fn recompute_group(&mut self, address: &FieldAddress) -> bool {
        let Some(group) = self.questionnaire.field_mut(address) else {
            return false;
        };
        let Some((exclude, skip)) = shared_flags(&group.sub_fields) else {
            return false;
        };
        let was_bypassed = group.is_bypassed();
        group.exclude = exclude;
        group.skip = skip;
        !was_bypassed && group.is_bypassed()
    }

    fn recompute_section(&mut self, key: SectionKey) {
        let Some(section) = self.questionnaire.section_mut(key) else {
            return;
        };
        if let Some((exclude, skip)) = shared_flags(&section.fields) {
            section.exclude = exclude;
            section.skip = skip;
        }
    }
}

/// `(all excluded, all skipped)`, or `None` for a childless node.
fn shared_flags(children: &[FieldSpec]) -> Option<(bool, bool)> {
    if children.is_empty() {
        return None;
    }
    let exclude = children.iter().all(|child| child.exclude);
    let skip = !exclude && children.iter().all(|child| child.skip);
    Some((exclude, skip))
}
