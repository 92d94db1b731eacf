use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::disposition::Flagged;
use crate::spec::field::{FieldSpec, FieldType};
use crate::validate::FieldReport;

/// Current answers keyed by top-level field id.
pub type ResponseMap = BTreeMap<String, Value>;

/// One repeated instance of a group's sub-fields, keyed by sub-field id.
pub type GroupEntry = Map<String, Value>;

/// Error-map key of a sub-field inside a group entry.
pub fn item_path(group_path: &str, index: usize, sub_id: &str) -> String {
    format!("{group_path}-item{index}-{sub_id}")
}

/// `null`, `""` and `[]` carry no answer; `false` and `0` are answers.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// The emptiness rule shared by validation and progress.
///
/// A group is empty when none of its entries holds a non-blank value for an
/// in-scope sub-field.
pub fn value_is_empty(field: &FieldSpec, value: Option<&Value>) -> bool {
    if field.kind != FieldType::Group {
        return value.is_none_or(is_blank);
    }
    match value {
        Some(Value::Array(entries)) => !entries
            .iter()
            .filter_map(Value::as_object)
            .any(|entry| entry_has_data(field, entry)),
        _ => true,
    }
}

pub fn entry_has_data(group: &FieldSpec, entry: &GroupEntry) -> bool {
    group
        .sub_fields
        .iter()
        .filter(|sub| !sub.is_bypassed())
        .any(|sub| !value_is_empty(sub, entry.get(&sub.id)))
}

/// A group's effective entries: the stored sequence, or one empty entry when
/// nothing has been stored yet.
pub fn group_entries(value: Option<&Value>) -> Vec<GroupEntry> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_object().cloned().unwrap_or_default())
            .collect(),
        _ => vec![GroupEntry::new()],
    }
}

/// Removes the value addressed by `ids` from every entry, descending through
/// nested groups one id at a time.
pub fn strip_entry_values(value: &mut Value, ids: &[&str]) {
    let Some((first, rest)) = ids.split_first() else {
        return;
    };
    let Value::Array(entries) = value else {
        return;
    };
    for entry in entries.iter_mut().filter_map(Value::as_object_mut) {
        if rest.is_empty() {
            entry.remove(*first);
        } else if let Some(inner) = entry.get_mut(*first) {
            strip_entry_values(inner, rest);
        }
    }
}

/// Active validation messages keyed by field path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorMap(BTreeMap<String, String>);

impl ErrorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }

    pub fn insert(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.insert(path.into(), message.into());
    }

    pub fn remove(&mut self, path: &str) -> Option<String> {
        self.0.remove(path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(path, message)| (path.as_str(), message.as_str()))
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// True when `path` or any path under `path-` has an error.
    pub fn has_error_for(&self, path: &str) -> bool {
        let prefix = format!("{path}-");
        self.0
            .keys()
            .any(|key| key == path || key.starts_with(&prefix))
    }

    /// Drops the error at `path` and every error keyed under `path-`.
    pub fn clear_field(&mut self, path: &str) {
        let prefix = format!("{path}-");
        self.0
            .retain(|key, _| key != path && !key.starts_with(&prefix));
    }

    /// Drops errors of a nested sub-field in every entry of its enclosing groups.
    ///
    /// `ids` runs from the top-level field to the target, so `["pets", "name"]`
    /// clears `pets-item0-name`, `pets-item7-name` and anything under them.
    pub fn clear_nested(&mut self, ids: &[&str]) {
        self.0.retain(|key, _| !matches_nested(key, ids));
    }

    /// Replaces everything recorded under the report's path with its errors.
    pub fn apply(&mut self, report: &FieldReport) {
        self.clear_field(&report.path);
        for error in &report.errors {
            self.insert(error.path.clone(), error.message.clone());
        }
    }
}

fn matches_nested(key: &str, ids: &[&str]) -> bool {
    let Some((first, rest)) = ids.split_first() else {
        return false;
    };
    let Some(mut tail) = key.strip_prefix(first) else {
        return false;
    };
    for id in rest {
        let Some(after) = tail.strip_prefix("-item") else {
            return false;
        };
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return false;
        }
        let Some(after) = after[digits..].strip_prefix('-') else {
            return false;
        };
        let Some(after) = after.strip_prefix(id) else {
            return false;
        };
        tail = after;
    }
    tail.is_empty() || tail.starts_with('-')
}
