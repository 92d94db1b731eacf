use std::collections::BTreeSet;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::answers::{ErrorMap, ResponseMap, group_entries, item_path, value_is_empty};
use crate::disposition::Flagged;
use crate::spec::field::{FieldSpec, FieldType};
use crate::spec::questionnaire::{Questionnaire, Section};
use crate::spec::tree::SectionKey;

/// A single failed rule at one field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub field_id: String,
    pub path: String,
    pub message: String,
    pub code: String,
}

/// Outcome of validating one field, nested entries included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldReport {
    pub path: String,
    /// The field was excluded or skipped, so no rule ran.
    pub bypassed: bool,
    pub errors: Vec<ValidationError>,
}

impl FieldReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Whole-questionnaire summary.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub missing_required: Vec<String>,
    pub unknown_fields: Vec<String>,
    pub first_invalid: Option<SectionKey>,
}

impl ValidationResult {
    pub fn error_map(&self) -> ErrorMap {
        let mut map = ErrorMap::new();
        for error in &self.errors {
            map.insert(error.path.clone(), error.message.clone());
        }
        map
    }
}

/// Validates `value` against `field`, recording failures under `path`.
///
/// Excluded and skipped fields are never checked.
pub fn validate_field(field: &FieldSpec, path: &str, value: Option<&Value>) -> FieldReport {
    let mut report = FieldReport {
        path: path.to_string(),
        bypassed: field.is_bypassed(),
        errors: Vec::new(),
    };
    if report.bypassed {
        return report;
    }

    if field.kind == FieldType::Group {
        if field.required && value_is_empty(field, value) {
            report.errors.push(base_error(
                field,
                path,
                "At least one complete entry is required.",
                "required_entry",
            ));
            return report;
        }
        for (index, entry) in group_entries(value).iter().enumerate() {
            for sub in field.sub_fields.iter().filter(|sub| !sub.is_bypassed()) {
                let sub_path = item_path(path, index, &sub.id);
                let nested = validate_field(sub, &sub_path, entry.get(&sub.id));
                report.errors.extend(nested.errors);
            }
        }
        return report;
    }

    if let Some(error) = check_value(field, path, value) {
        report.errors.push(error);
    }
    report
}

fn check_value(field: &FieldSpec, path: &str, value: Option<&Value>) -> Option<ValidationError> {
    if value_is_empty(field, value) {
        if !field.required {
            return None;
        }
        let message = if field.kind.is_choice() {
            "Please select at least one option."
        } else {
            "This field is required."
        };
        return Some(base_error(field, path, message, "required"));
    }
    let value = value?;
    let text = value.as_str();

    if let Some(rules) = &field.rules
        && let Some(text) = text
    {
        let length = text.chars().count();
        if let Some(min_length) = rules.min_length
            && length < min_length
        {
            return Some(base_error(
                field,
                path,
                &format!("Must be at least {min_length} characters."),
                "min_length",
            ));
        }
        if let Some(max_length) = rules.max_length
            && length > max_length
        {
            return Some(base_error(
                field,
                path,
                &format!("Must not exceed {max_length} characters."),
                "max_length",
            ));
        }
    }

    if field.kind == FieldType::Number
        && let Some(number) = numeric(value)
    {
        if let Some(min) = field.effective_min()
            && number < min
        {
            return Some(base_error(
                field,
                path,
                &format!("Must be ≥ {}.", format_number(min)),
                "min",
            ));
        }
        if let Some(max) = field.effective_max()
            && number > max
        {
            return Some(base_error(
                field,
                path,
                &format!("Must be ≤ {}.", format_number(max)),
                "max",
            ));
        }
    }

    let text = text.filter(|text| !text.is_empty())?;

    if let Some(rules) = &field.rules
        && let Some(pattern) = &rules.pattern
        && let Ok(regex) = Regex::new(pattern)
        && !regex.is_match(text)
    {
        let message = rules.pattern_message.as_deref().unwrap_or("Invalid format.");
        return Some(base_error(field, path, message, "pattern_mismatch"));
    }

    if let Some(pattern) = &field.validation_pattern
        && let Ok(regex) = Regex::new(pattern)
        && !regex.is_match(text)
    {
        return Some(base_error(field, path, "Invalid format.", "pattern_mismatch"));
    }

    None
}

fn numeric(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

fn format_number(number: f64) -> String {
    if number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        number.to_string()
    }
}

fn base_error(field: &FieldSpec, path: &str, message: &str, code: &str) -> ValidationError {
    ValidationError {
        field_id: field.id.clone(),
        path: path.to_string(),
        message: message.into(),
        code: code.into(),
    }
}

/// Reports for every top-level field of a section, in declaration order.
pub fn validate_section(section: &Section, responses: &ResponseMap) -> Vec<FieldReport> {
    if section.is_bypassed() {
        return Vec::new();
    }
    section
        .fields
        .iter()
        .map(|field| validate_field(field, &field.id, responses.get(&field.id)))
        .collect()
}

/// Validates every in-scope field of the questionnaire against `responses`.
///
/// Keys starting with `_` are metadata and never reported as unknown.
pub fn validate(questionnaire: &Questionnaire, responses: &ResponseMap) -> ValidationResult {
    let mut errors = Vec::new();
    let mut missing_required = Vec::new();
    let mut first_invalid = None;

    for (key, section) in questionnaire.sections() {
        for report in validate_section(section, responses) {
            if report.is_valid() {
                continue;
            }
            first_invalid.get_or_insert(key);
            for error in report.errors {
                if error.path == report.path && error.code.starts_with("required") {
                    missing_required.push(error.field_id.clone());
                }
                errors.push(error);
            }
        }
    }

    let known: BTreeSet<&str> = questionnaire
        .top_level_fields()
        .map(|(_, field)| field.id.as_str())
        .collect();
    let unknown_fields: Vec<String> = responses
        .keys()
        .filter(|key| !key.starts_with('_') && !known.contains(key.as_str()))
        .cloned()
        .collect();

    ValidationResult {
        valid: errors.is_empty() && unknown_fields.is_empty(),
        errors,
        missing_required,
        unknown_fields,
        first_invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::field::FieldRules;
    use serde_json::json;

    fn messages(report: &FieldReport) -> Vec<(&str, &str)> {
        report
            .errors
            .iter()
            .map(|error| (error.path.as_str(), error.message.as_str()))
            .collect()
    }

    #[test]
    fn required_messages_depend_on_kind() {
        let text = FieldSpec::new("name", FieldType::Text).required();
        let report = validate_field(&text, "name", Some(&json!("")));
        assert_eq!(messages(&report), vec![("name", "This field is required.")]);

        let checkbox = FieldSpec::new("tags", FieldType::Checkbox).required();
        let report = validate_field(&checkbox, "tags", Some(&json!([])));
        assert_eq!(
            messages(&report),
            vec![("tags", "Please select at least one option.")]
        );
    }

    #[test]
    fn optional_empty_value_passes_every_rule() {
        let field = FieldSpec::new("code", FieldType::Text).with_rules(FieldRules {
            min_length: Some(3),
            pattern: Some("^[A-Z]+$".into()),
            ..Default::default()
        });
        assert!(validate_field(&field, "code", None).is_valid());
    }

    #[test]
    fn length_is_counted_in_characters() {
        let field = FieldSpec::new("nick", FieldType::Text).with_rules(FieldRules {
            min_length: Some(2),
            max_length: Some(3),
            ..Default::default()
        });
        assert!(validate_field(&field, "nick", Some(&json!("éé"))).is_valid());
        let report = validate_field(&field, "nick", Some(&json!("a")));
        assert_eq!(messages(&report), vec![("nick", "Must be at least 2 characters.")]);
        let report = validate_field(&field, "nick", Some(&json!("abcd")));
        assert_eq!(messages(&report), vec![("nick", "Must not exceed 3 characters.")]);
    }

    #[test]
    fn numeric_range_only_applies_to_parsable_numbers() {
        let field = FieldSpec::new("age", FieldType::Number).with_rules(FieldRules {
            min: Some(0.0),
            max: Some(120.0),
            ..Default::default()
        });
        let report = validate_field(&field, "age", Some(&json!("200")));
        assert_eq!(messages(&report), vec![("age", "Must be ≤ 120.")]);
        let report = validate_field(&field, "age", Some(&json!(-1)));
        assert_eq!(messages(&report), vec![("age", "Must be ≥ 0.")]);
        assert!(validate_field(&field, "age", Some(&json!("abc"))).is_valid());
        assert!(validate_field(&field, "age", Some(&json!(" 42 "))).is_valid());

        let fractional = FieldSpec::new("ratio", FieldType::Number).with_rules(FieldRules {
            max: Some(0.5),
            ..Default::default()
        });
        let report = validate_field(&fractional, "ratio", Some(&json!("0.75")));
        assert_eq!(messages(&report), vec![("ratio", "Must be ≤ 0.5.")]);
    }

    #[test]
    fn pattern_rule_runs_before_validation_pattern() {
        let field = FieldSpec::new("zip", FieldType::Text)
            .with_rules(FieldRules {
                pattern: Some("^[0-9]+$".into()),
                pattern_message: Some("Digits only.".into()),
                ..Default::default()
            })
            .with_validation_pattern("^.{5}$");
        let report = validate_field(&field, "zip", Some(&json!("12a")));
        assert_eq!(messages(&report), vec![("zip", "Digits only.")]);
        let report = validate_field(&field, "zip", Some(&json!("123")));
        assert_eq!(messages(&report), vec![("zip", "Invalid format.")]);
        assert!(validate_field(&field, "zip", Some(&json!("12345"))).is_valid());
    }

    #[test]
    fn bypassed_field_is_not_checked() {
        let mut field = FieldSpec::new("name", FieldType::Text).required();
        field.skip = true;
        let report = validate_field(&field, "name", None);
        assert!(report.bypassed);
        assert!(report.is_valid());
    }

    #[test]
    fn group_entries_validate_at_item_paths() {
        let group = FieldSpec::new("pets", FieldType::Group).with_sub_fields(vec![
            FieldSpec::new("name", FieldType::Text).required(),
            FieldSpec::new("age", FieldType::Number).with_rules(FieldRules {
                max: Some(30.0),
                ..Default::default()
            }),
        ]);
        let value = json!([{ "name": "Rex", "age": "3" }, { "name": "", "age": "40" }]);
        let report = validate_field(&group, "pets", Some(&value));
        assert_eq!(
            messages(&report),
            vec![
                ("pets-item1-name", "This field is required."),
                ("pets-item1-age", "Must be ≤ 30."),
            ]
        );
    }

    #[test]
    fn required_group_failure_reports_only_the_group() {
        let group = FieldSpec::new("pets", FieldType::Group)
            .required()
            .with_sub_fields(vec![FieldSpec::new("name", FieldType::Text).required()]);
        let report = validate_field(&group, "pets", Some(&json!([{ "name": "" }])));
        assert_eq!(
            messages(&report),
            vec![("pets", "At least one complete entry is required.")]
        );
    }
}
