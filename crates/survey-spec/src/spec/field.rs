use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::disposition::{FlagKind, Flagged};

/// Input kinds a field can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Email,
    Url,
    Tel,
    Number,
    Textarea,
    Radio,
    Checkbox,
    Select,
    Date,
    Group,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Email => "email",
            FieldType::Url => "url",
            FieldType::Tel => "tel",
            FieldType::Number => "number",
            FieldType::Textarea => "textarea",
            FieldType::Radio => "radio",
            FieldType::Checkbox => "checkbox",
            FieldType::Select => "select",
            FieldType::Date => "date",
            FieldType::Group => "group",
        }
    }

    /// Option pickers report "select at least one option" when left empty.
    pub fn is_choice(&self) -> bool {
        matches!(self, FieldType::Radio | FieldType::Checkbox)
    }
}

/// One selectable option of a radio, checkbox or select field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldOption {
    pub value: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Declarative validation rules attached to a field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_message: Option<String>,
}

/// A single question. Group fields carry a repeatable set of sub-fields.
///
/// `exclude` and `skip` are runtime flags; the node itself is the only place a
/// field's disposition is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: FieldType,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helper: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, alias = "validation", skip_serializing_if = "Option::is_none")]
    pub validation_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<FieldRules>,
    #[serde(default, alias = "group", skip_serializing_if = "Vec::is_empty")]
    pub sub_fields: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub exclude: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub skip: bool,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

impl FieldSpec {
    pub fn new(id: impl Into<String>, kind: FieldType) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            kind,
            description: None,
            helper: None,
            example: None,
            required: false,
            min: None,
            max: None,
            validation_pattern: None,
            options: Vec::new(),
            rules: None,
            sub_fields: Vec::new(),
            exclude: false,
            skip: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_rules(mut self, rules: FieldRules) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn with_validation_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.validation_pattern = Some(pattern.into());
        self
    }

    pub fn with_options<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = values
            .into_iter()
            .map(|value| {
                let value = value.into();
                FieldOption {
                    label: value.clone(),
                    value,
                    description: None,
                }
            })
            .collect();
        self
    }

    pub fn with_sub_fields(mut self, sub_fields: Vec<FieldSpec>) -> Self {
        self.sub_fields = sub_fields;
        self
    }

    pub fn is_group(&self) -> bool {
        self.kind == FieldType::Group
    }

    pub fn sub_field(&self, id: &str) -> Option<&FieldSpec> {
        self.sub_fields.iter().find(|sub| sub.id == id)
    }

    /// Lower bound for numeric values; `rules.min` wins over the field attribute.
    pub fn effective_min(&self) -> Option<f64> {
        self.rules.as_ref().and_then(|rules| rules.min).or(self.min)
    }

    pub fn effective_max(&self) -> Option<f64> {
        self.rules.as_ref().and_then(|rules| rules.max).or(self.max)
    }

    /// Sets `kind` on this node and every nested sub-field.
    pub fn cascade_flag(&mut self, kind: FlagKind, on: bool) {
        self.set_flag(kind, on);
        for sub in &mut self.sub_fields {
            sub.cascade_flag(kind, on);
        }
    }

    /// Value of a freshly added group entry slot for this field.
    pub fn blank_value(&self) -> serde_json::Value {
        match self.kind {
            FieldType::Checkbox | FieldType::Group => serde_json::Value::Array(Vec::new()),
            _ => serde_json::Value::String(String::new()),
        }
    }

    pub(crate) fn patterns(&self) -> impl Iterator<Item = &str> {
        self.rules
            .as_ref()
            .and_then(|rules| rules.pattern.as_deref())
            .into_iter()
            .chain(self.validation_pattern.as_deref())
    }
}

impl Flagged for FieldSpec {
    fn flags(&self) -> (bool, bool) {
        (self.exclude, self.skip)
    }

    fn flag_slots(&mut self) -> (&mut bool, &mut bool) {
        (&mut self.exclude, &mut self.skip)
    }
}
