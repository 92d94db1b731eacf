use serde_json::{Map, Value, json};

use crate::disposition::Flagged;
use crate::spec::field::{FieldSpec, FieldType};
use crate::spec::questionnaire::{Page, Questionnaire};

/// JSON Schema of a questionnaire document (an array of pages).
pub fn questionnaire_schema() -> Value {
    let schema = schemars::schema_for!(Vec<Page>);
    serde_json::to_value(&schema).unwrap_or(Value::Null)
}

/// JSON Schema of the response map accepted for `questionnaire`.
///
/// Bypassed fields are left out entirely; in-scope required fields are listed
/// under `required`. Keys starting with `_` are allowed as metadata.
pub fn responses_schema(questionnaire: &Questionnaire) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for (key, field) in questionnaire.top_level_fields() {
        let section_bypassed = questionnaire
            .section(key)
            .is_some_and(|section| section.is_bypassed());
        if section_bypassed || field.is_bypassed() {
            continue;
        }
        properties.insert(field.id.clone(), field_schema(field));
        if field.required {
            required.push(Value::String(field.id.clone()));
        }
    }

    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "properties": properties,
        "required": required,
        "patternProperties": { "^_": {} },
        "additionalProperties": false,
    })
}

fn field_schema(field: &FieldSpec) -> Value {
    let mut schema = match field.kind {
        FieldType::Checkbox => json!({ "type": "array", "items": { "type": "string" } }),
        FieldType::Group => {
            let mut properties = Map::new();
            for sub in field.sub_fields.iter().filter(|sub| !sub.is_bypassed()) {
                properties.insert(sub.id.clone(), field_schema(sub));
            }
            json!({
                "type": "array",
                "items": { "type": "object", "properties": properties },
            })
        }
        FieldType::Number => json!({ "type": ["string", "number"] }),
        _ => json!({ "type": "string" }),
    };

    if let Value::Object(map) = &mut schema {
        map.insert("title".into(), Value::String(field.label.clone()));
        if let Some(description) = &field.description {
            map.insert("description".into(), Value::String(description.clone()));
        }
        if !field.options.is_empty() && matches!(field.kind, FieldType::Radio | FieldType::Select)
        {
            map.insert(
                "enum".into(),
                field
                    .options
                    .iter()
                    .map(|option| Value::String(option.value.clone()))
                    .collect(),
            );
        }
    }
    schema
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::questionnaire::Section;

    #[test]
    fn responses_schema_lists_required_in_scope_fields() {
        let mut optional = FieldSpec::new("nickname", FieldType::Text);
        optional.exclude = true;
        let questionnaire = Questionnaire::new(vec![Page::new(
            "p",
            vec![Section::new(
                "s",
                vec![
                    FieldSpec::new("name", FieldType::Text).required(),
                    FieldSpec::new("color", FieldType::Radio).with_options(["red", "blue"]),
                    optional,
                ],
            )],
        )])
        .expect("questionnaire");

        let schema = responses_schema(&questionnaire);
        assert_eq!(schema["required"], json!(["name"]));
        assert_eq!(schema["properties"]["color"]["enum"], json!(["red", "blue"]));
        assert!(schema["properties"].get("nickname").is_none());
    }

    #[test]
    fn questionnaire_schema_describes_an_array() {
        let schema = questionnaire_schema();
        assert_eq!(schema["type"], "array");
    }
}
