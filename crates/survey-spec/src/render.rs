use serde_json::{Map, Value, json};

use crate::{
    answers::{ErrorMap, GroupEntry, ResponseMap, group_entries},
    disposition::{Disposition, Flagged},
    progress::{ProgressReport, StepCounts, compute_progress, step_counts},
    spec::{
        field::{FieldSpec, FieldType},
        questionnaire::Questionnaire,
        tree::SectionKey,
    },
};

/// Describes a single field for render outputs.
#[derive(Debug, Clone)]
pub struct ViewField {
    pub id: String,
    pub label: String,
    pub kind: FieldType,
    pub required: bool,
    pub description: Option<String>,
    pub helper: Option<String>,
    pub example: Option<String>,
    pub disposition: Disposition,
    pub options: Vec<String>,
    pub value: Option<Value>,
    pub error: Option<String>,
    /// Effective entries of a group field; empty for other kinds.
    pub entries: Vec<ViewEntry>,
}

/// One group entry with the errors recorded at its item paths.
#[derive(Debug, Clone)]
pub struct ViewEntry {
    pub index: usize,
    pub values: GroupEntry,
    pub errors: Vec<(String, String)>,
}

/// Collected payload used by both text and JSON renderers.
#[derive(Debug, Clone)]
pub struct ViewPayload {
    pub cursor: SectionKey,
    pub page_id: String,
    pub page_title: String,
    pub section_id: String,
    pub section_title: String,
    pub section_description: Option<String>,
    pub section_disposition: Disposition,
    pub steps: StepCounts,
    pub progress: ProgressReport,
    pub fields: Vec<ViewField>,
}

/// Build the renderer payload for the section under `cursor`.
pub fn build_view_payload(
    questionnaire: &Questionnaire,
    responses: &ResponseMap,
    errors: &ErrorMap,
    cursor: SectionKey,
) -> Option<ViewPayload> {
    let page = questionnaire.page(cursor.page)?;
    let section = questionnaire.section(cursor)?;

    let fields = section
        .fields
        .iter()
        .map(|field| view_field(field, responses.get(&field.id), errors))
        .collect();

    Some(ViewPayload {
        cursor,
        page_id: page.id.clone(),
        page_title: page.title.clone(),
        section_id: section.id.clone(),
        section_title: section.title.clone(),
        section_description: section.description.clone(),
        section_disposition: section.disposition(),
        steps: step_counts(questionnaire, cursor),
        progress: compute_progress(questionnaire, responses, errors, cursor),
        fields,
    })
}

fn view_field(field: &FieldSpec, value: Option<&Value>, errors: &ErrorMap) -> ViewField {
    let entries = if field.is_group() {
        group_entries(value)
            .into_iter()
            .enumerate()
            .map(|(index, values)| {
                let prefix = format!("{}-item{index}-", field.id);
                let errors = errors
                    .iter()
                    .filter(|(path, _)| path.starts_with(&prefix))
                    .map(|(path, message)| (path.to_string(), message.to_string()))
                    .collect();
                ViewEntry {
                    index,
                    values,
                    errors,
                }
            })
            .collect()
    } else {
        Vec::new()
    };

    ViewField {
        id: field.id.clone(),
        label: field.label.clone(),
        kind: field.kind,
        required: field.required,
        description: field.description.clone(),
        helper: field.helper.clone(),
        example: field.example.clone(),
        disposition: field.disposition(),
        options: field.options.iter().map(|option| option.value.clone()).collect(),
        value: value.cloned(),
        error: errors.get(&field.id).map(str::to_string),
        entries,
    }
}

/// Render the payload as a structured JSON-friendly value.
pub fn render_json_ui(payload: &ViewPayload) -> Value {
    let fields = payload
        .fields
        .iter()
        .map(|field| {
            let mut map = Map::new();
            map.insert("id".into(), Value::String(field.id.clone()));
            map.insert("label".into(), Value::String(field.label.clone()));
            map.insert("type".into(), Value::String(field.kind.as_str().to_string()));
            map.insert("required".into(), Value::Bool(field.required));
            map.insert(
                "disposition".into(),
                Value::String(field.disposition.as_str().to_string()),
            );
            if let Some(description) = &field.description {
                map.insert("description".into(), Value::String(description.clone()));
            }
            if let Some(helper) = &field.helper {
                map.insert("helper".into(), Value::String(helper.clone()));
            }
            if !field.options.is_empty() {
                map.insert(
                    "options".into(),
                    Value::Array(field.options.iter().cloned().map(Value::String).collect()),
                );
            }
            if field.kind == FieldType::Group {
                let entries = field
                    .entries
                    .iter()
                    .map(|entry| {
                        let errors: Map<String, Value> = entry
                            .errors
                            .iter()
                            .map(|(path, message)| (path.clone(), Value::String(message.clone())))
                            .collect();
                        json!({
                            "index": entry.index,
                            "values": entry.values,
                            "errors": errors,
                        })
                    })
                    .collect::<Vec<_>>();
                map.insert("entries".into(), Value::Array(entries));
            } else if let Some(value) = &field.value {
                map.insert("value".into(), value.clone());
            }
            if let Some(error) = &field.error {
                map.insert("error".into(), Value::String(error.clone()));
            }
            Value::Object(map)
        })
        .collect::<Vec<_>>();

    let statuses = payload
        .progress
        .pages
        .iter()
        .map(|page| {
            Value::Array(
                page.iter()
                    .map(|status| Value::String(status.as_str().to_string()))
                    .collect(),
            )
        })
        .collect::<Vec<_>>();

    json!({
        "page": {
            "index": payload.cursor.page,
            "id": payload.page_id,
            "title": payload.page_title,
            "number": payload.steps.page_number,
            "count": payload.steps.page_count,
        },
        "section": {
            "index": payload.cursor.section,
            "id": payload.section_id,
            "title": payload.section_title,
            "description": payload.section_description,
            "disposition": payload.section_disposition.as_str(),
            "number": payload.steps.section_number,
            "count": payload.steps.section_count,
        },
        "status": payload.progress.current.as_str(),
        "progress": {
            "requiredPercent": payload.progress.required_percent,
            "optionalPercent": payload.progress.optional_percent,
            "completed": payload.progress.completed(),
            "total": payload.progress.total(),
            "sections": statuses,
        },
        "fields": fields,
    })
}

/// Render the payload as human-friendly text.
pub fn render_text(payload: &ViewPayload) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "Page {} of {}: {}",
        payload.steps.page_number, payload.steps.page_count, payload.page_title
    ));
    lines.push(format!(
        "Section {} of {}: {} [{}]",
        payload.steps.section_number,
        payload.steps.section_count,
        payload.section_title,
        payload.progress.current.as_str()
    ));
    if let Some(description) = &payload.section_description {
        lines.push(format!("  {}", description));
    }
    if payload.section_disposition.is_bypassed() {
        lines.push(format!(
            "  (section {})",
            payload.section_disposition.as_str()
        ));
    }
    lines.push(format!(
        "Required: {}%  Optional: {}%  ({}/{} fields)",
        payload.progress.required_percent,
        payload.progress.optional_percent,
        payload.progress.completed(),
        payload.progress.total()
    ));

    lines.push("Fields:".to_string());
    for field in &payload.fields {
        let mut entry = format!(" - {} ({})", field.id, field.label);
        if field.required {
            entry.push_str(" [required]");
        }
        if field.disposition.is_bypassed() {
            entry.push_str(&format!(" [{}]", field.disposition.as_str()));
        } else if field.kind != FieldType::Group
            && let Some(value) = &field.value
        {
            entry.push_str(&format!(" = {}", value_to_display(value)));
        }
        lines.push(entry);
        if let Some(error) = &field.error {
            lines.push(format!("     ! {}", error));
        }
        for view in &field.entries {
            let values = view
                .values
                .iter()
                .map(|(id, value)| format!("{}={}", id, value_to_display(value)))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("     #{}: {}", view.index, values));
            for (path, message) in &view.errors {
                lines.push(format!("       ! {}: {}", path, message));
            }
        }
    }

    lines.join("\n")
}

fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(num) => num.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_to_display)
            .collect::<Vec<_>>()
            .join("|"),
        other => other.to_string(),
    }
}
