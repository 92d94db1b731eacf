use serde_json::json;

use survey_spec::{
    ErrorMap, Questionnaire, ResponseMap, SectionKey, build_view_payload, render_json_ui,
    render_text,
};

fn fixture(name: &str) -> &'static str {
    match name {
        "onboarding" => include_str!("../tests/fixtures/onboarding.json"),
        _ => panic!("unknown fixture {}", name),
    }
}

#[test]
fn render_text_shows_counters_and_fields() {
    let questionnaire = Questionnaire::from_json(fixture("onboarding")).expect("questionnaire");
    let mut responses = ResponseMap::new();
    responses.insert("name".into(), json!("Ada"));
    let mut errors = ErrorMap::new();
    errors.insert("email", "This field is required.");

    let payload = build_view_payload(&questionnaire, &responses, &errors, SectionKey::new(0, 0))
        .expect("payload");
    let text = render_text(&payload);
    assert!(text.contains("Page 1 of 2: About you"));
    assert!(text.contains("Section 1 of 2: Identity [error]"));
    assert!(text.contains(" - name (Full name) [required] = Ada"));
    assert!(text.contains("! This field is required."));
}

#[test]
fn group_fields_expose_effective_entries() {
    let questionnaire = Questionnaire::from_json(fixture("onboarding")).expect("questionnaire");
    let responses = ResponseMap::new();
    let mut errors = ErrorMap::new();
    errors.insert("pets-item0-pet_name", "This field is required.");

    let payload = build_view_payload(&questionnaire, &responses, &errors, SectionKey::new(1, 0))
        .expect("payload");
    let pets = &payload.fields[0];
    assert_eq!(pets.entries.len(), 1);
    assert_eq!(pets.entries[0].errors.len(), 1);

    let ui = render_json_ui(&payload);
    assert_eq!(ui["page"]["id"], "household");
    assert_eq!(ui["section"]["count"], 1);
    let entries = ui["fields"][0]["entries"].as_array().expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0]["errors"]["pets-item0-pet_name"],
        "This field is required."
    );
    assert_eq!(ui["progress"]["requiredPercent"], 0);
}

#[test]
fn out_of_range_cursor_has_no_payload() {
    let questionnaire = Questionnaire::from_json(fixture("onboarding")).expect("questionnaire");
    assert!(
        build_view_payload(
            &questionnaire,
            &ResponseMap::new(),
            &ErrorMap::new(),
            SectionKey::new(5, 0)
        )
        .is_none()
    );
}
