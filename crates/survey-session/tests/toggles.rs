use serde_json::json;

use survey_session::{Applied, LookupError, PersistedState, StateStore};
use survey_spec::{
    Disposition, FieldSpec, FieldType, FlagKind, Flagged, Page, Questionnaire, Section,
    SectionKey, compute_progress,
};

const S0: SectionKey = SectionKey::new(0, 0);

fn fixture(name: &str) -> &'static str {
    match name {
        "onboarding" => include_str!("../../survey-spec/tests/fixtures/onboarding.json"),
        "scenario" => include_str!("../../survey-spec/tests/fixtures/scenario.json"),
        _ => panic!("unknown fixture {}", name),
    }
}

fn store(name: &str) -> StateStore {
    StateStore::new(Questionnaire::from_json(fixture(name)).expect("questionnaire"))
}

fn field_flags(store: &StateStore, key: SectionKey, id: &str) -> (bool, bool) {
    let address = store.questionnaire().locate(key, id).expect("address");
    store.questionnaire().field(&address).expect("field").flags()
}

fn section_flags(store: &StateStore, key: SectionKey) -> (bool, bool) {
    store.questionnaire().section(key).expect("section").flags()
}

fn persisted(value: serde_json::Value) -> PersistedState {
    serde_json::from_value(value).expect("persisted state")
}

#[test]
fn scenario_end_to_end() {
    let mut store = store("scenario");
    store.set_response("name", json!("Ada")).expect("name");
    let progress = compute_progress(store.questionnaire(), store.responses(), store.errors(), S0);
    assert_eq!(progress.required_percent, 100);

    store.set_response("age", json!("200")).expect("age");
    assert_eq!(store.errors().get("age"), Some("Must be ≤ 120."));

    let disposition = store
        .toggle_field(S0, "age", FlagKind::Exclude)
        .expect("toggle");
    assert_eq!(disposition, Disposition::Excluded);
    assert!(store.errors().get("age").is_none());
    assert!(store.response("age").is_none());

    let progress = compute_progress(store.questionnaire(), store.responses(), store.errors(), S0);
    assert_eq!(progress.optional_total, 0);
    assert_eq!(progress.optional_percent, 0);
    assert_eq!(progress.required_percent, 100);
}

#[test]
fn setting_one_flag_clears_the_other() {
    let mut store = store("scenario");
    store.toggle_field(S0, "age", FlagKind::Skip).expect("skip");
    assert_eq!(field_flags(&store, S0, "age"), (false, true));
    store.toggle_field(S0, "age", FlagKind::Exclude).expect("exclude");
    assert_eq!(field_flags(&store, S0, "age"), (true, false));
    store.toggle_field(S0, "age", FlagKind::Skip).expect("skip");
    assert_eq!(field_flags(&store, S0, "age"), (false, true));
    store.toggle_field(S0, "age", FlagKind::Skip).expect("resume");
    assert_eq!(field_flags(&store, S0, "age"), (false, false));
}

#[test]
fn responses_to_bypassed_fields_are_ignored() {
    let mut store = store("scenario");
    store.toggle_field(S0, "age", FlagKind::Skip).expect("skip");
    assert_eq!(store.set_response("age", json!("30")), Ok(Applied::Ignored));
    assert!(store.response("age").is_none());

    store.toggle_section(S0, FlagKind::Exclude).expect("section");
    assert_eq!(store.set_response("name", json!("Ada")), Ok(Applied::Ignored));
}

#[test]
fn excluding_a_group_cascades_and_resuming_a_sub_field_reopens_it() {
    let mut store = store("onboarding");
    let pets = SectionKey::new(1, 0);
    store
        .set_response("pets", json!([{ "pet_name": "Rex", "species": "dog" }]))
        .expect("pets");

    store.toggle_field(pets, "pets", FlagKind::Exclude).expect("exclude");
    assert_eq!(field_flags(&store, pets, "pet_name"), (true, false));
    assert_eq!(field_flags(&store, pets, "species"), (true, false));
    assert!(store.response("pets").is_none());
    assert_eq!(section_flags(&store, pets), (false, false));

    store.toggle_field(pets, "notes", FlagKind::Exclude).expect("notes");
    assert_eq!(section_flags(&store, pets), (true, false));

    store
        .toggle_field(pets, "species", FlagKind::Exclude)
        .expect("resume species");
    assert_eq!(field_flags(&store, pets, "species"), (false, false));
    assert_eq!(field_flags(&store, pets, "pets"), (false, false));
    assert_eq!(field_flags(&store, pets, "pet_name"), (true, false));
    assert_eq!(section_flags(&store, pets), (false, false));
}

#[test]
fn mixed_dispositions_leave_the_section_unflagged() {
    let mut store = store("scenario");
    store.toggle_field(S0, "name", FlagKind::Skip).expect("skip");
    store.toggle_field(S0, "age", FlagKind::Exclude).expect("exclude");
    assert_eq!(section_flags(&store, S0), (false, false));

    store.toggle_field(S0, "name", FlagKind::Exclude).expect("exclude");
    assert_eq!(section_flags(&store, S0), (true, false));

    store.toggle_field(S0, "name", FlagKind::Exclude).expect("include");
    assert_eq!(section_flags(&store, S0), (false, false));
}

#[test]
fn section_toggle_cascades_into_nested_sub_fields() {
    let mut store = store("onboarding");
    let pets = SectionKey::new(1, 0);
    store
        .set_response("pets", json!([{ "pet_name": "" }]))
        .expect("pets");
    store.set_response("notes", json!("hello")).expect("notes");

    store.toggle_section(pets, FlagKind::Skip).expect("skip section");
    assert_eq!(section_flags(&store, pets), (false, true));
    for id in ["pets", "pet_name", "species", "notes"] {
        assert_eq!(field_flags(&store, pets, id), (false, true), "{id}");
    }
    assert!(store.response("pets").is_none());
    assert!(store.response("notes").is_none());

    store.toggle_section(pets, FlagKind::Exclude).expect("exclude section");
    assert_eq!(field_flags(&store, pets, "pet_name"), (true, false));

    store.toggle_section(pets, FlagKind::Exclude).expect("include section");
    assert_eq!(section_flags(&store, pets), (false, false));
    assert_eq!(field_flags(&store, pets, "pet_name"), (false, false));
}

#[test]
fn toggling_clears_prefixed_error_keys() {
    let mut store = store("onboarding");
    let pets = SectionKey::new(1, 0);
    store
        .set_response(
            "pets",
            json!([{ "pet_name": "", "species": "cat" }, { "pet_name": "", "species": "dog" }]),
        )
        .expect("pets");
    assert!(store.errors().get("pets-item0-pet_name").is_some());
    assert!(store.errors().get("pets-item1-pet_name").is_some());

    store.toggle_field(pets, "pets", FlagKind::Skip).expect("skip");
    assert!(!store.errors().has_error_for("pets"));
}

#[test]
fn double_toggle_restores_flags_but_not_the_erased_response() {
    let mut store = store("scenario");
    store.set_response("age", json!("42")).expect("age");

    store.toggle_field(S0, "age", FlagKind::Exclude).expect("exclude");
    store.toggle_field(S0, "age", FlagKind::Exclude).expect("include");
    assert_eq!(field_flags(&store, S0, "age"), (false, false));
    assert!(store.response("age").is_none());

    store.set_response("age", json!("42")).expect("re-populate");
    store.toggle_field(S0, "age", FlagKind::Exclude).expect("exclude");
    store.toggle_field(S0, "age", FlagKind::Exclude).expect("include");
    store.set_response("age", json!("42")).expect("re-populate");
    assert_eq!(store.response("age"), Some(&json!("42")));
    assert!(store.errors().is_empty());
}

#[test]
fn lookups_outside_the_current_section_are_not_found() {
    let mut store = store("onboarding");
    let before = store.responses().clone();
    assert_eq!(
        store.toggle_field(S0, "pets", FlagKind::Exclude),
        Err(LookupError::FieldNotInSection {
            field_id: "pets".into(),
            section: S0
        })
    );
    assert_eq!(
        store.toggle_section(SectionKey::new(0, 9), FlagKind::Skip),
        Err(LookupError::UnknownSection(SectionKey::new(0, 9)))
    );
    assert_eq!(store.responses(), &before);
    assert_eq!(section_flags(&store, S0), (false, false));
}

#[test]
fn required_group_needs_a_filled_in_scope_sub_field() {
    let questionnaire = Questionnaire::new(vec![Page::new(
        "p",
        vec![Section::new(
            "s",
            vec![
                FieldSpec::new("contacts", FieldType::Group)
                    .required()
                    .with_sub_fields(vec![
                        FieldSpec::new("phone", FieldType::Tel),
                        FieldSpec::new("email", FieldType::Email),
                    ]),
            ],
        )],
    )])
    .expect("questionnaire");
    let mut store = StateStore::new(questionnaire);

    store
        .set_response("contacts", json!([{ "phone": "", "email": "" }]))
        .expect("set");
    assert_eq!(
        store.errors().get("contacts"),
        Some("At least one complete entry is required.")
    );

    store
        .set_entry_value("contacts", 0, "email", json!("a@b.c"))
        .expect("edit");
    assert!(store.errors().get("contacts").is_none());

    store
        .toggle_field(S0, "email", FlagKind::Exclude)
        .expect("exclude email");
    assert!(!store.validate_section(S0).expect("validate"));
    assert_eq!(
        store.errors().get("contacts"),
        Some("At least one complete entry is required.")
    );
}

#[test]
fn restoring_a_group_flag_cascades_to_its_sub_fields() {
    let mut store = store("onboarding");
    let pets = SectionKey::new(1, 0);
    store.restore(persisted(json!({
        "_excludedFields": { "pets": true },
        "pets": [{ "pet_name": "Rex", "species": "dog" }],
        "notes": "hi"
    })));

    assert_eq!(field_flags(&store, pets, "pets"), (true, false));
    assert_eq!(field_flags(&store, pets, "pet_name"), (true, false));
    assert_eq!(field_flags(&store, pets, "species"), (true, false));
    assert_eq!(section_flags(&store, pets), (false, false));
    assert!(store.response("pets").is_none());
    assert_eq!(store.response("notes"), Some(&json!("hi")));

    store
        .toggle_field(pets, "species", FlagKind::Exclude)
        .expect("resume species");
    assert_eq!(field_flags(&store, pets, "species"), (false, false));
    assert_eq!(field_flags(&store, pets, "pets"), (false, false));
    assert_eq!(field_flags(&store, pets, "pet_name"), (true, false));
}

#[test]
fn restoring_every_field_flag_rolls_up_to_the_section() {
    let mut store = store("scenario");
    store.restore(persisted(json!({
        "_skippedFields": { "name": true, "age": true },
        "name": "Ada"
    })));

    assert_eq!(section_flags(&store, S0), (false, true));
    assert!(store.response("name").is_none());
    assert!(store.snapshot(false).flags.skipped_sections.contains_key("0-0"));

    store.toggle_field(S0, "name", FlagKind::Skip).expect("resume name");
    assert_eq!(section_flags(&store, S0), (false, false));
}
