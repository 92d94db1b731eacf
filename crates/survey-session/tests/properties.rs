use proptest::prelude::*;
use serde_json::json;

use survey_session::StateStore;
use survey_spec::{FieldSpec, FieldType, FlagKind, Flagged, Page, Questionnaire, Section, SectionKey};

const S0: SectionKey = SectionKey::new(0, 0);
const IDS: [&str; 6] = ["name", "pets", "pet_name", "tags", "toys", "toy"];

fn store() -> StateStore {
    let questionnaire = Questionnaire::new(vec![Page::new(
        "p",
        vec![Section::new(
            "s",
            vec![
                FieldSpec::new("name", FieldType::Text).required(),
                FieldSpec::new("pets", FieldType::Group).with_sub_fields(vec![
                    FieldSpec::new("pet_name", FieldType::Text).required(),
                    FieldSpec::new("tags", FieldType::Checkbox),
                    FieldSpec::new("toys", FieldType::Group)
                        .with_sub_fields(vec![FieldSpec::new("toy", FieldType::Text).required()]),
                ]),
            ],
        )],
    )])
    .expect("questionnaire");
    let mut store = StateStore::new(questionnaire);
    store.set_response("name", json!("")).expect("name");
    store
        .set_response(
            "pets",
            json!([{ "pet_name": "", "tags": ["a"], "toys": [{ "toy": "" }] }]),
        )
        .expect("pets");
    store
}

#[derive(Debug, Clone)]
enum Op {
    Field(usize, FlagKind),
    Section(FlagKind),
}

fn kind() -> impl Strategy<Value = FlagKind> {
    prop_oneof![Just(FlagKind::Exclude), Just(FlagKind::Skip)]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..IDS.len(), kind()).prop_map(|(idx, kind)| Op::Field(idx, kind)),
        1 => kind().prop_map(Op::Section),
    ]
}

fn apply(store: &mut StateStore, op: &Op) {
    match op {
        Op::Field(idx, kind) => {
            store.toggle_field(S0, IDS[*idx], *kind).expect("toggle field");
        }
        Op::Section(kind) => {
            store.toggle_section(S0, *kind).expect("toggle section");
        }
    }
}

fn all_nodes(fields: &[FieldSpec], out: &mut Vec<FieldSpec>) {
    for field in fields {
        out.push(field.clone());
        all_nodes(&field.sub_fields, out);
    }
}

proptest! {
    #[test]
    fn flags_never_overlap(ops in prop::collection::vec(op(), 0..24)) {
        let mut store = store();
        for op in &ops {
            apply(&mut store, op);
        }
        let section = store.questionnaire().section(S0).expect("section");
        prop_assert!(!(section.exclude && section.skip));
        let mut nodes = Vec::new();
        all_nodes(&section.fields, &mut nodes);
        for node in nodes {
            prop_assert!(!(node.exclude && node.skip), "{} has both flags", node.id);
        }
    }

    #[test]
    fn bypassed_fields_hold_no_data(ops in prop::collection::vec(op(), 1..24)) {
        let mut store = store();
        for op in &ops {
            apply(&mut store, op);
        }
        let section = store.questionnaire().section(S0).expect("section");
        for field in &section.fields {
            if section.is_bypassed() || field.is_bypassed() {
                prop_assert!(store.response(&field.id).is_none(), "{} kept a response", field.id);
                prop_assert!(!store.errors().has_error_for(&field.id), "{} kept errors", field.id);
            }
        }
        let pets = section.field("pets").expect("pets");
        for sub in pets.sub_fields.iter().filter(|sub| sub.is_bypassed()) {
            if let Some(entries) = store.response("pets").and_then(|value| value.as_array()) {
                for entry in entries {
                    prop_assert!(entry.get(&sub.id).is_none(), "{} kept a value", sub.id);
                }
            }
            let marker = format!("-{}", sub.id);
            prop_assert!(
                !store.errors().iter().any(|(path, _)| path.starts_with("pets-item") && path.contains(&marker)),
                "{} kept errors",
                sub.id
            );
        }
    }

    #[test]
    fn section_flag_matches_its_fields(ops in prop::collection::vec(op(), 1..24)) {
        let mut store = store();
        for op in &ops {
            apply(&mut store, op);
        }
        let section = store.questionnaire().section(S0).expect("section");
        let all_excluded = section.fields.iter().all(|field| field.exclude);
        let all_skipped = section.fields.iter().all(|field| field.skip);
        prop_assert_eq!(section.exclude, all_excluded);
        prop_assert_eq!(section.skip, all_skipped);
    }
}
