use serde_json::json;
use tempfile::TempDir;

use survey_session::{
    PersistedState, PersistenceGateway, Session, SessionConfig, StartKind, SubmitOutcome,
    VersionDirGateway,
};
use survey_spec::{Questionnaire, SectionKey};

fn questionnaire() -> Questionnaire {
    Questionnaire::from_json(include_str!("../../survey-spec/tests/fixtures/scenario.json"))
        .expect("questionnaire")
}

#[test]
fn draft_round_trips_through_v0() {
    let dir = TempDir::new().expect("tempdir");
    let mut gateway = VersionDirGateway::open(dir.path().join("versions")).expect("gateway");
    assert!(!gateway.load_latest().expect("load").exists);

    let mut state = PersistedState::default();
    state.responses.insert("name".into(), json!("Ada"));
    state.flags.skipped_fields.insert("age".into(), true);
    gateway.save_version(&state).expect("save");

    let latest = gateway.load_latest().expect("load");
    assert!(latest.exists);
    assert_eq!(latest.version_file.as_deref(), Some("v0.json"));
    assert!(latest.last_modified.is_some());
    assert_eq!(latest.data, Some(state));

    gateway.reset().expect("reset");
    assert!(!gateway.draft_path().exists());
    gateway.reset().expect("reset twice");
}

#[test]
fn corrupt_draft_is_a_decode_error() {
    let dir = TempDir::new().expect("tempdir");
    let mut gateway = VersionDirGateway::open(dir.path()).expect("gateway");
    std::fs::write(gateway.draft_path(), "{ not json").expect("write");
    assert!(gateway.load_latest().is_err());

    let session = Session::start(questionnaire(), gateway, &SessionConfig::default());
    assert_eq!(session.start_kind(), StartKind::LoadFailed);
}

#[test]
fn submissions_are_archived_with_increasing_versions() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join("v4.json"), "{}").expect("seed");
    let gateway = VersionDirGateway::open(dir.path()).expect("gateway");
    let mut session = Session::start(questionnaire(), gateway, &SessionConfig::default());

    session.set_response("name", json!("Ada")).expect("name");
    assert!(session.save_now());
    assert!(dir.path().join("v0.json").exists());

    let outcome = session.submit().expect("submit");
    assert!(matches!(
        outcome,
        SubmitOutcome::Submitted {
            version: Some(5),
            ..
        }
    ));
    assert!(dir.path().join("v5.json").exists());
    assert!(!dir.path().join("v0.json").exists());

    let archived: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("v5.json")).expect("read"),
    )
    .expect("json");
    assert_eq!(archived["only"]["basics"]["name"], "Ada");
    assert_eq!(session.gateway().archived_versions().expect("list"), vec![4, 5]);
}

#[test]
fn dropping_a_session_writes_the_teardown_draft() {
    let dir = TempDir::new().expect("tempdir");
    {
        let gateway = VersionDirGateway::open(dir.path()).expect("gateway");
        let mut session = Session::start(questionnaire(), gateway, &SessionConfig::default());
        session.set_response("name", json!("Ada")).expect("name");
        session.toggle_field_exclude("age").expect("exclude");
    }

    let raw = std::fs::read_to_string(dir.path().join("v0.json")).expect("draft");
    let draft: serde_json::Value = serde_json::from_str(&raw).expect("json");
    assert_eq!(draft["name"], "Ada");
    assert_eq!(draft["_unsaved"], true);
    assert_eq!(draft["_excludedFields"]["age"], true);

    let gateway = VersionDirGateway::open(dir.path()).expect("gateway");
    let session = Session::start(questionnaire(), gateway, &SessionConfig::default());
    assert_eq!(session.start_kind(), StartKind::Restored);
    assert_eq!(session.responses()["name"], json!("Ada"));
    assert_eq!(session.cursor(), SectionKey::new(0, 0));
    let age = session
        .questionnaire()
        .section(SectionKey::new(0, 0))
        .and_then(|section| section.field("age"))
        .expect("age");
    assert!(age.exclude);
}
