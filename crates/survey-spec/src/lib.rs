#![allow(missing_docs)]

pub mod answers;
pub mod disposition;
pub mod progress;
pub mod render;
pub mod schema;
pub mod spec;
pub mod validate;

pub use answers::{ErrorMap, GroupEntry, ResponseMap, group_entries, item_path, value_is_empty};
pub use disposition::{Disposition, DispositionMap, FlagKind, Flagged, resolve_dispositions};
pub use progress::{
    BadgeStatus, ProgressReport, SectionStatus, StepCounts, compute_progress, step_counts,
};
pub use render::{ViewEntry, ViewField, ViewPayload, build_view_payload, render_json_ui, render_text};
pub use schema::{questionnaire_schema, responses_schema};
pub use spec::{
    FieldAddress, FieldOption, FieldRules, FieldSpec, FieldType, Page, Questionnaire, SchemaError,
    Section, SectionKey,
};
pub use validate::{
    FieldReport, ValidationError, ValidationResult, validate, validate_field, validate_section,
};
