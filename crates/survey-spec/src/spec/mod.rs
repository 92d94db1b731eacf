pub mod field;
pub mod questionnaire;
pub mod tree;

use thiserror::Error;

pub use field::{FieldOption, FieldRules, FieldSpec, FieldType};
pub use questionnaire::{Page, Questionnaire, Section};
pub use tree::{FieldAddress, FieldIndex, SectionKey};

/// Terminal failures while loading a questionnaire document.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to parse questionnaire: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("questionnaire has no pages")]
    Empty,
    #[error("page '{page_id}' has no sections")]
    EmptyPage { page_id: String },
    #[error("field '{field_id}' has an invalid pattern: {source}")]
    InvalidPattern {
        field_id: String,
        #[source]
        source: regex::Error,
    },
}
