use std::path::PathBuf;

use thiserror::Error;

use survey_spec::{SchemaError, SectionKey};

/// An id or index that does not resolve against the loaded questionnaire.
///
/// Returned instead of panicking; the session state is untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("field '{field_id}' not found in section {section}")]
    FieldNotInSection { field_id: String, section: SectionKey },
    #[error("field '{0}' not found")]
    UnknownField(String),
    #[error("field '{0}' is not a group")]
    NotAGroup(String),
    #[error("group '{group_id}' has no entry {index}")]
    UnknownEntry { group_id: String, index: usize },
    #[error("section {0} does not exist")]
    UnknownSection(SectionKey),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to encode cbor: {0}")]
    Cbor(#[source] serde_cbor::Error),
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("persistence gateway unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("failed to parse session config: {0}")]
    ConfigParse(#[source] serde_json::Error),
    #[error("invalid value for {name}: {value}")]
    ConfigEnv { name: &'static str, value: String },
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
}
