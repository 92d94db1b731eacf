pub mod config;
pub mod error;
pub mod fs_store;
pub mod navigation;
pub mod persistence;
pub mod saver;
pub mod session;
pub mod store;
pub mod submission;

pub use config::SessionConfig;
pub use error::{LookupError, PersistenceError, SessionError};
pub use fs_store::VersionDirGateway;
pub use navigation::{Movement, Navigator, resume_point};
pub use persistence::{
    FlagMap, FlagSnapshot, LatestSnapshot, METADATA_KEYS, MemoryGateway, PersistedState,
    PersistenceGateway,
};
pub use saver::{Clock, ManualClock, SaveScheduler, SystemClock};
pub use session::{Session, StartKind, SubmitOutcome};
pub use store::{Applied, StateStore};
pub use submission::Submission;
