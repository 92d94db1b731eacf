use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::PersistenceError;
use crate::persistence::{LatestSnapshot, PersistedState, PersistenceGateway};
use crate::submission::Submission;

const DRAFT_FILE: &str = "v0.json";

/// Gateway over a versions directory.
///
/// `v0.json` is the working draft; archived submissions are `v1.json`,
/// `v2.json` and so on.
#[derive(Debug, Clone)]
pub struct VersionDirGateway {
    dir: PathBuf,
}

impl VersionDirGateway {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| PersistenceError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn draft_path(&self) -> PathBuf {
        self.dir.join(DRAFT_FILE)
    }

    /// Archived version numbers in ascending order.
    pub fn archived_versions(&self) -> Result<Vec<u32>, PersistenceError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| self.io(&self.dir, source))?;
        let mut versions: Vec<u32> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| version_number(&entry.file_name().to_string_lossy()))
            .filter(|version| *version > 0)
            .collect();
        versions.sort_unstable();
        Ok(versions)
    }

    fn io(&self, path: &Path, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn remove_draft(&self) -> Result<(), PersistenceError> {
        let path = self.draft_path();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.io(&path, err)),
        }
    }
}

/// `v{n}.json` -> `n`
fn version_number(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix('v')?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

impl PersistenceGateway for VersionDirGateway {
    fn load_latest(&mut self) -> Result<LatestSnapshot, PersistenceError> {
        let path = self.draft_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(LatestSnapshot::missing()),
            Err(err) => return Err(self.io(&path, err)),
        };
        let data: PersistedState =
            serde_json::from_str(&raw).map_err(|source| PersistenceError::Decode {
                path: path.clone(),
                source,
            })?;
        let last_modified = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .ok()
            .map(DateTime::<Utc>::from);
        Ok(LatestSnapshot {
            exists: true,
            data: Some(data),
            version_file: Some(DRAFT_FILE.to_string()),
            last_modified,
        })
    }

    fn save_version(&mut self, state: &PersistedState) -> Result<(), PersistenceError> {
        let path = self.draft_path();
        let body = serde_json::to_string_pretty(state).map_err(PersistenceError::Encode)?;
        fs::write(&path, body).map_err(|source| self.io(&path, source))?;
        debug!(path = %path.display(), "draft written");
        Ok(())
    }

    fn reset(&mut self) -> Result<(), PersistenceError> {
        self.remove_draft()
    }

    fn archive(&mut self, submission: &Submission) -> Result<Option<u32>, PersistenceError> {
        let next = self.archived_versions()?.last().map_or(1, |last| last + 1);
        let path = self.dir.join(format!("v{next}.json"));
        let body = submission.to_json_pretty()?;
        fs::write(&path, body).map_err(|source| self.io(&path, source))?;
        self.remove_draft()?;
        debug!(path = %path.display(), version = next, "submission archived");
        Ok(Some(next))
    }
}
