use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::workflows::scoring::{ApprovedRatings, ReportingPeriod, ScoredRecordSet};

/// Snapshot of the active period: scored records plus the ratings approved so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedPeriod {
    pub period: ReportingPeriod,
    /// Bumped on every ingest, submission and approval; never reused across periods.
    pub revision: u64,
    pub published_at: DateTime<Utc>,
    pub records: ScoredRecordSet,
    pub approved: ApprovedRatings,
    /// Highest submission sequence number handed out so far.
    #[serde(default)]
    pub submissions_issued: u64,
}

/// Storage abstraction so the workflow can be exercised without touching disk.
pub trait PeriodStore: Send + Sync {
    fn load(&self) -> Result<Option<PublishedPeriod>, StoreError>;
    /// Persists `snapshot` unless a newer revision has already been written.
    fn save(&self, snapshot: &PublishedPeriod) -> Result<(), StoreError>;
}

/// Error enumeration for snapshot persistence failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("snapshot file {path:?} could not be accessed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot could not be encoded or decoded: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("period store unavailable: {0}")]
    Unavailable(String),
}

/// Writes the snapshot as pretty JSON, replacing the file atomically.
#[derive(Debug)]
pub struct JsonFilePeriodStore {
    path: PathBuf,
    last_revision: Mutex<Option<u64>>,
}

impl JsonFilePeriodStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_revision: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl PeriodStore for JsonFilePeriodStore {
    fn load(&self) -> Result<Option<PublishedPeriod>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(self.io_error(error)),
        };
        let snapshot: PublishedPeriod = serde_json::from_slice(&bytes)?;

        let mut last = self.last_revision.lock().expect("store mutex poisoned");
        *last = Some(snapshot.revision);
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &PublishedPeriod) -> Result<(), StoreError> {
        let mut last = self.last_revision.lock().expect("store mutex poisoned");
        if matches!(*last, Some(written) if written >= snapshot.revision) {
            debug!(
                revision = snapshot.revision,
                "skipping stale period snapshot"
            );
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|error| self.io_error(error))?;
        }

        let encoded = serde_json::to_vec_pretty(snapshot)?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, encoded).map_err(|error| self.io_error(error))?;
        fs::rename(&staging, &self.path).map_err(|error| self.io_error(error))?;

        *last = Some(snapshot.revision);
        debug!(
            revision = snapshot.revision,
            period = %snapshot.period,
            path = %self.path.display(),
            "persisted period snapshot"
        );
        Ok(())
    }
}

/// Volatile store for tests and the demo command.
#[derive(Debug, Default)]
pub struct MemoryPeriodStore {
    snapshot: Mutex<Option<PublishedPeriod>>,
}

impl MemoryPeriodStore {
    pub fn with_snapshot(snapshot: PublishedPeriod) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
        }
    }

    pub fn current(&self) -> Option<PublishedPeriod> {
        self.snapshot.lock().expect("store mutex poisoned").clone()
    }
}

impl PeriodStore for MemoryPeriodStore {
    fn load(&self) -> Result<Option<PublishedPeriod>, StoreError> {
        Ok(self.current())
    }

    fn save(&self, snapshot: &PublishedPeriod) -> Result<(), StoreError> {
        let mut guard = self.snapshot.lock().expect("store mutex poisoned");
        if matches!(guard.as_ref(), Some(existing) if existing.revision >= snapshot.revision) {
            return Ok(());
        }
        *guard = Some(snapshot.clone());
        Ok(())
    }
}
