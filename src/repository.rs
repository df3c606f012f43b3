//! Persistence of sampler state as whole JSON documents.
//!
//! The background sampler is the only writer; it overwrites the document on
//! every tick. Writes go to a sibling temp file that is then renamed over the
//! target, so a reader sees either the previous document or the new one.

use serde::{de::DeserializeOwned, Serialize};
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, instrument, warn};

use crate::core::{MetricHistograms, ProcessState};

pub const PROCESS_STATE_FILE: &str = "processes.json";
pub const METRICS_STATE_FILE: &str = "metrics.json";

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("failed to serialize document for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A single JSON document on disk holding a `T`.
#[derive(Debug, Clone)]
pub struct JsonRepository<T> {
    path: PathBuf,
    _doc: PhantomData<fn() -> T>,
}

impl<T> JsonRepository<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _doc: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serializes `state` and replaces the document with it.
    #[instrument(skip(self, state), fields(path = %self.path.display()))]
    pub async fn save(&self, state: &T) -> Result<(), RepositoryError> {
        let bytes = serde_json::to_vec(state).map_err(|source| RepositoryError::Serialize {
            path: self.path.clone(),
            source,
        })?;

        let write_err = |source| RepositoryError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, &bytes).await.map_err(write_err)?;
        fs::rename(&tmp_path, &self.path).await.map_err(write_err)?;

        debug!(bytes = bytes.len(), "Saved document");
        Ok(())
    }

    /// Returns the last saved document.
    ///
    /// `None` means nothing was collected: the document does not exist yet or
    /// could not be read or parsed. Failures are logged, never returned.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn load(&self) -> Option<T> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No document yet");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read document; treating as empty");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(error = %e, "Corrupt document; treating as empty");
                None
            }
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// The two documents written by the background sampler.
#[derive(Debug, Clone)]
pub struct StateRepository {
    pub processes: JsonRepository<ProcessState>,
    pub metrics: JsonRepository<MetricHistograms>,
}

impl StateRepository {
    /// Places both documents under `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            processes: JsonRepository::new(dir.join(PROCESS_STATE_FILE)),
            metrics: JsonRepository::new(dir.join(METRICS_STATE_FILE)),
        }
    }
}
