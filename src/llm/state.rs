//! Last-known-good provider/model selection, kept on disk across restarts.

use crate::error::StateError;
use crate::llm::clock::{Clock, SystemClock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File name used under the data directory when no path is configured.
pub const STATE_FILE_NAME: &str = "last_selection.json";

/// The single record stored in the state file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSelection {
    pub provider: String,
    pub model_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Reads and atomically rewrites the selection file.
#[derive(Clone)]
pub struct StateStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Stamp selections with `clock` instead of the wall clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the state file with a new selection.
    ///
    /// The record is written to a temporary file in the same directory and
    /// renamed over the target, so readers see either the old or the new
    /// record and never a partial one.
    pub fn update_state(
        &self,
        provider: &str,
        model_id: &str,
    ) -> Result<PersistedSelection, StateError> {
        let selection = PersistedSelection {
            provider: provider.to_string(),
            model_id: model_id.to_string(),
            timestamp: self.clock.now(),
        };
        let json = serde_json::to_vec_pretty(&selection)?;

        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|source| self.write_error(source))?;

        let mut temp =
            tempfile::NamedTempFile::new_in(parent).map_err(|source| self.write_error(source))?;
        temp.write_all(&json)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|source| self.write_error(source))?;
        temp.persist(&self.path)
            .map_err(|error| self.write_error(error.error))?;

        tracing::debug!(
            provider = %selection.provider,
            model = %selection.model_id,
            path = %self.path.display(),
            "persisted selection"
        );
        Ok(selection)
    }

    /// Read the stored selection. Missing or unreadable files yield `None`.
    pub fn load_state(&self) -> Option<PersistedSelection> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return None,
            Err(error) => {
                tracing::warn!(path = %self.path.display(), %error, "failed to read state file");
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(selection) => Some(selection),
            Err(error) => {
                tracing::warn!(
                    path = %self.path.display(),
                    %error,
                    "state file is malformed, starting from defaults"
                );
                None
            }
        }
    }

    fn write_error(&self, source: std::io::Error) -> StateError {
        StateError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
