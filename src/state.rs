// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// Name of the state file inside the home directory
pub const STATE_FILE_NAME: &str = ".podcasts-downloaded.json";

/// Which episode identifiers have been downloaded, per podcast id.
///
/// Only ever grows: merging is a set union.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadRecord {
    podcasts: BTreeMap<String, BTreeSet<String>>,
}

impl DownloadRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifiers recorded for a podcast (empty for unknown podcasts)
    pub fn downloaded(&self, podcast_id: &str) -> BTreeSet<String> {
        self.podcasts.get(podcast_id).cloned().unwrap_or_default()
    }

    pub fn contains(&self, podcast_id: &str, identifier: &str) -> bool {
        self.podcasts
            .get(podcast_id)
            .is_some_and(|ids| ids.contains(identifier))
    }

    /// Add identifiers for a podcast, returning how many were new
    pub fn merge<I>(&mut self, podcast_id: &str, identifiers: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut identifiers = identifiers.into_iter().peekable();
        if identifiers.peek().is_none() {
            return 0;
        }

        let entry = self.podcasts.entry(podcast_id.to_string()).or_default();
        identifiers.filter(|id| entry.insert(id.clone())).count()
    }

    /// Podcast ids with at least one recorded identifier, sorted
    pub fn podcast_ids(&self) -> impl Iterator<Item = &str> {
        self.podcasts.keys().map(String::as_str)
    }

    /// Total number of recorded identifiers across podcasts
    pub fn len(&self) -> usize {
        self.podcasts.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owns the on-disk download record
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.podcasts-downloaded.json`, if the home directory is known
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(STATE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record.
    ///
    /// A missing or unreadable file yields an empty record; it never blocks
    /// downloading.
    pub fn load(&self) -> DownloadRecord {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no state file yet");
                return DownloadRecord::new();
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "cannot read state file, starting from empty state"
                );
                return DownloadRecord::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "cannot parse state file, starting from empty state"
                );
                DownloadRecord::new()
            }
        }
    }

    /// Persist the record, replacing the previous file atomically
    pub fn save(&self, record: &DownloadRecord) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StateError::CreateDirectoryFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut json = serde_json::to_string_pretty(record)?;
        json.push('\n');

        let tmp = self.temp_path();
        let write = std::fs::write(&tmp, json).and_then(|()| std::fs::rename(&tmp, &self.path));
        if let Err(e) = write {
            let _ = std::fs::remove_file(&tmp);
            return Err(StateError::WriteFailed {
                path: self.path.clone(),
                source: e,
            });
        }

        tracing::debug!(
            path = %self.path.display(),
            identifiers = record.len(),
            "saved state"
        );
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}
