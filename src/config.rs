// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;

/// Settings file names looked up in the home directory, in order
pub const SETTINGS_FILE_NAMES: [&str; 2] = [".podcasts.toml", ".podcasts.json"];

/// One configured podcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodcastConfig {
    pub id: String,
    pub feed_url: Url,
}

/// Validated settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub media_dir: PathBuf,
    pub podcasts: Vec<PodcastConfig>,
}

#[derive(Debug, Deserialize)]
struct RawSettings {
    config: RawConfig,
    #[serde(default)]
    podcasts: RawPodcasts,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(alias = "mediaDir")]
    media_dir: String,
}

/// Podcasts as either `[{ id, url }]` or an `id = url` table
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPodcasts {
    List(Vec<RawPodcast>),
    Table(BTreeMap<String, String>),
}

impl Default for RawPodcasts {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
struct RawPodcast {
    id: String,
    #[serde(alias = "feed_url", alias = "feedURL")]
    url: String,
}

impl Settings {
    /// Settings file locations checked by [`Settings::discover`]
    pub fn default_candidates() -> Result<Vec<PathBuf>, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDirectory)?;
        Ok(SETTINGS_FILE_NAMES
            .iter()
            .map(|name| home.join(name))
            .collect())
    }

    /// Load the first settings file that exists in the home directory
    pub fn discover() -> Result<Self, ConfigError> {
        let candidates = Self::default_candidates()?;
        match candidates.iter().find(|path| path.is_file()) {
            Some(path) => Self::load(path),
            None => Err(ConfigError::NotFound {
                searched: candidates,
            }),
        }
    }

    /// Load a settings file; `.json` files are parsed as JSON, anything
    /// else as TOML
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let raw: RawSettings = if is_json {
            serde_json::from_str(&content).map_err(|e| ConfigError::JsonParseFailed {
                path: path.to_path_buf(),
                source: e,
            })?
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::TomlParseFailed {
                path: path.to_path_buf(),
                source: e,
            })?
        };

        let settings = Self::validate(raw, dirs::home_dir().as_deref())?;
        tracing::debug!(
            path = %path.display(),
            podcasts = settings.podcasts.len(),
            "loaded settings"
        );
        Ok(settings)
    }

    fn validate(raw: RawSettings, home: Option<&Path>) -> Result<Self, ConfigError> {
        let media_dir = raw.config.media_dir.trim();
        if media_dir.is_empty() {
            return Err(ConfigError::EmptyMediaDir);
        }

        let entries: Vec<(String, String)> = match raw.podcasts {
            RawPodcasts::List(list) => list.into_iter().map(|p| (p.id, p.url)).collect(),
            RawPodcasts::Table(table) => table.into_iter().collect(),
        };

        let mut seen = HashSet::new();
        let mut podcasts = Vec::with_capacity(entries.len());

        for (id, url) in entries {
            let id = id.trim().to_string();
            if id.is_empty() {
                return Err(ConfigError::EmptyPodcastId);
            }
            if !is_plain_dir_name(&id) {
                return Err(ConfigError::InvalidPodcastId(id));
            }
            if !seen.insert(id.clone()) {
                return Err(ConfigError::DuplicatePodcastId(id));
            }

            let feed_url = Url::parse(url.trim()).map_err(|e| ConfigError::InvalidFeedUrl {
                id: id.clone(),
                url: url.clone(),
                source: e,
            })?;

            podcasts.push(PodcastConfig { id, feed_url });
        }

        Ok(Self {
            media_dir: expand_home(media_dir, home),
            podcasts,
        })
    }

    /// The podcasts to process: all of them, or only the one named by `filter`
    pub fn select(&self, filter: Option<&str>) -> Result<Vec<PodcastConfig>, ConfigError> {
        match filter {
            None => Ok(self.podcasts.clone()),
            Some(id) => self
                .podcasts
                .iter()
                .find(|podcast| podcast.id == id)
                .map(|podcast| vec![podcast.clone()])
                .ok_or_else(|| ConfigError::UnknownPodcast(id.to_string())),
        }
    }
}

fn is_plain_dir_name(id: &str) -> bool {
    id != "." && id != ".." && !id.contains(['/', '\\'])
}

fn expand_home(path: &str, home: Option<&Path>) -> PathBuf {
    match (path, home) {
        ("~", Some(home)) => home.to_path_buf(),
        (p, Some(home)) if p.starts_with("~/") => home.join(&p[2..]),
        (p, _) => PathBuf::from(p),
    }
}
