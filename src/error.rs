// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when loading or validating the settings file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine the home directory")]
    NoHomeDirectory,

    #[error("No settings file found (looked for {})", display_paths(.searched))]
    NotFound { searched: Vec<PathBuf> },

    #[error("Failed to read settings file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML settings in {path}: {source}")]
    TomlParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to parse JSON settings in {path}: {source}")]
    JsonParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Podcast ids must not be empty")]
    EmptyPodcastId,

    #[error("Podcast id '{0}' must be usable as a directory name")]
    InvalidPodcastId(String),

    #[error("Media directory must not be empty")]
    EmptyMediaDir,

    #[error("Podcast id '{0}' is configured more than once")]
    DuplicatePodcastId(String),

    #[error("Invalid feed URL '{url}' for podcast '{id}': {source}")]
    InvalidFeedUrl {
        id: String,
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Unknown podcast '{0}'")]
    UnknownPodcast(String),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors that can occur when fetching or parsing RSS feeds
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to fetch feed from {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to parse RSS feed: {0}")]
    ParseFailed(#[from] rss::Error),
}

/// Errors that can occur during episode downloads
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Cannot derive a file name from {url}")]
    NoFileName { url: String },

    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}: {body}")]
    HttpStatus { url: String, status: u16, body: String },

    #[error("Redirect {status} from {url} has no Location header")]
    MissingLocation { url: String, status: u16 },

    #[error("Invalid redirect target '{location}' from {url}: {source}")]
    InvalidLocation {
        url: String,
        location: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Too many redirects for {url}")]
    TooManyRedirects { url: String },

    #[error("Failed to create file {path}: {source}")]
    FileCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move {from} into place at {to}: {source}")]
    FinalizeFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Errors that can occur when persisting the download record or preparing
/// a podcast's media directory
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write state file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize download record: {0}")]
    SerializeFailed(#[from] serde_json::Error),
}
