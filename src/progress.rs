// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

/// Events emitted while fetching podcasts, for progress reporting
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Feed is being fetched from URL
    FetchingFeed { podcast_id: String, url: String },

    /// Feed has been parsed successfully
    FeedParsed {
        podcast_id: String,
        total_episodes: usize,
        /// Episodes within the requested count
        selected: usize,
        /// Of those, episodes that still need downloading
        to_download: usize,
    },

    /// Feed could not be fetched or parsed
    FeedFailed { podcast_id: String, error: String },

    /// Stale partial files were removed from the podcast directory
    PartialFilesCleanedUp { podcast_id: String, count: usize },

    /// A download is starting
    DownloadStarting {
        podcast_id: String,
        /// Identifies the download slot (0 to max_concurrent-1) within the podcast
        download_id: usize,
        episode_title: String,
        /// Expected content length in bytes, if known
        content_length: Option<u64>,
    },

    /// Download progress update
    DownloadProgress {
        podcast_id: String,
        download_id: usize,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// A download completed successfully
    DownloadCompleted {
        podcast_id: String,
        download_id: usize,
        episode_title: String,
        bytes_downloaded: u64,
    },

    /// A download failed
    DownloadFailed {
        podcast_id: String,
        download_id: usize,
        episode_title: String,
        error: String,
    },

    /// All episodes of a podcast have been processed
    PodcastCompleted {
        podcast_id: String,
        downloaded_count: usize,
        skipped_count: usize,
        failed_count: usize,
    },
}

/// Trait for reporting progress events.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics. Events from different podcasts interleave.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

/// Forwards events to `tracing`, for runs without an interactive terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl LogReporter {
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

impl ProgressReporter for LogReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::FetchingFeed { podcast_id, url } => {
                tracing::info!(podcast = %podcast_id, %url, "fetching feed");
            }
            ProgressEvent::FeedParsed {
                podcast_id,
                total_episodes,
                selected,
                to_download,
            } => {
                tracing::info!(
                    podcast = %podcast_id,
                    total_episodes,
                    selected,
                    to_download,
                    "feed parsed"
                );
            }
            ProgressEvent::FeedFailed { podcast_id, error } => {
                tracing::error!(podcast = %podcast_id, %error, "feed failed");
            }
            ProgressEvent::PartialFilesCleanedUp { podcast_id, count } => {
                tracing::info!(podcast = %podcast_id, count, "removed stale partial files");
            }
            ProgressEvent::DownloadStarting {
                podcast_id,
                episode_title,
                content_length,
                ..
            } => {
                tracing::info!(
                    podcast = %podcast_id,
                    episode = %episode_title,
                    ?content_length,
                    "download starting"
                );
            }
            ProgressEvent::DownloadProgress { .. } => {}
            ProgressEvent::DownloadCompleted {
                podcast_id,
                episode_title,
                bytes_downloaded,
                ..
            } => {
                tracing::info!(
                    podcast = %podcast_id,
                    episode = %episode_title,
                    bytes_downloaded,
                    "download completed"
                );
            }
            ProgressEvent::DownloadFailed {
                podcast_id,
                episode_title,
                error,
                ..
            } => {
                tracing::error!(
                    podcast = %podcast_id,
                    episode = %episode_title,
                    %error,
                    "download failed"
                );
            }
            ProgressEvent::PodcastCompleted {
                podcast_id,
                downloaded_count,
                skipped_count,
                failed_count,
            } => {
                tracing::info!(
                    podcast = %podcast_id,
                    downloaded_count,
                    skipped_count,
                    failed_count,
                    "podcast completed"
                );
            }
        }
    }
}

/// Records every event, for assertions in tests
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: std::sync::Mutex<Vec<ProgressEvent>>,
}

#[cfg(test)]
impl RecordingReporter {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl ProgressReporter for RecordingReporter {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}
