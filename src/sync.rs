// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::task::JoinSet;

use crate::config::PodcastConfig;
use crate::episode::{DownloadContext, PARTIAL_SUFFIX, download_episode, media_file_name};
use crate::error::FeedError;
use crate::feed::{Episode, fetch_feed};
use crate::http::HttpClient;
use crate::plan::{create_download_plan, episode_identifier};
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Options for fetching podcasts
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// How many of the newest feed entries to consider per podcast
    pub max_count: usize,
    /// Maximum number of concurrent downloads per podcast
    pub max_concurrent: usize,
    /// Upper bound for the whole run (None = unbounded)
    pub timeout: Option<Duration>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_count: 3,
            max_concurrent: 3,
            timeout: None,
        }
    }
}

/// An episode that was downloaded in this run
#[derive(Debug, Clone)]
pub struct DownloadedEpisode {
    pub episode: Episode,
    /// Key merged into the download record
    pub identifier: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// An episode whose download failed in this run
#[derive(Debug, Clone)]
pub struct FailedEpisode {
    pub episode: Episode,
    pub reason: String,
}

/// Outcome of processing one podcast
#[derive(Debug, Clone)]
pub struct RunResult {
    pub id: String,
    pub downloaded: Vec<DownloadedEpisode>,
    /// Selected episodes that were already recorded or on disk
    pub skipped: Vec<Episode>,
    pub failed: Vec<FailedEpisode>,
    /// Set when the podcast could not be processed at all
    pub feed_error: Option<String>,
}

impl RunResult {
    fn empty(id: &str) -> Self {
        Self {
            id: id.to_string(),
            downloaded: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            feed_error: None,
        }
    }

    /// A result for a podcast that never got past its feed
    pub fn feed_failed(id: &str, reason: impl Into<String>) -> Self {
        Self {
            feed_error: Some(reason.into()),
            ..Self::empty(id)
        }
    }

    /// Identifiers of the episodes downloaded in this run
    pub fn new_identifiers(&self) -> impl Iterator<Item = String> + '_ {
        self.downloaded.iter().map(|d| d.identifier.clone())
    }

    /// True when the feed was processed and no download failed
    pub fn is_success(&self) -> bool {
        self.feed_error.is_none() && self.failed.is_empty()
    }
}

/// Fetch one podcast's feed and download its newest episodes that aren't
/// there yet.
///
/// Never fails as a whole: a broken feed ends up in `feed_error`, a broken
/// episode in `failed`, and everything else keeps going.
pub async fn process_podcast<C: HttpClient + Clone + 'static>(
    client: &C,
    config: &PodcastConfig,
    media_dir: &Path,
    already_downloaded: &BTreeSet<String>,
    options: &FetchOptions,
    reporter: SharedProgressReporter,
) -> RunResult {
    let podcast_id = config.id.as_str();
    let podcast_dir = media_dir.join(podcast_id);

    if let Err(e) = tokio::fs::create_dir_all(&podcast_dir).await {
        let error = format!("Failed to create directory {}: {e}", podcast_dir.display());
        reporter.report(ProgressEvent::FeedFailed {
            podcast_id: podcast_id.to_string(),
            error: error.clone(),
        });
        return RunResult::feed_failed(podcast_id, error);
    }

    let cleaned = clean_partial_files(&podcast_dir);
    if cleaned > 0 {
        reporter.report(ProgressEvent::PartialFilesCleanedUp {
            podcast_id: podcast_id.to_string(),
            count: cleaned,
        });
    }

    reporter.report(ProgressEvent::FetchingFeed {
        podcast_id: podcast_id.to_string(),
        url: config.feed_url.to_string(),
    });

    let episodes = match fetch_feed(client, &config.feed_url).await {
        Ok(episodes) => episodes,
        Err(e) => {
            tracing::warn!(podcast = podcast_id, error = %e, "feed failed");
            reporter.report(ProgressEvent::FeedFailed {
                podcast_id: podcast_id.to_string(),
                error: e.to_string(),
            });
            return RunResult::feed_failed(podcast_id, e.to_string());
        }
    };

    let total_episodes = episodes.len();
    let selected: Vec<Episode> = episodes.into_iter().take(options.max_count).collect();
    let selected_count = selected.len();
    let plan = create_download_plan(selected, already_downloaded, &podcast_dir);

    reporter.report(ProgressEvent::FeedParsed {
        podcast_id: podcast_id.to_string(),
        total_episodes,
        selected: selected_count,
        to_download: plan.to_download.len(),
    });

    let mut result = RunResult::empty(podcast_id);
    result.skipped = plan.already_present;
    let conflicting = plan.conflicting;

    let outcomes = download_all(
        client,
        podcast_id,
        &podcast_dir,
        plan.to_download,
        options,
        &reporter,
    )
    .await;

    for (episode, outcome) in outcomes {
        match outcome {
            Ok((path, bytes)) => result.downloaded.push(DownloadedEpisode {
                identifier: episode_identifier(&episode),
                episode,
                path,
                bytes,
            }),
            Err(reason) => result.failed.push(FailedEpisode { episode, reason }),
        }
    }

    for episode in conflicting {
        let name = media_file_name(&episode.media_url).unwrap_or_default();
        tracing::warn!(
            podcast = podcast_id,
            episode = %episode.title,
            file = %name,
            "file name already taken by a newer episode"
        );
        result.failed.push(FailedEpisode {
            reason: format!("File name {name} is already used by a newer episode"),
            episode,
        });
    }

    tracing::info!(
        podcast = podcast_id,
        downloaded = result.downloaded.len(),
        skipped = result.skipped.len(),
        failed = result.failed.len(),
        "podcast processed"
    );

    reporter.report(ProgressEvent::PodcastCompleted {
        podcast_id: podcast_id.to_string(),
        downloaded_count: result.downloaded.len(),
        skipped_count: result.skipped.len(),
        failed_count: result.failed.len(),
    });

    result
}

type EpisodeOutcome = Result<(PathBuf, u64), String>;

/// Download episodes in parallel, returning outcomes in the given order
async fn download_all<C: HttpClient + Clone + 'static>(
    client: &C,
    podcast_id: &str,
    podcast_dir: &Path,
    to_download: Vec<Episode>,
    options: &FetchOptions,
    reporter: &SharedProgressReporter,
) -> Vec<(Episode, EpisodeOutcome)> {
    if to_download.is_empty() {
        return Vec::new();
    }

    // The slot pool limits concurrency AND provides stable slot IDs
    let max_concurrent = options.max_concurrent.max(1);
    let (slot_tx, mut slot_rx) = tokio::sync::mpsc::channel(max_concurrent);
    for slot in 0..max_concurrent {
        let _ = slot_tx.try_send(slot);
    }

    let mut tasks = JoinSet::new();
    let mut task_index = HashMap::new();
    let mut outcomes: Vec<Option<EpisodeOutcome>> = vec![None; to_download.len()];

    for (index, episode) in to_download.iter().cloned().enumerate() {
        // Acquire a slot BEFORE spawning so episodes start in feed order
        let Some(download_id) = slot_rx.recv().await else {
            break;
        };

        let slot_tx = slot_tx.clone();
        let client = client.clone();
        let podcast_dir = podcast_dir.to_path_buf();
        let reporter = reporter.clone();
        let context = DownloadContext {
            podcast_id: podcast_id.to_string(),
            download_id,
        };

        let handle = tasks.spawn(async move {
            let result =
                download_episode(&client, &episode, &podcast_dir, &context, &reporter).await;

            let outcome = match result {
                Ok(downloaded) => Ok((downloaded.path, downloaded.bytes)),
                Err(e) => {
                    tracing::warn!(
                        podcast = %context.podcast_id,
                        episode = %episode.title,
                        error = %e,
                        "download failed"
                    );
                    reporter.report(ProgressEvent::DownloadFailed {
                        podcast_id: context.podcast_id.clone(),
                        download_id,
                        episode_title: episode.title.clone(),
                        error: e.to_string(),
                    });
                    Err(e.to_string())
                }
            };

            // Return slot to the pool when done
            let _ = slot_tx.send(download_id).await;

            (index, outcome)
        });
        task_index.insert(handle.id(), index);
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => outcomes[index] = Some(outcome),
            Err(e) => {
                if let Some(&index) = task_index.get(&e.id()) {
                    outcomes[index] = Some(Err(format!("Download task failed: {e}")));
                }
            }
        }
    }

    to_download
        .into_iter()
        .zip(outcomes)
        .map(|(episode, outcome)| {
            let outcome =
                outcome.unwrap_or_else(|| Err("Download was never started".to_string()));
            (episode, outcome)
        })
        .collect()
}

/// Remove `.partial` files left behind by interrupted downloads
fn clean_partial_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };

    entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(PARTIAL_SUFFIX))
        })
        .filter(|path| std::fs::remove_file(path).is_ok())
        .count()
}

/// Fetch a podcast's feed and return its first `count` episodes.
///
/// Read-only: nothing is downloaded and no state is touched.
pub async fn list_episodes<C: HttpClient + ?Sized>(
    client: &C,
    config: &PodcastConfig,
    count: usize,
) -> Result<Vec<Episode>, FeedError> {
    let mut episodes = fetch_feed(client, &config.feed_url).await?;
    episodes.truncate(count);
    Ok(episodes)
}
