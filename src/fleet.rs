// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::config::PodcastConfig;
use crate::error::StateError;
use crate::feed::Episode;
use crate::http::HttpClient;
use crate::progress::SharedProgressReporter;
use crate::state::{DownloadRecord, StateStore};
use crate::sync::{FetchOptions, RunResult, list_episodes, process_podcast};

/// Outcome of a `download` run across all selected podcasts
#[derive(Debug)]
pub struct FleetOutcome {
    /// One result per podcast, in configuration order
    pub results: Vec<RunResult>,
    /// The merged record as it was handed to the state store
    pub record: DownloadRecord,
    /// Set when the merged record could not be persisted
    pub save_error: Option<StateError>,
    /// Whether the run hit its deadline before every podcast finished
    pub timed_out: bool,
}

impl FleetOutcome {
    pub fn downloaded_count(&self) -> usize {
        self.results.iter().map(|r| r.downloaded.len()).sum()
    }

    pub fn skipped_count(&self) -> usize {
        self.results.iter().map(|r| r.skipped.len()).sum()
    }

    pub fn failed_count(&self) -> usize {
        self.results
            .iter()
            .map(|r| r.failed.len() + usize::from(r.feed_error.is_some()))
            .sum()
    }
}

/// Episodes listed for one podcast by the `show` operation
#[derive(Debug, Clone)]
pub struct PodcastListing {
    pub id: String,
    pub episodes: Result<Vec<Episode>, String>,
}

/// Download new episodes for every podcast and record them.
///
/// Podcasts run concurrently and independently. The download record is
/// loaded once up front and only written after every podcast has
/// finished; a failed save is reported in the outcome and does not undo
/// any download.
pub async fn run_fleet<C: HttpClient + Clone + 'static>(
    client: &C,
    store: &StateStore,
    configs: &[PodcastConfig],
    media_dir: &Path,
    options: &FetchOptions,
    reporter: SharedProgressReporter,
) -> FleetOutcome {
    let mut record = store.load();

    let (results, timed_out) =
        run_podcasts(client, configs, media_dir, &record, options, reporter).await;

    for result in &results {
        let added = record.merge(&result.id, result.new_identifiers());
        if added > 0 {
            tracing::debug!(podcast = %result.id, added, "recording downloads");
        }
    }

    let save_error = store.save(&record).err();
    if let Some(e) = &save_error {
        tracing::warn!(error = %e, "downloads finished but state could not be saved");
    }

    FleetOutcome {
        results,
        record,
        save_error,
        timed_out,
    }
}

async fn run_podcasts<C: HttpClient + Clone + 'static>(
    client: &C,
    configs: &[PodcastConfig],
    media_dir: &Path,
    record: &DownloadRecord,
    options: &FetchOptions,
    reporter: SharedProgressReporter,
) -> (Vec<RunResult>, bool) {
    let deadline = options.timeout.map(|timeout| Instant::now() + timeout);

    let mut tasks = JoinSet::new();
    let mut task_index = HashMap::new();
    let mut results: Vec<Option<RunResult>> = vec![None; configs.len()];
    let mut timed_out = false;

    for (index, config) in configs.iter().enumerate() {
        let already_downloaded = record.downloaded(&config.id);
        let client = client.clone();
        let config = config.clone();
        let media_dir = media_dir.to_path_buf();
        let options = options.clone();
        let reporter = reporter.clone();

        let handle = tasks.spawn(async move {
            let result = process_podcast(
                &client,
                &config,
                &media_dir,
                &already_downloaded,
                &options,
                reporter,
            )
            .await;
            (index, result)
        });
        task_index.insert(handle.id(), index);
    }

    loop {
        let next = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(next) => next,
                Err(_) => {
                    tracing::warn!(
                        unfinished = tasks.len(),
                        "run timed out, abandoning unfinished podcasts"
                    );
                    tasks.abort_all();
                    timed_out = true;
                    break;
                }
            },
            None => tasks.join_next().await,
        };

        let Some(joined) = next else {
            break;
        };

        match joined {
            Ok((index, result)) => results[index] = Some(result),
            Err(e) => {
                if let Some(&index) = task_index.get(&e.id()) {
                    tracing::error!(podcast = %configs[index].id, error = %e, "podcast task failed");
                    results[index] = Some(RunResult::feed_failed(
                        &configs[index].id,
                        format!("Podcast task failed: {e}"),
                    ));
                }
            }
        }
    }

    let results = configs
        .iter()
        .zip(results)
        .map(|(config, result)| {
            result.unwrap_or_else(|| RunResult::feed_failed(&config.id, "Timed out"))
        })
        .collect();

    (results, timed_out)
}

/// List the first `count` episodes of every podcast, concurrently.
///
/// Each feed gets `timeout` on its own; a slow feed is listed as
/// "Timed out" without holding back the others. Read-only: never
/// downloads and never touches the state store.
pub async fn list_fleet<C: HttpClient + ?Sized>(
    client: &C,
    configs: &[PodcastConfig],
    count: usize,
    timeout: Duration,
) -> Vec<PodcastListing> {
    let listings = configs.iter().map(|config| async move {
        let episodes = match tokio::time::timeout(timeout, list_episodes(client, config, count))
            .await
        {
            Ok(listed) => listed.map_err(|e| e.to_string()),
            Err(_) => {
                tracing::warn!(podcast = %config.id, "listing timed out");
                Err("Timed out".to_string())
            }
        };
        PodcastListing {
            id: config.id.clone(),
            episodes,
        }
    });

    futures::future::join_all(listings).await
}
