// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use crate::episode::{destination_path, media_file_name, strip_query};
use crate::feed::Episode;

/// Plan for one podcast, indicating what needs to be downloaded
#[derive(Debug, Clone, Default)]
pub struct DownloadPlan {
    /// Episodes that need to be downloaded, in feed order
    pub to_download: Vec<Episode>,
    /// Episodes already recorded or already on disk
    pub already_present: Vec<Episode>,
    /// Episodes whose file name is taken by an earlier episode in `to_download`
    pub conflicting: Vec<Episode>,
}

/// The key used to remember that an episode was downloaded.
///
/// The feed's guid when there is one, otherwise the canonical file name of
/// the media URL. Feeds that give neither fall back to the media URL
/// without its query string.
pub fn episode_identifier(episode: &Episode) -> String {
    if let Some(guid) = &episode.guid {
        return guid.clone();
    }

    media_file_name(&episode.media_url).unwrap_or_else(|| strip_query(&episode.media_url))
}

/// Decide whether an episode still needs downloading.
///
/// False when its identifier was recorded by an earlier run, or when a
/// non-empty file already sits at its destination path. Either signal is
/// enough on its own, so losing the state file or the media file alone
/// never triggers a re-download.
pub fn should_download(
    episode: &Episode,
    already_downloaded: &BTreeSet<String>,
    destination_dir: &Path,
) -> bool {
    if already_downloaded.contains(&episode_identifier(episode)) {
        return false;
    }

    !destination_path(episode, destination_dir).is_some_and(|path| is_complete_file(&path))
}

/// Split a selection of episodes into those to fetch and those to skip.
///
/// At most one episode is planned per destination path; the first in feed
/// order wins and later ones land in `conflicting`.
pub fn create_download_plan(
    episodes: Vec<Episode>,
    already_downloaded: &BTreeSet<String>,
    destination_dir: &Path,
) -> DownloadPlan {
    let mut plan = DownloadPlan::default();
    let mut claimed = HashSet::new();

    for episode in episodes {
        if !should_download(&episode, already_downloaded, destination_dir) {
            plan.already_present.push(episode);
            continue;
        }

        match destination_path(&episode, destination_dir) {
            Some(path) if !claimed.insert(path.clone()) => plan.conflicting.push(episode),
            _ => plan.to_download.push(episode),
        }
    }

    plan
}

// Zero-length files are what an abandoned write leaves behind
fn is_complete_file(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.len() > 0)
}
