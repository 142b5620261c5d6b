// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::error::DownloadError;
use crate::feed::Episode;
use crate::http::{ByteStream, HttpClient, HttpResponse};
use crate::progress::{ProgressEvent, SharedProgressReporter};

use super::filename::{destination_path, partial_path};

/// How many redirect responses a single download may follow
pub const MAX_REDIRECTS: usize = 1;

/// Error bodies are cut to this many bytes
const MAX_ERROR_BODY: usize = 512;

/// Context for tracking a download in concurrent scenarios
#[derive(Debug, Clone)]
pub struct DownloadContext {
    pub podcast_id: String,
    /// Slot ID (0 to max_concurrent-1) for progress bar management
    pub download_id: usize,
}

/// Result of a successful download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// Final path of the media file
    pub path: PathBuf,
    /// Number of bytes written
    pub bytes: u64,
}

/// Download an episode into `destination_dir`.
///
/// The file is named after the episode's original media URL, even when the
/// server redirects elsewhere. The body is streamed into a `.partial`
/// sibling and only renamed into place once fully written, so the final
/// path never holds a truncated file.
pub async fn download_episode<C: HttpClient + ?Sized>(
    client: &C,
    episode: &Episode,
    destination_dir: &Path,
    context: &DownloadContext,
    reporter: &SharedProgressReporter,
) -> Result<DownloadOutcome, DownloadError> {
    let destination =
        destination_path(episode, destination_dir).ok_or_else(|| DownloadError::NoFileName {
            url: episode.media_url.to_string(),
        })?;

    let (url, response) = get_following_redirect(client, &episode.media_url).await?;

    if !response.is_success() {
        let status = response.status;
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status,
            body: read_error_body(response.body).await,
        });
    }

    reporter.report(ProgressEvent::DownloadStarting {
        podcast_id: context.podcast_id.clone(),
        download_id: context.download_id,
        episode_title: episode.title.clone(),
        content_length: response.content_length,
    });

    let partial = partial_path(&destination);
    let bytes_downloaded = match write_body(&url, response, &partial, context, reporter).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
    };

    if let Err(e) = tokio::fs::rename(&partial, &destination).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(DownloadError::FinalizeFailed {
            from: partial,
            to: destination,
            source: e,
        });
    }

    reporter.report(ProgressEvent::DownloadCompleted {
        podcast_id: context.podcast_id.clone(),
        download_id: context.download_id,
        episode_title: episode.title.clone(),
        bytes_downloaded,
    });

    Ok(DownloadOutcome {
        path: destination,
        bytes: bytes_downloaded,
    })
}

/// Issue a GET, hopping at most `MAX_REDIRECTS` times.
///
/// Returns the URL that finally answered together with its response.
async fn get_following_redirect<C: HttpClient + ?Sized>(
    client: &C,
    original: &Url,
) -> Result<(Url, HttpResponse), DownloadError> {
    let mut current = original.clone();
    let mut hops = 0;

    loop {
        let response = client
            .get_stream(current.as_str())
            .await
            .map_err(|e| DownloadError::HttpFailed {
                url: current.to_string(),
                source: e,
            })?;

        if !response.is_redirect() {
            return Ok((current, response));
        }

        if hops == MAX_REDIRECTS {
            return Err(DownloadError::TooManyRedirects {
                url: original.to_string(),
            });
        }

        let location =
            response
                .location
                .as_deref()
                .ok_or_else(|| DownloadError::MissingLocation {
                    url: current.to_string(),
                    status: response.status,
                })?;

        // Location may be relative to the URL that issued it
        let next = current
            .join(location)
            .map_err(|e| DownloadError::InvalidLocation {
                url: current.to_string(),
                location: location.to_string(),
                source: e,
            })?;

        tracing::debug!(from = %current, to = %next, status = response.status, "following redirect");
        current = next;
        hops += 1;
    }
}

async fn write_body(
    url: &Url,
    response: HttpResponse,
    path: &Path,
    context: &DownloadContext,
    reporter: &SharedProgressReporter,
) -> Result<u64, DownloadError> {
    // Truncates whatever an abandoned earlier attempt left behind
    let mut file = File::create(path)
        .await
        .map_err(|e| DownloadError::FileCreateFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    let mut bytes_downloaded: u64 = 0;
    let mut stream = response.body;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        bytes_downloaded += chunk.len() as u64;

        reporter.report(ProgressEvent::DownloadProgress {
            podcast_id: context.podcast_id.clone(),
            download_id: context.download_id,
            bytes_downloaded,
            total_bytes: response.content_length,
        });
    }

    file.flush()
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    file.sync_all()
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(bytes_downloaded)
}

async fn read_error_body(mut body: ByteStream) -> String {
    let mut collected = Vec::new();

    while let Some(Ok(chunk)) = body.next().await {
        collected.extend_from_slice(&chunk);
        if collected.len() >= MAX_ERROR_BODY {
            break;
        }
    }

    collected.truncate(MAX_ERROR_BODY);
    String::from_utf8_lossy(&collected).trim().to_string()
}
