// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use bytes::Bytes;
use url::Url;

use crate::error::FeedError;
use crate::http::HttpClient;

use super::parse::{Episode, parse_feed};

/// Fetch raw feed bytes from a URL (without parsing)
pub async fn fetch_feed_bytes<C: HttpClient + ?Sized>(
    client: &C,
    url: &Url,
) -> Result<Bytes, FeedError> {
    client
        .get_bytes(url.as_str())
        .await
        .map_err(|e| FeedError::FetchFailed {
            url: url.to_string(),
            source: e,
        })
}

/// Fetch and parse a podcast feed from a URL
pub async fn fetch_feed<C: HttpClient + ?Sized>(
    client: &C,
    url: &Url,
) -> Result<Vec<Episode>, FeedError> {
    let bytes = fetch_feed_bytes(client, url).await?;
    let episodes = parse_feed(&bytes)?;
    tracing::debug!(%url, episodes = episodes.len(), "parsed feed");
    Ok(episodes)
}
