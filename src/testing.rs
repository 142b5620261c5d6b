// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared test doubles: a route-table HTTP client and feed builders.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::DateTime;
use url::Url;

use crate::feed::Episode;
use crate::http::{ByteStream, HttpClient, HttpResponse};

#[derive(Debug, Clone)]
enum Route {
    Response {
        status: u16,
        location: Option<String>,
        body: Vec<u8>,
    },
    Unreachable,
}

/// HTTP client answering from a fixed route table and recording every
/// requested URL
#[derive(Clone, Default)]
pub struct MockHttpClient {
    routes: Arc<HashMap<String, Route>>,
    delays: Arc<HashMap<String, Duration>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn route(mut self, url: &str, route: Route) -> Self {
        Arc::make_mut(&mut self.routes).insert(url.to_string(), route);
        self
    }

    pub fn with_feed(self, url: &str, xml: &str) -> Self {
        self.with_media(url, xml.as_bytes())
    }

    pub fn with_media(self, url: &str, body: &[u8]) -> Self {
        self.with_status(url, 200, body)
    }

    pub fn with_status(self, url: &str, status: u16, body: &[u8]) -> Self {
        self.route(
            url,
            Route::Response {
                status,
                location: None,
                body: body.to_vec(),
            },
        )
    }

    pub fn with_redirect(self, url: &str, status: u16, location: Option<&str>) -> Self {
        self.route(
            url,
            Route::Response {
                status,
                location: location.map(String::from),
                body: Vec::new(),
            },
        )
    }

    pub fn with_unreachable(self, url: &str) -> Self {
        self.route(url, Route::Unreachable)
    }

    /// Delay every response for `url` by `delay`
    pub fn with_delay(mut self, url: &str, delay: Duration) -> Self {
        Arc::make_mut(&mut self.delays).insert(url.to_string(), delay);
        self
    }

    /// All URLs requested so far, in request order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests made for anything other than the given feed URLs
    pub fn media_requests(&self, feeds: &[&str]) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|url| !feeds.contains(&url.as_str()))
            .collect()
    }

    async fn lookup(&self, url: &str) -> Result<(u16, Option<String>, Vec<u8>), reqwest::Error> {
        self.requests.lock().unwrap().push(url.to_string());

        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }

        match self.routes.get(url) {
            Some(Route::Response {
                status,
                location,
                body,
            }) => Ok((*status, location.clone(), body.clone())),
            Some(Route::Unreachable) | None => Err(transport_error().await),
        }
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get_bytes(&self, url: &str) -> Result<Bytes, reqwest::Error> {
        let (status, _, body) = self.lookup(url).await?;
        if !(200..300).contains(&status) {
            return Err(transport_error().await);
        }
        Ok(Bytes::from(body))
    }

    async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        let (status, location, body) = self.lookup(url).await?;
        let len = body.len() as u64;

        let stream: ByteStream =
            Box::pin(futures::stream::once(async move { Ok(Bytes::from(body)) }));

        Ok(HttpResponse {
            status,
            location,
            content_length: Some(len),
            body: stream,
        })
    }
}

/// A genuine `reqwest::Error`, produced without touching the network
pub async fn transport_error() -> reqwest::Error {
    reqwest::Client::new()
        .get("not a valid url")
        .send()
        .await
        .unwrap_err()
}

/// Build an RSS document with one `audio/mpeg` item per `(title, guid, media_url)`
pub fn feed_xml(items: &[(&str, Option<&str>, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(title, guid, url)| {
            let guid = guid
                .map(|g| format!("<guid>{g}</guid>"))
                .unwrap_or_default();
            format!(
                r#"
    <item>
      <title>{title}</title>
      {guid}
      <pubDate>01 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="{url}" length="10" type="audio/mpeg"/>
    </item>"#
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test Podcast</title>
    <description>A test podcast</description>
    <link>https://example.com</link>{items}
  </channel>
</rss>"#
    )
}

pub fn make_episode(title: &str, guid: Option<&str>, url: &str) -> Episode {
    Episode {
        title: title.to_string(),
        guid: guid.map(String::from),
        published_at: DateTime::parse_from_rfc2822("Mon, 01 Jan 2024 12:00:00 +0000").unwrap(),
        media_url: Url::parse(url).unwrap(),
        mime_type: "audio/mpeg".to_string(),
        length: None,
    }
}
