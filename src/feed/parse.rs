// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::borrow::Cow;

use chrono::{DateTime, FixedOffset};
use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use url::Url;

use crate::error::FeedError;

/// The only enclosure type we treat as an episode
pub const AUDIO_MPEG: &str = "audio/mpeg";

/// Represents a single podcast episode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Episode {
    pub title: String,
    /// Feed-provided stable identifier; `None` when absent or empty
    pub guid: Option<String>,
    pub published_at: DateTime<FixedOffset>,
    pub media_url: Url,
    pub mime_type: String,
    pub length: Option<u64>,
}

/// Parse RSS feed XML bytes into the feed's episodes, in document order.
///
/// Items without an `audio/mpeg` enclosure, with an unusable enclosure URL,
/// or without a parseable publication date are left out.
pub fn parse_feed(xml_bytes: &[u8]) -> Result<Vec<Episode>, FeedError> {
    let channel = rss::Channel::read_from(xml_bytes)?;
    let items = channel.items();

    let enclosures = match scan_audio_enclosures(xml_bytes) {
        Some(scanned) if scanned.len() == items.len() => scanned,
        _ => {
            tracing::debug!("enclosure scan does not line up with feed items, using parser enclosures");
            vec![None; items.len()]
        }
    };

    let episodes = items
        .iter()
        .zip(enclosures)
        .filter_map(|(item, enclosure)| {
            let enclosure = enclosure.or_else(|| parsed_audio_enclosure(item));
            let episode = parse_episode(item, enclosure);
            if episode.is_none() {
                tracing::debug!(
                    title = item.title().unwrap_or_default(),
                    "skipping feed item without usable audio enclosure or date"
                );
            }
            episode
        })
        .collect();

    Ok(episodes)
}

/// Enclosure attributes as declared in the feed
#[derive(Debug, Clone, Default)]
struct AudioEnclosure {
    url: String,
    mime_type: String,
    length: String,
}

/// First `audio/mpeg` enclosure of every `<item>`, in document order.
///
/// `rss` keeps only the last enclosure of an item, so the raw document is
/// walked a second time. `None` when the document cannot be read.
fn scan_audio_enclosures(xml_bytes: &[u8]) -> Option<Vec<Option<AudioEnclosure>>> {
    let mut reader = Reader::from_reader(xml_bytes);
    let mut items = Vec::new();
    let mut in_item = false;

    loop {
        match reader.read_event().ok()? {
            Event::Start(element) if !in_item && element.name().as_ref() == b"item" => {
                in_item = true;
                items.push(None);
            }
            Event::End(element) if element.name().as_ref() == b"item" => in_item = false,
            Event::Start(element) | Event::Empty(element)
                if in_item && element.name().as_ref() == b"enclosure" =>
            {
                let enclosure = read_enclosure(&element);
                if let Some(slot) = items.last_mut() {
                    if slot.is_none() && is_audio_mpeg(&enclosure.mime_type) {
                        *slot = Some(enclosure);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Some(items)
}

fn read_enclosure(element: &BytesStart<'_>) -> AudioEnclosure {
    let mut enclosure = AudioEnclosure::default();

    for attribute in element.attributes().flatten() {
        let Some(value) = attribute_value(&attribute) else {
            continue;
        };
        match attribute.key.as_ref() {
            b"url" => enclosure.url = value,
            b"type" => enclosure.mime_type = value,
            b"length" => enclosure.length = value,
            _ => {}
        }
    }

    enclosure
}

fn attribute_value(attribute: &Attribute<'_>) -> Option<String> {
    let raw = std::str::from_utf8(&attribute.value).ok()?;
    unescape(raw).ok().map(Cow::into_owned)
}

fn parsed_audio_enclosure(item: &rss::Item) -> Option<AudioEnclosure> {
    item.enclosure()
        .filter(|enclosure| is_audio_mpeg(enclosure.mime_type()))
        .map(|enclosure| AudioEnclosure {
            url: enclosure.url().to_string(),
            mime_type: enclosure.mime_type().to_string(),
            length: enclosure.length().to_string(),
        })
}

fn parse_episode(item: &rss::Item, enclosure: Option<AudioEnclosure>) -> Option<Episode> {
    let title = item
        .title()
        .map(String::from)
        .unwrap_or_else(|| "Untitled Episode".to_string());

    let enclosure = enclosure?;

    let media_url = Url::parse(enclosure.url.trim()).ok()?;

    let published_at = item.pub_date().and_then(parse_date)?;

    let guid = item
        .guid()
        .map(|g| g.value().trim().to_string())
        .filter(|g| !g.is_empty());

    Some(Episode {
        title,
        guid,
        published_at,
        media_url,
        mime_type: enclosure.mime_type,
        length: enclosure.length.trim().parse().ok(),
    })
}

/// Compare a declared MIME type against `audio/mpeg`, ignoring case and
/// parameters such as `; charset=...`
fn is_audio_mpeg(mime_type: &str) -> bool {
    mime_type
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(AUDIO_MPEG))
}

/// Parse an RSS publication date, tolerating formats that don't strictly
/// conform to RFC 2822
fn parse_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    let date_str = date_str.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(date_str) {
        return Some(dt);
    }

    let formats = [
        "%a, %d %b %Y %H:%M:%S %z",
        "%a, %d %b %Y %H:%M %z",
        "%d %b %Y %H:%M:%S %z",
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%d %H:%M:%S %z",
    ];

    formats
        .iter()
        .find_map(|format| DateTime::parse_from_str(date_str, format).ok())
        .or_else(|| DateTime::parse_from_rfc3339(date_str).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test Podcast</title>
    <description>A test podcast for unit testing</description>
    <link>https://example.com</link>
    <item>
      <title>Episode 2</title>
      <pubDate>Tue, 02 Jan 2024 12:00:00 +0000</pubDate>
      <guid>ep2-guid</guid>
      <enclosure url="https://example.com/ep2.mp3?source=rss" length="1234567" type="audio/mpeg"/>
    </item>
    <item>
      <title>Episode 1</title>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="https://example.com/ep1.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

    fn feed_with_items(items: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Test</title>
    <description>Test</description>
    {items}
  </channel>
</rss>"#
        )
    }

    #[test]
    fn parse_feed_extracts_episodes_in_document_order() {
        let episodes = parse_feed(SAMPLE_FEED.as_bytes()).unwrap();

        assert_eq!(episodes.len(), 2);
        assert_eq!(episodes[0].title, "Episode 2");
        assert_eq!(episodes[1].title, "Episode 1");
    }

    #[test]
    fn parse_feed_extracts_episode_fields() {
        let episodes = parse_feed(SAMPLE_FEED.as_bytes()).unwrap();

        let ep = &episodes[0];
        assert_eq!(ep.guid, Some("ep2-guid".to_string()));
        assert_eq!(ep.media_url.as_str(), "https://example.com/ep2.mp3?source=rss");
        assert_eq!(ep.mime_type, "audio/mpeg");
        assert_eq!(ep.length, Some(1234567));
        assert_eq!(
            ep.published_at,
            DateTime::parse_from_rfc2822("Tue, 02 Jan 2024 12:00:00 +0000").unwrap()
        );
    }

    #[test]
    fn parse_feed_treats_missing_guid_as_none() {
        let episodes = parse_feed(SAMPLE_FEED.as_bytes()).unwrap();
        assert_eq!(episodes[1].guid, None);
    }

    #[test]
    fn parse_feed_treats_empty_guid_as_none() {
        let xml = feed_with_items(
            r#"<item>
      <title>Blank guid</title>
      <guid>   </guid>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="https://example.com/a.mp3" type="audio/mpeg"/>
    </item>"#,
        );

        let episodes = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(episodes[0].guid, None);
    }

    #[test]
    fn parse_feed_keeps_only_audio_mpeg_enclosures() {
        let xml = feed_with_items(
            r#"<item>
      <title>Audio</title>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="https://example.com/audio.mp3" type="audio/mpeg"/>
    </item>
    <item>
      <title>Video</title>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="https://example.com/video.mp4" type="video/mp4"/>
    </item>"#,
        );

        let episodes = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].title, "Audio");
    }

    #[test]
    fn parse_feed_takes_audio_enclosure_followed_by_video() {
        let xml = feed_with_items(
            r#"<item>
      <title>Audio first</title>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="https://example.com/ep.mp3" length="42" type="audio/mpeg"/>
      <enclosure url="https://example.com/ep.mp4" type="video/mp4"/>
    </item>"#,
        );

        let episodes = parse_feed(xml.as_bytes()).unwrap();

        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].media_url.as_str(), "https://example.com/ep.mp3");
        assert_eq!(episodes[0].length, Some(42));
    }

    #[test]
    fn parse_feed_takes_audio_enclosure_preceded_by_video() {
        let xml = feed_with_items(
            r#"<item>
      <title>Video first</title>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="https://example.com/ep.mp4" type="video/mp4"/>
      <enclosure url="https://example.com/ep.mp3" type="audio/mpeg"/>
    </item>"#,
        );

        let episodes = parse_feed(xml.as_bytes()).unwrap();

        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].media_url.as_str(), "https://example.com/ep.mp3");
    }

    #[test]
    fn parse_feed_takes_first_of_several_audio_enclosures() {
        let xml = feed_with_items(
            r#"<item>
      <title>Two bitrates</title>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="https://example.com/high.mp3" type="audio/mpeg"/>
      <enclosure url="https://example.com/low.mp3" type="audio/mpeg"/>
    </item>
    <item>
      <title>Single</title>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="https://example.com/single.mp3?a=1&amp;b=2" type="audio/mpeg"/>
    </item>"#,
        );

        let episodes = parse_feed(xml.as_bytes()).unwrap();

        assert_eq!(episodes[0].media_url.as_str(), "https://example.com/high.mp3");
        assert_eq!(
            episodes[1].media_url.as_str(),
            "https://example.com/single.mp3?a=1&b=2"
        );
    }

    #[test]
    fn parse_feed_accepts_mime_type_case_and_parameters() {
        let xml = feed_with_items(
            r#"<item>
      <title>Shouty</title>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="https://example.com/a.mp3" type="Audio/MPEG; charset=binary"/>
    </item>"#,
        );

        assert_eq!(parse_feed(xml.as_bytes()).unwrap().len(), 1);
    }

    #[test]
    fn parse_feed_skips_items_without_enclosure() {
        let xml = feed_with_items(
            r#"<item>
      <title>No Audio</title>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
    </item>"#,
        );

        assert!(parse_feed(xml.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn parse_feed_skips_items_with_bad_or_missing_date() {
        let xml = feed_with_items(
            r#"<item>
      <title>Bad date</title>
      <pubDate>sometime last week</pubDate>
      <enclosure url="https://example.com/a.mp3" type="audio/mpeg"/>
    </item>
    <item>
      <title>No date</title>
      <enclosure url="https://example.com/b.mp3" type="audio/mpeg"/>
    </item>
    <item>
      <title>Good</title>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="https://example.com/c.mp3" type="audio/mpeg"/>
    </item>"#,
        );

        let episodes = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].title, "Good");
    }

    #[test]
    fn parse_feed_skips_items_with_relative_enclosure_url() {
        let xml = feed_with_items(
            r#"<item>
      <title>Relative</title>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="/media/a.mp3" type="audio/mpeg"/>
    </item>"#,
        );

        assert!(parse_feed(xml.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn parse_feed_rejects_malformed_xml() {
        let result = parse_feed(b"this is not xml at all");
        assert!(matches!(result, Err(FeedError::ParseFailed(_))));
    }

    #[test]
    fn parse_feed_rejects_document_without_channel() {
        let result = parse_feed(br#"<?xml version="1.0"?><html><body>Not a feed</body></html>"#);
        assert!(result.is_err());
    }

    #[test]
    fn parse_date_accepts_rfc2822() {
        assert!(parse_date("Mon, 01 Jan 2024 12:00:00 +0000").is_some());
        assert!(parse_date("Mon, 01 Jan 2024 12:00:00 GMT").is_some());
    }

    #[test]
    fn parse_date_accepts_relaxed_formats() {
        assert!(parse_date("2024-01-01T12:00:00+00:00").is_some());
        assert!(parse_date("2024-01-01 12:00:00 +0000").is_some());
        assert!(parse_date("  Mon, 01 Jan 2024 12:00:00 +0000  ").is_some());
    }

    #[test]
    fn parse_date_rejects_garbage() {
        assert!(parse_date("yesterday").is_none());
        assert!(parse_date("").is_none());
    }
}
