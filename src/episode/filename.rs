// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use url::Url;

use crate::feed::Episode;

/// Suffix for files that are still being written
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Canonicalize a media URL into a local file name.
///
/// Uses the last non-empty path segment; query string and fragment never
/// take part. The segment is percent-decoded and sanitized so it is safe
/// to use as a single path component. Returns `None` when the URL has no
/// usable path segment.
pub fn media_file_name(url: &Url) -> Option<String> {
    let segment = url
        .path_segments()?
        .rev()
        .find(|segment| !segment.is_empty())?;

    let decoded = percent_decode_str(segment).decode_utf8_lossy();
    let sanitized = sanitize_filename::sanitize(decoded.trim());

    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        None
    } else {
        Some(sanitized)
    }
}

/// The media URL with query string and fragment removed
pub fn strip_query(url: &Url) -> String {
    let mut canonical = url.clone();
    canonical.set_query(None);
    canonical.set_fragment(None);
    canonical.to_string()
}

/// Destination path of an episode inside a podcast's directory
pub fn destination_path(episode: &Episode, destination_dir: &Path) -> Option<PathBuf> {
    media_file_name(&episode.media_url).map(|name| destination_dir.join(name))
}

/// Sibling path the download is streamed into before being renamed
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::make_episode;

    fn name(url: &str) -> Option<String> {
        media_file_name(&Url::parse(url).unwrap())
    }

    #[test]
    fn uses_last_path_segment() {
        assert_eq!(name("https://example.com/a/b/ep1.mp3"), Some("ep1.mp3".into()));
    }

    #[test]
    fn ignores_query_and_fragment() {
        assert_eq!(
            name("https://example.com/ep1.mp3?token=abc&x=1#t=30"),
            Some("ep1.mp3".into())
        );
    }

    #[test]
    fn skips_trailing_slash() {
        assert_eq!(name("https://example.com/shows/ep1/"), Some("ep1".into()));
    }

    #[test]
    fn returns_none_without_path() {
        assert_eq!(name("https://example.com"), None);
        assert_eq!(name("https://example.com/"), None);
    }

    #[test]
    fn decodes_percent_escapes() {
        assert_eq!(
            name("https://example.com/my%20episode.mp3"),
            Some("my episode.mp3".into())
        );
    }

    #[test]
    fn keeps_malformed_escapes() {
        assert_eq!(name("https://example.com/100%25%zz.mp3"), Some("100%%zz.mp3".into()));
    }

    #[test]
    fn sanitizes_path_separators() {
        let result = name("https://example.com/evil%2F..%2Fpasswd").unwrap();
        assert!(!result.contains('/'));
    }

    #[test]
    fn rejects_dot_segments() {
        assert_eq!(name("https://example.com/%2E%2E"), None);
    }

    #[test]
    fn strip_query_removes_query_and_fragment() {
        let url = Url::parse("https://example.com/ep.mp3?a=b#frag").unwrap();
        assert_eq!(strip_query(&url), "https://example.com/ep.mp3");
    }

    #[test]
    fn destination_path_joins_file_name() {
        let episode = make_episode("Ep", None, "https://cdn.example.com/x/ep7.mp3?s=1");
        assert_eq!(
            destination_path(&episode, Path::new("/media/show")),
            Some(PathBuf::from("/media/show/ep7.mp3"))
        );
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/media/show/ep7.mp3")),
            PathBuf::from("/media/show/ep7.mp3.partial")
        );
    }
}
