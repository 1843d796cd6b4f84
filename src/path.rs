//! Request path sanitizing and URL building.
//!
//! Everything that turns an untrusted URL path into filesystem-facing
//! segments, or turns names back into hrefs, lives here so that decoding
//! and encoding each happen in exactly one place.

use serde::Serialize;

use crate::error::{CatalogError, Result};

/// Sanitized path components, relative to the catalog root.
///
/// Never contains empty, `.` or `..` components.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PathSegments(Vec<String>);

impl PathSegments {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// URL path for these segments: `/a/b`, or `/` for the root.
    pub fn url(&self) -> String {
        if self.0.is_empty() {
            return "/".to_string();
        }
        join_url("", self.iter())
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

/// Turn a raw request path into segments.
///
/// Percent-escapes are decoded first, then the path is split on `/`.
/// Empty and `.` components are dropped and each `..` removes the component
/// before it. A `..` with nothing left to remove fails with `IllegalPath`.
pub fn resolve(raw: &str) -> Result<PathSegments> {
    let decoded = urlencoding::decode_binary(raw.as_bytes());
    normalize(&String::from_utf8_lossy(&decoded)).map_err(|_| {
        tracing::debug!("Rejecting path above root: {}", raw);
        CatalogError::IllegalPath(raw.to_string())
    })
}

/// Split an already-decoded relative path the same way [`resolve`] does.
pub fn normalize(path: &str) -> Result<PathSegments> {
    let mut parts: Vec<String> = path
        .split('/')
        .filter(|p| !p.is_empty() && *p != ".")
        .map(str::to_string)
        .collect();

    while let Some(idx) = parts.iter().position(|p| p == "..") {
        if idx == 0 {
            return Err(CatalogError::IllegalPath(path.to_string()));
        }
        parts.drain(idx - 1..=idx);
    }

    Ok(PathSegments(parts))
}

/// Percent-encode a single path component (a `/` inside it is escaped too).
pub fn encode_segment(name: &str) -> String {
    urlencoding::encode(name).into_owned()
}

/// Append encoded segments to `base`, separated by `/`.
pub fn join_url<'a>(base: &str, segments: impl IntoIterator<Item = &'a str>) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for segment in segments {
        url.push('/');
        url.push_str(&encode_segment(segment));
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segs(raw: &str) -> Vec<String> {
        resolve(raw).unwrap().into_vec()
    }

    #[test]
    fn resolve_splits_and_drops_empty_and_dot_segments() {
        assert_eq!(segs("/a//b/./c/"), vec!["a", "b", "c"]);
        assert_eq!(segs("a/b"), vec!["a", "b"]);
        assert!(segs("/").is_empty());
        assert!(segs("").is_empty());
        assert!(segs("/./.").is_empty());
    }

    #[test]
    fn resolve_collapses_parent_references() {
        assert_eq!(segs("/a/b/../c"), vec!["a", "c"]);
        assert_eq!(segs("/a/b/c/../../d"), vec!["a", "d"]);
        assert!(segs("/a/..").is_empty());
    }

    #[test]
    fn resolve_rejects_escape_above_root() {
        assert!(matches!(resolve("/../a"), Err(CatalogError::IllegalPath(_))));
        assert!(matches!(resolve("/a/../../b"), Err(CatalogError::IllegalPath(_))));
        assert!(matches!(resolve(".."), Err(CatalogError::IllegalPath(_))));
    }

    #[test]
    fn resolve_decodes_before_splitting() {
        assert_eq!(segs("/My%20Music/Song%20One.mp3"), vec!["My Music", "Song One.mp3"]);
        // encoded dots are still parent references
        assert!(matches!(resolve("/%2e%2e/etc"), Err(CatalogError::IllegalPath(_))));
        // an encoded slash becomes a separator after decoding
        assert_eq!(segs("/a%2Fb"), vec!["a", "b"]);
    }

    #[test]
    fn resolve_tolerates_invalid_utf8_escapes() {
        let parts = segs("/caf%E9");
        assert_eq!(parts.len(), 1);
        assert!(parts[0].starts_with("caf"));
    }

    #[test]
    fn normalize_does_not_decode() {
        let p = normalize("100%20/x/../y").unwrap();
        assert_eq!(p.into_vec(), vec!["100%20", "y"]);
        assert!(normalize("a/../../b").is_err());
    }

    #[test]
    fn encoded_names_resolve_back_to_themselves() {
        for name in ["Alpha - 01 - Intro.mp3", "100% & more", "a#b?c", "naïve.ogg", "..."] {
            let href = encode_segment(name);
            assert_eq!(segs(&href), vec![name.to_string()]);
        }
    }

    #[test]
    fn url_and_join_encode_each_segment_once() {
        let p = resolve("/Music/Best%20Of").unwrap();
        assert_eq!(p.url(), "/Music/Best%20Of");
        assert_eq!(PathSegments::root().url(), "/");
        assert_eq!(
            join_url("http://host:8080/Music/", ["A B", "c.mp3"]),
            "http://host:8080/Music/A%20B/c.mp3"
        );
    }
}
