use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{CatalogError, Result};
use crate::library::{DirectoryScanner, is_audio_file};
use crate::path::{join_url, normalize};

/// Content type of every M3U body we produce.
pub const M3U_CONTENT_TYPE: &str = "audio/x-mpegurl";

/// One entry of a generated playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PlaylistLine {
    /// Absolute media URL, for players.
    Url(String),
    /// Filesystem name relative to the playlist directory, `/`-separated.
    Name(String),
}

impl PlaylistLine {
    pub fn as_str(&self) -> &str {
        match self {
            PlaylistLine::Url(s) | PlaylistLine::Name(s) => s,
        }
    }
}

impl AsRef<str> for PlaylistLine {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for PlaylistLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How generated lines are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineForm {
    /// URLs under this (already encoded) base, e.g. `http://host:8080/Music/Alpha`.
    Url(String),
    /// Bare relative names.
    Name,
}

/// A user-authored playlist after rewriting, plus the lines that were dropped.
#[derive(Debug, Default)]
pub struct RewrittenPlaylist {
    pub lines: Vec<String>,
    pub dropped: Vec<CatalogError>,
}

/// Newline-terminated M3U text.
pub fn to_m3u<T: AsRef<str>>(lines: &[T]) -> String {
    let mut body = String::new();
    for line in lines {
        body.push_str(line.as_ref());
        body.push('\n');
    }
    body
}

/// Builds song lists for a directory, optionally recursing and shuffling.
#[derive(Debug, Clone)]
pub struct PlaylistBuilder {
    scanner: DirectoryScanner,
}

impl PlaylistBuilder {
    pub fn new(scanner: DirectoryScanner) -> Self {
        Self { scanner }
    }

    pub fn build(
        &self,
        dir: &Path,
        form: &LineForm,
        recursive: bool,
        shuffle: bool,
    ) -> Result<Vec<PlaylistLine>> {
        self.build_with_rng(dir, form, recursive, shuffle, &mut rand::thread_rng())
    }

    /// Like [`build`](Self::build) with the shuffle drawn from `rng`.
    ///
    /// Songs are listed in sorted name order. With `recursive`, each
    /// subdirectory's songs appear at the subdirectory's sorted position.
    /// Only the final, flattened list is shuffled.
    ///
    /// Symbolic links are followed and there is no cycle detection: a link
    /// back to an ancestor recurses until the stack runs out.
    pub fn build_with_rng<R: Rng + ?Sized>(
        &self,
        dir: &Path,
        form: &LineForm,
        recursive: bool,
        shuffle: bool,
        rng: &mut R,
    ) -> Result<Vec<PlaylistLine>> {
        let names = self.scanner.sorted_names(dir)?;
        let prefix = match form {
            LineForm::Url(base) => base.trim_end_matches('/').to_string(),
            LineForm::Name => String::new(),
        };

        let mut lines = Vec::new();
        self.collect(dir, names, form, &prefix, recursive, &mut lines);

        if shuffle {
            lines.shuffle(rng);
        }
        tracing::debug!(
            "Built playlist for {}: {} songs (recursive={}, shuffle={})",
            dir.display(),
            lines.len(),
            recursive,
            shuffle
        );
        Ok(lines)
    }

    fn collect(
        &self,
        dir: &Path,
        names: Vec<String>,
        form: &LineForm,
        prefix: &str,
        recursive: bool,
        out: &mut Vec<PlaylistLine>,
    ) {
        for name in names {
            let path = dir.join(&name);
            let stat = match fs::metadata(&path) {
                Ok(stat) => stat,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };

            if stat.is_dir() {
                if !recursive {
                    continue;
                }
                let nested = match self.scanner.sorted_names(&path) {
                    Ok(nested) => nested,
                    Err(e) => {
                        tracing::warn!("Skipping unreadable directory {}: {}", path.display(), e);
                        continue;
                    }
                };
                let nested_prefix = extend(form, prefix, &name);
                self.collect(&path, nested, form, &nested_prefix, recursive, out);
            } else if is_audio_file(&name) {
                out.push(line(form, prefix, &name));
            }
        }
    }

    /// Rewrite a user-authored `.m3u` so relative entries become URLs under
    /// `base_url`, the URL of the directory holding the playlist.
    ///
    /// Directives and remote URLs pass through. Entries that are absolute,
    /// climb out of the playlist's directory, or name missing files are
    /// dropped and reported in `dropped`.
    pub fn rewrite(&self, playlist_file: &Path, base_url: &str) -> Result<RewrittenPlaylist> {
        let raw = fs::read(playlist_file)?;
        let text = String::from_utf8_lossy(&raw);
        let dir = playlist_file.parent().unwrap_or(Path::new("."));

        let mut out = RewrittenPlaylist::default();
        for line in text.lines().map(str::trim) {
            if line.is_empty() {
                continue;
            }
            if line.starts_with('#') {
                if line == "#EXTM3U" || line.starts_with("#EXTINF:") {
                    out.lines.push(line.to_string());
                }
                continue;
            }
            if is_remote(line) {
                out.lines.push(line.to_string());
                continue;
            }

            match self.rewrite_entry(dir, line, base_url) {
                Ok(url) => out.lines.push(url),
                Err(e) => {
                    tracing::warn!("{}: {}", playlist_file.display(), e);
                    out.dropped.push(e);
                }
            }
        }
        Ok(out)
    }

    fn rewrite_entry(&self, dir: &Path, entry: &str, base_url: &str) -> Result<String> {
        if is_absolute(entry) {
            return Err(CatalogError::malformed_line(entry, "absolute path"));
        }
        // playlists written on Windows use backslash separators
        let relative = entry.replace('\\', "/");
        let segments = normalize(&relative)
            .map_err(|_| CatalogError::malformed_line(entry, "outside the playlist directory"))?;
        if segments.is_empty() {
            return Err(CatalogError::malformed_line(entry, "empty path"));
        }
        if segments.iter().any(|s| self.scanner.is_hidden(s)) {
            return Err(CatalogError::malformed_line(entry, "hidden file"));
        }

        let target = segments.iter().fold(dir.to_path_buf(), |p, s| p.join(s));
        if !target.is_file() {
            return Err(CatalogError::malformed_line(entry, "no such file"));
        }
        Ok(join_url(base_url, segments.iter()))
    }
}

fn line(form: &LineForm, prefix: &str, name: &str) -> PlaylistLine {
    let text = extend(form, prefix, name);
    match form {
        LineForm::Url(_) => PlaylistLine::Url(text),
        LineForm::Name => PlaylistLine::Name(text),
    }
}

fn extend(form: &LineForm, prefix: &str, name: &str) -> String {
    match form {
        LineForm::Url(_) => join_url(prefix, [name]),
        LineForm::Name if prefix.is_empty() => name.to_string(),
        LineForm::Name => format!("{}/{}", prefix, name),
    }
}

fn is_remote(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    ["http:", "https:", "ftp:"].iter().any(|s| lower.starts_with(s))
}

fn is_absolute(line: &str) -> bool {
    let b = line.as_bytes();
    line.starts_with('/')
        || line.starts_with('\\')
        || (b.len() >= 2 && b[0].is_ascii_alphabetic() && b[1] == b':')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListingSettings;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tempfile::{TempDir, tempdir};

    fn builder() -> PlaylistBuilder {
        PlaylistBuilder::new(DirectoryScanner::new(&ListingSettings {
            read_metadata: false,
            ..ListingSettings::default()
        }))
    }

    // top: a.mp3, b/ (c.mp3, d/ (e.mp3)), f.mp3, cover.jpg, .x.mp3
    fn tree() -> TempDir {
        let dir = tempdir().unwrap();
        let d = dir.path();
        fs::write(d.join("a.mp3"), b"x").unwrap();
        fs::create_dir_all(d.join("b/d")).unwrap();
        fs::write(d.join("b/c.mp3"), b"x").unwrap();
        fs::write(d.join("b/d/e.mp3"), b"x").unwrap();
        fs::write(d.join("f.mp3"), b"x").unwrap();
        fs::write(d.join("cover.jpg"), b"x").unwrap();
        fs::write(d.join(".x.mp3"), b"x").unwrap();
        dir
    }

    fn texts(lines: &[PlaylistLine]) -> Vec<&str> {
        lines.iter().map(PlaylistLine::as_str).collect()
    }

    #[test]
    fn flat_build_lists_top_level_songs_only() {
        let dir = tree();
        let lines = builder().build(dir.path(), &LineForm::Name, false, false).unwrap();
        assert_eq!(texts(&lines), vec!["a.mp3", "f.mp3"]);
    }

    #[test]
    fn recursive_build_descends_at_sorted_position() {
        let dir = tree();
        let lines = builder().build(dir.path(), &LineForm::Name, true, false).unwrap();
        assert_eq!(texts(&lines), vec!["a.mp3", "b/c.mp3", "b/d/e.mp3", "f.mp3"]);
    }

    #[test]
    fn url_form_encodes_each_segment() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("Sub Dir")).unwrap();
        fs::write(dir.path().join("Sub Dir/Song #1.mp3"), b"x").unwrap();
        let form = LineForm::Url("http://host:8080/Music/".into());

        let lines = builder().build(dir.path(), &form, true, false).unwrap();
        assert_eq!(
            lines,
            vec![PlaylistLine::Url("http://host:8080/Music/Sub%20Dir/Song%20%231.mp3".into())]
        );
    }

    #[test]
    fn shuffled_build_is_a_permutation() {
        let dir = tree();
        let b = builder();
        let plain = b.build(dir.path(), &LineForm::Name, true, false).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let shuffled = b
            .build_with_rng(dir.path(), &LineForm::Name, true, true, &mut rng)
            .unwrap();

        let mut a = texts(&plain);
        let mut s = texts(&shuffled);
        a.sort();
        s.sort();
        assert_eq!(a, s);

        // same seed, same order
        let mut rng = StdRng::seed_from_u64(7);
        let again = b
            .build_with_rng(dir.path(), &LineForm::Name, true, true, &mut rng)
            .unwrap();
        assert_eq!(shuffled, again);
    }

    #[test]
    fn missing_top_directory_is_fatal() {
        let dir = tempdir().unwrap();
        let err = builder()
            .build(&dir.path().join("gone"), &LineForm::Name, true, false)
            .unwrap_err();
        assert!(matches!(err, CatalogError::Io(_)));
    }

    #[test]
    fn to_m3u_terminates_every_line() {
        let lines = vec![PlaylistLine::Name("a.mp3".into()), PlaylistLine::Name("b.mp3".into())];
        assert_eq!(to_m3u(&lines), "a.mp3\nb.mp3\n");
        assert_eq!(to_m3u::<PlaylistLine>(&[]), "");
    }

    #[test]
    fn rewrite_keeps_directives_and_urls_and_drops_bad_entries() {
        let dir = tree();
        let list = dir.path().join("mix.m3u");
        fs::write(
            &list,
            "#EXTM3U\r\n\
             #EXTINF:123,Band - Song\r\n\
             a.mp3\r\n\
             # just a comment\n\
             \n\
             b\\c.mp3\n\
             HTTP://radio.example/stream\n\
             ftp://files.example/x.mp3\n\
             /etc/passwd\n\
             C:\\Music\\x.mp3\n\
             ../outside.mp3\n\
             missing.mp3\n\
             .x.mp3\n",
        )
        .unwrap();

        let out = builder().rewrite(&list, "http://h/Music").unwrap();
        assert_eq!(
            out.lines,
            vec![
                "#EXTM3U",
                "#EXTINF:123,Band - Song",
                "http://h/Music/a.mp3",
                "http://h/Music/b/c.mp3",
                "HTTP://radio.example/stream",
                "ftp://files.example/x.mp3",
            ]
        );
        assert_eq!(out.dropped.len(), 5);
        assert!(
            out.dropped
                .iter()
                .all(|e| matches!(e, CatalogError::MalformedPlaylistLine { .. }))
        );
    }
}
