use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::LazyLock;

use crate::audio::{self, AudioMetadata};
use crate::config::ListingSettings;
use crate::error::Result;
use crate::path::encode_segment;

pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "mp2", "mpga", "ogg", "wav", "flac", "m4a", "wma", "aac"];
pub const PICTURE_EXTENSIONS: &[&str] = &["gif", "jpg", "jpeg", "png", "bmp"];
pub const PLAYLIST_EXTENSIONS: &[&str] = &["m3u"];
pub const PLAIN_EXTENSIONS: &[&str] = &["txt", "nfo", "html", "htm"];

// leading track numbers, spaces and dashes up to the last separator dash
static TRIM_NUMBERING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^[-0-9 ]*-[ ]*(.*)$").expect("numbering pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Song,
    Playlist,
    Picture,
    PlainFile,
    Subdirectory,
}

impl EntryKind {
    /// Classify a file (not a directory) by extension.
    pub fn for_file(name: &str) -> Option<Self> {
        let ext = extension_of(name)?;
        let ext = ext.as_str();
        if AUDIO_EXTENSIONS.contains(&ext) {
            Some(EntryKind::Song)
        } else if PLAYLIST_EXTENSIONS.contains(&ext) {
            Some(EntryKind::Playlist)
        } else if PICTURE_EXTENSIONS.contains(&ext) {
            Some(EntryKind::Picture)
        } else if PLAIN_EXTENSIONS.contains(&ext) {
            Some(EntryKind::PlainFile)
        } else {
            None
        }
    }
}

/// Lower-cased extension without the dot.
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_lowercase)
}

pub fn is_audio_file(name: &str) -> bool {
    EntryKind::for_file(name) == Some(EntryKind::Song)
}

/// One visible item of a directory listing.
///
/// `display_text` is raw text; escaping is left to whatever renders it.
/// `href` is relative to the directory and already percent-encoded.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub kind: EntryKind,
    pub name: String,
    pub display_text: String,
    pub href: String,
    pub is_recent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AudioMetadata>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DirectoryListing {
    pub subdirectories: Vec<CatalogEntry>,
    pub songs: Vec<CatalogEntry>,
    pub playlists: Vec<CatalogEntry>,
    pub pictures: Vec<CatalogEntry>,
    pub plain_files: Vec<CatalogEntry>,
}

impl DirectoryListing {
    pub fn is_empty(&self) -> bool {
        self.subdirectories.is_empty()
            && self.songs.is_empty()
            && self.playlists.is_empty()
            && self.pictures.is_empty()
            && self.plain_files.is_empty()
    }

    fn push(&mut self, entry: CatalogEntry) {
        let bucket = match entry.kind {
            EntryKind::Subdirectory => &mut self.subdirectories,
            EntryKind::Song => &mut self.songs,
            EntryKind::Playlist => &mut self.playlists,
            EntryKind::Picture => &mut self.pictures,
            EntryKind::PlainFile => &mut self.plain_files,
        };
        bucket.push(entry);
    }
}

/// Song title for display: the directory-name prefix and track numbering
/// are dropped, so `Alpha - 01 - Intro` inside `Alpha` shows as `Intro`.
///
/// The prefix is only stripped when `context_name` is longer than one
/// character and the base name continues past it.
pub fn song_display_text(base: &str, context_name: &str) -> String {
    if context_name.chars().count() <= 1 || base.len() <= context_name.len() {
        return base.to_string();
    }
    let Some(rest) = base.strip_prefix(context_name) else {
        return base.to_string();
    };

    match TRIM_NUMBERING.captures(rest).and_then(|c| c.get(1)) {
        Some(m) if !m.as_str().is_empty() => m.as_str().to_string(),
        _ => rest.to_string(),
    }
}

/// Lists and classifies single directories.
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    recent_days: u32,
    hide_names: Vec<String>,
    hide_matching: Vec<String>,
    read_metadata: bool,
}

impl DirectoryScanner {
    pub fn new(settings: &ListingSettings) -> Self {
        let lower = |v: &[String]| -> Vec<String> {
            v.iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        };
        Self {
            recent_days: settings.recent_days,
            hide_names: lower(&settings.hide_names),
            hide_matching: lower(&settings.hide_matching),
            read_metadata: settings.read_metadata,
        }
    }

    /// Dotfiles and configured names never appear in listings or playlists.
    pub fn is_hidden(&self, name: &str) -> bool {
        if name.starts_with('.') {
            return true;
        }
        let lower = name.to_lowercase();
        self.hide_names.iter().any(|h| *h == lower)
            || self.hide_matching.iter().any(|h| lower.contains(h.as_str()))
    }

    /// Visible entry names of `dir`, sorted case-sensitively.
    pub fn sorted_names(&self, dir: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Failed to read entry in {}: {}", dir.display(), e);
                    continue;
                }
            };
            match entry.file_name().into_string() {
                Ok(name) if !self.is_hidden(&name) => names.push(name),
                Ok(_) => {}
                Err(raw) => tracing::warn!("Skipping non UTF-8 name {:?} in {}", raw, dir.display()),
            }
        }
        names.sort();
        Ok(names)
    }

    /// Enumerate and classify `dir`.
    ///
    /// `context_name` is the directory's own name as shown to the user; it
    /// is stripped from the front of song names. Failing to read `dir`
    /// itself is an error; a single unreadable entry is skipped.
    pub fn scan(&self, dir: &Path, context_name: &str) -> Result<DirectoryListing> {
        let cutoff = self.recent_cutoff();
        let mut listing = DirectoryListing::default();

        for name in self.sorted_names(dir)? {
            let path = dir.join(&name);
            let stat = match fs::metadata(&path) {
                Ok(stat) => stat,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };

            let kind = if stat.is_dir() {
                EntryKind::Subdirectory
            } else {
                match EntryKind::for_file(&name) {
                    Some(kind) => kind,
                    None => continue,
                }
            };

            let is_recent = match (cutoff, stat.modified()) {
                (Some(cutoff), Ok(modified)) => DateTime::<Utc>::from(modified) > cutoff,
                _ => false,
            };

            let base = Path::new(&name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(&name);
            let (display_text, href) = match kind {
                EntryKind::Subdirectory => (name.clone(), format!("{}/", encode_segment(&name))),
                EntryKind::Song => (song_display_text(base, context_name), encode_segment(&name)),
                EntryKind::Playlist => (base.to_string(), encode_segment(&name)),
                EntryKind::Picture | EntryKind::PlainFile => (name.clone(), encode_segment(&name)),
            };

            // only regular files are opened; a FIFO would block the listing
            let metadata = if kind == EntryKind::Song && self.read_metadata && stat.is_file() {
                self.song_metadata(&path)
            } else {
                None
            };

            listing.push(CatalogEntry {
                kind,
                name,
                display_text,
                href,
                is_recent,
                metadata,
            });
        }

        tracing::debug!(
            "Scanned {}: {} dirs, {} songs, {} playlists",
            dir.display(),
            listing.subdirectories.len(),
            listing.songs.len(),
            listing.playlists.len()
        );
        Ok(listing)
    }

    fn song_metadata(&self, path: &Path) -> Option<AudioMetadata> {
        match audio::read_metadata(path) {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!("Failed to read metadata from {}: {}", path.display(), e);
                Some(AudioMetadata::default())
            }
        }
    }

    fn recent_cutoff(&self) -> Option<DateTime<Utc>> {
        if self.recent_days == 0 {
            return None;
        }
        let window = TimeDelta::try_days(i64::from(self.recent_days))?;
        Utc::now().checked_sub_signed(window)
    }
}
