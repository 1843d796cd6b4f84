//! The browsable catalog: configured sources plus request-path lookup.
//!
//! [`Catalog::locate`] maps a raw URL path onto a [`Target`]; the other
//! operations turn a located target into a listing or a playlist.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::ListingSettings;
use crate::error::{CatalogError, Result};
use crate::library::{CatalogEntry, DirectoryListing, DirectoryScanner, EntryKind, is_audio_file, song_display_text};
use crate::path::{PathSegments, encode_segment, join_url, resolve};
use crate::playlist::{LineForm, PlaylistBuilder, PlaylistLine, RewrittenPlaylist};

/// A music directory published under a display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub dir: PathBuf,
    pub name: String,
}

impl Source {
    pub fn new(dir: PathBuf, name: String) -> Self {
        Self { dir, name }
    }
}

/// Playlists synthesized for every directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratedPlaylist {
    All,
    AllRecursive,
    Shuffle,
    ShuffleRecursive,
}

impl GeneratedPlaylist {
    pub const ALL: [GeneratedPlaylist; 4] = [
        GeneratedPlaylist::All,
        GeneratedPlaylist::AllRecursive,
        GeneratedPlaylist::Shuffle,
        GeneratedPlaylist::ShuffleRecursive,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            GeneratedPlaylist::All => "all.m3u",
            GeneratedPlaylist::AllRecursive => "allrecursive.m3u",
            GeneratedPlaylist::Shuffle => "shuffle.m3u",
            GeneratedPlaylist::ShuffleRecursive => "shufflerecursive.m3u",
        }
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.file_name() == name)
    }

    pub fn recursive(&self) -> bool {
        matches!(self, GeneratedPlaylist::AllRecursive | GeneratedPlaylist::ShuffleRecursive)
    }

    pub fn shuffle(&self) -> bool {
        matches!(self, GeneratedPlaylist::Shuffle | GeneratedPlaylist::ShuffleRecursive)
    }
}

/// What a request path refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The list of sources.
    Root,
    Directory { dir: PathBuf },
    GeneratedPlaylist { dir: PathBuf, playlist: GeneratedPlaylist },
    /// `<song>.m3u`: a one-line playlist for an existing song.
    SongPlaylist { song: PathBuf },
    /// A regular file of a listed kind.
    File { path: PathBuf, kind: EntryKind },
}

/// A resolved request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub segments: PathSegments,
    pub target: Target,
    /// Encoded URL path of the directory the target is in (or is); empty
    /// for the root.
    pub dir_url: String,
}

/// A directory page.
#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub title: String,
    pub path: PathSegments,
    #[serde(flatten)]
    pub entries: DirectoryListing,
    /// Hrefs of the generated playlists worth offering here.
    pub generated: Vec<&'static str>,
}

pub struct Catalog {
    sources: Vec<Source>,
    scanner: DirectoryScanner,
    builder: PlaylistBuilder,
}

impl Catalog {
    pub fn new(sources: Vec<Source>, settings: &ListingSettings) -> Self {
        let scanner = DirectoryScanner::new(settings);
        let builder = PlaylistBuilder::new(scanner.clone());
        Self {
            sources,
            scanner,
            builder,
        }
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn scanner(&self) -> &DirectoryScanner {
        &self.scanner
    }

    pub fn source(&self, name: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Resolve `raw_path` (the URL path, query already removed) against the
    /// configured sources.
    pub fn locate(&self, raw_path: &str) -> Result<Located> {
        let segments = resolve(raw_path)?;
        let Some(first) = segments.first() else {
            return Ok(Located {
                segments,
                target: Target::Root,
                dir_url: String::new(),
            });
        };
        let source = self
            .source(first)
            .ok_or_else(|| CatalogError::not_found(first))?;

        let mut dir = source.dir.clone();
        let mut dir_url = join_url("", [first]);
        let rest = segments.as_slice()[1..].to_vec();

        for (i, segment) in rest.iter().enumerate() {
            let is_last = i + 1 == rest.len();

            if is_last {
                if let Some(playlist) = GeneratedPlaylist::from_file_name(segment) {
                    return Ok(Located {
                        target: Target::GeneratedPlaylist { dir, playlist },
                        segments,
                        dir_url,
                    });
                }
            }
            if self.scanner.is_hidden(segment) {
                return Err(CatalogError::not_found(segments.url()));
            }
            if is_last {
                if let Some(song) = self.song_playlist_target(&dir, segment) {
                    return Ok(Located {
                        target: Target::SongPlaylist { song },
                        segments,
                        dir_url,
                    });
                }
            }

            let path = dir.join(segment);
            if path.is_dir() {
                dir_url = join_url(&dir_url, [segment.as_str()]);
                dir = path;
            } else if path.is_file() && is_last {
                let kind = EntryKind::for_file(segment)
                    .ok_or_else(|| CatalogError::not_found(segments.url()))?;
                return Ok(Located {
                    target: Target::File { path, kind },
                    segments,
                    dir_url,
                });
            } else {
                return Err(CatalogError::not_found(segments.url()));
            }
        }

        Ok(Located {
            target: Target::Directory { dir },
            segments,
            dir_url,
        })
    }

    // "<song>.m3u" where <song> is an audio file next to it
    fn song_playlist_target(&self, dir: &Path, segment: &str) -> Option<PathBuf> {
        let len = segment.len();
        if len <= 4 || !segment.is_char_boundary(len - 4) {
            return None;
        }
        let (song, ext) = segment.split_at(len - 4);
        if !ext.eq_ignore_ascii_case(".m3u") || !is_audio_file(song) || self.scanner.is_hidden(song) {
            return None;
        }
        let path = dir.join(song);
        path.is_file().then_some(path)
    }

    /// Listing for the root or a directory.
    pub fn list(&self, located: &Located) -> Result<Listing> {
        match &located.target {
            Target::Root => Ok(Listing {
                title: String::new(),
                path: located.segments.clone(),
                entries: DirectoryListing {
                    subdirectories: self.sources.iter().map(source_entry).collect(),
                    ..DirectoryListing::default()
                },
                generated: Vec::new(),
            }),
            Target::Directory { dir } => {
                let context = located.segments.last().unwrap_or_default();
                let entries = self.scanner.scan(dir, context)?;

                let mut generated = Vec::new();
                if !entries.songs.is_empty() {
                    generated.push(GeneratedPlaylist::All.file_name());
                    generated.push(GeneratedPlaylist::Shuffle.file_name());
                }
                if !entries.subdirectories.is_empty() {
                    generated.push(GeneratedPlaylist::AllRecursive.file_name());
                    generated.push(GeneratedPlaylist::ShuffleRecursive.file_name());
                }

                Ok(Listing {
                    title: context.to_string(),
                    path: located.segments.clone(),
                    entries,
                    generated,
                })
            }
            _ => Err(CatalogError::not_found(located.segments.url())),
        }
    }

    /// Lines of a generated or single-song playlist as absolute URLs.
    ///
    /// `origin` is the scheme and authority, e.g. `http://host:8080`.
    pub fn playlist(&self, located: &Located, origin: &str) -> Result<Vec<PlaylistLine>> {
        let base = format!("{}{}", origin.trim_end_matches('/'), located.dir_url);
        match &located.target {
            Target::GeneratedPlaylist { dir, playlist } => self.builder.build(
                dir,
                &LineForm::Url(base),
                playlist.recursive(),
                playlist.shuffle(),
            ),
            Target::SongPlaylist { song } => {
                let name = song
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| CatalogError::not_found(located.segments.url()))?;
                Ok(vec![PlaylistLine::Url(join_url(&base, [name]))])
            }
            _ => Err(CatalogError::not_found(located.segments.url())),
        }
    }

    /// A user-authored `.m3u` with its entries rewritten to absolute URLs.
    pub fn rewrite_playlist(&self, located: &Located, origin: &str) -> Result<RewrittenPlaylist> {
        match &located.target {
            Target::File {
                path,
                kind: EntryKind::Playlist,
            } => {
                let base = format!("{}{}", origin.trim_end_matches('/'), located.dir_url);
                self.builder.rewrite(path, &base)
            }
            _ => Err(CatalogError::not_found(located.segments.url())),
        }
    }

    /// Every song below a directory as relative names, for bundling.
    pub fn archive_names(&self, located: &Located) -> Result<Vec<PlaylistLine>> {
        match &located.target {
            Target::Directory { dir } | Target::GeneratedPlaylist { dir, .. } => {
                self.builder.build(dir, &LineForm::Name, true, false)
            }
            _ => Err(CatalogError::not_found(located.segments.url())),
        }
    }

    /// Display text for a located song, trimmed against its directory name.
    pub fn song_display_text(&self, located: &Located) -> Option<String> {
        let Target::File {
            path,
            kind: EntryKind::Song,
        } = &located.target
        else {
            return None;
        };
        let segments = located.segments.as_slice();
        let context = segments.get(segments.len().checked_sub(2)?)?;
        let base = path.file_stem()?.to_str()?;
        Some(song_display_text(base, context))
    }
}

fn source_entry(source: &Source) -> CatalogEntry {
    CatalogEntry {
        kind: EntryKind::Subdirectory,
        name: source.name.clone(),
        display_text: source.name.clone(),
        href: format!("{}/", encode_segment(&source.name)),
        is_recent: false,
        metadata: None,
    }
}
