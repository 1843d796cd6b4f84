//! Server configuration.
//!
//! Settings come from struct defaults, then an optional TOML file, then
//! environment variables prefixed `EDNA__` (with `__` separating nested
//! keys, e.g. `EDNA__SERVER__PORT=9000`).

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::catalog::Source;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "edna.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub sources: Vec<SourceSettings>,
    pub listing: ListingSettings,
    pub index: IndexSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub log: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log: "info".to_string(),
        }
    }
}

/// A music directory and the name it is published under.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSettings {
    pub path: PathBuf,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListingSettings {
    /// Entries modified within this many days are flagged recent; 0 turns it off.
    pub recent_days: u32,
    /// Names hidden from listings (case-insensitive exact match).
    pub hide_names: Vec<String>,
    /// Names hidden when they contain any of these (case-insensitive).
    pub hide_matching: Vec<String>,
    /// Read stream properties and tags for songs in listings.
    pub read_metadata: bool,
}

impl Default for ListingSettings {
    fn default() -> Self {
        Self {
            recent_days: 30,
            hide_names: Vec::new(),
            hide_matching: Vec::new(),
            read_metadata: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Seconds between filename index rebuilds; 0 disables the index.
    pub refresh_secs: u64,
}

impl Settings {
    /// Load settings from an optional config file and the environment.
    ///
    /// An explicitly given file must exist; the default `edna.toml` may be
    /// missing.
    pub fn load(path: Option<&Path>) -> Result<Self, ::config::ConfigError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let cfg = ::config::Config::builder()
            .add_source(::config::File::from(path.as_path()).required(required))
            .add_source(
                ::config::Environment::with_prefix("EDNA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        cfg.try_deserialize()
    }

    /// Perform basic validation checks on loaded settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be non-zero".to_string());
        }
        let mut seen = HashSet::new();
        for source in &self.sources {
            let name = source.display_name();
            if !seen.insert(name.clone()) {
                return Err(format!("duplicate source name: {}", name));
            }
        }
        Ok(())
    }

    /// Configured sources whose directories exist, in file order.
    pub fn usable_sources(&self) -> Vec<Source> {
        self.sources
            .iter()
            .filter_map(|s| {
                if s.path.is_dir() {
                    Some(Source::new(s.path.clone(), s.display_name()))
                } else {
                    tracing::warn!("Skipping source {}: not a directory", s.path.display());
                    None
                }
            })
            .collect()
    }
}

impl SourceSettings {
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            // a path with separators could never match a single URL segment
            _ => self.path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.path.display().to_string()),
        }
    }
}
