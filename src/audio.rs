pub mod id3v1;
pub mod mpeg;
#[cfg(feature = "ogg")]
pub mod ogg;

use serde::Serialize;
use std::fs::File;
use std::io;
use std::path::Path;

/// MPEG audio version from the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MpegVersion {
    #[serde(rename = "1")]
    V1,
    #[serde(rename = "2")]
    V2,
    #[serde(rename = "2.5")]
    V25,
}

impl MpegVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            MpegVersion::V1 => "1",
            MpegVersion::V2 => "2",
            MpegVersion::V25 => "2.5",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Layer {
    #[serde(rename = "1")]
    I,
    #[serde(rename = "2")]
    II,
    #[serde(rename = "3")]
    III,
}

impl Layer {
    pub fn number(&self) -> u8 {
        match self {
            Layer::I => 1,
            Layer::II => 2,
            Layer::III => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelMode {
    Stereo,
    JointStereo,
    DualChannel,
    Mono,
}

/// Stream properties and tag text read from an audio file.
///
/// `valid` is only true when a decodable stream header was found. Tag
/// fields are independent of it: a file with a broken stream can still
/// carry an ID3v1 trailer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AudioMetadata {
    pub valid: bool,
    pub mpeg_version: Option<MpegVersion>,
    pub layer: Option<Layer>,
    pub bitrate_kbps: Option<u32>,
    pub sample_rate_hz: Option<u32>,
    pub channel_mode: Option<ChannelMode>,
    pub duration_secs: f64,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<String>,
    pub comment: Option<String>,
    pub track: Option<u8>,
    pub genre: Option<String>,
}

impl AudioMetadata {
    /// Whole seconds, rounded, for `#EXTINF` style output.
    pub fn duration_rounded(&self) -> u64 {
        self.duration_secs.round() as u64
    }

    /// `Artist - Title` when both tags are present.
    pub fn tag_display(&self) -> Option<String> {
        match (&self.artist, &self.title) {
            (Some(artist), Some(title)) => Some(format!("{} - {}", artist, title)),
            (None, Some(title)) => Some(title.clone()),
            _ => None,
        }
    }
}

/// Format-specific metadata reader.
pub trait AudioFile: Send + Sync {
    /// Get the format name (e.g., "mpeg", "ogg")
    fn format_name(&self) -> &'static str;

    /// Read stream properties and tags.
    ///
    /// Content that is not decodable as this format yields
    /// `valid == false`; only I/O failures are errors. The file's read
    /// position is left where it was.
    fn parse_metadata(&self, file: &mut File) -> io::Result<AudioMetadata>;
}

/// MPEG-1/2/2.5 Layer I-III with Xing and ID3v1 support
pub struct MpegFile;

impl AudioFile for MpegFile {
    fn format_name(&self) -> &'static str {
        "mpeg"
    }

    fn parse_metadata(&self, file: &mut File) -> io::Result<AudioMetadata> {
        mpeg::parse_mpeg(file)
    }
}

/// Pick the metadata reader for a file extension (without the dot).
pub fn audio_file_handler(extension: &str) -> Option<Box<dyn AudioFile>> {
    match extension.to_lowercase().as_str() {
        "mp3" | "mp2" | "mpga" => Some(Box::new(MpegFile)),
        #[cfg(feature = "ogg")]
        "ogg" => Some(Box::new(ogg::OggFile)),
        _ => None,
    }
}

/// Open `path` and read its metadata, if a reader exists for its extension.
pub fn read_metadata(path: &Path) -> io::Result<Option<AudioMetadata>> {
    let Some(handler) = path
        .extension()
        .and_then(|s| s.to_str())
        .and_then(audio_file_handler)
    else {
        return Ok(None);
    };

    let mut file = File::open(path)?;
    let metadata = handler.parse_metadata(&mut file)?;
    tracing::debug!(
        "{} metadata for {}: valid={} duration={:.1}s",
        handler.format_name(),
        path.display(),
        metadata.valid,
        metadata.duration_secs
    );
    Ok(Some(metadata))
}
