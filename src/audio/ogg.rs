//! Ogg Vorbis metadata, decoded by symphonia.

use std::fs::File;
use std::io::{self, Seek, SeekFrom};

use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::{AudioFile, AudioMetadata, ChannelMode};

/// OGG Vorbis audio file implementation
pub struct OggFile;

impl AudioFile for OggFile {
    fn format_name(&self) -> &'static str {
        "ogg"
    }

    fn parse_metadata(&self, file: &mut File) -> io::Result<AudioMetadata> {
        let origin = file.stream_position()?;
        let file_size = file.metadata()?.len();
        file.seek(SeekFrom::Start(0))?;

        // The clone shares the cursor with `file`, which is rewound below.
        let source = file.try_clone()?;
        let result = probe(source, file_size);
        file.seek(SeekFrom::Start(origin))?;
        result
    }
}

fn probe(source: File, file_size: u64) -> io::Result<AudioMetadata> {
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("ogg");

    let probed = match symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    ) {
        Ok(probed) => probed,
        // running off the end while probing just means "not Ogg"
        Err(SymphoniaError::IoError(e)) if e.kind() != io::ErrorKind::UnexpectedEof => {
            return Err(e);
        }
        Err(e) => {
            tracing::debug!("Not a decodable Ogg stream: {}", e);
            return Ok(AudioMetadata::default());
        }
    };

    let mut format = probed.format;
    let mut metadata = probed.metadata;

    let mut audio_metadata = AudioMetadata::default();

    // Extract metadata from Vorbis comments
    let format_metadata = format.metadata();
    if let Some(metadata_rev) = format_metadata.current().map_or_else(
        || metadata.get().and_then(|m| m.current().cloned()),
        |x| Some(x).cloned(),
    ) {
        for tag in metadata_rev.tags() {
            let key = tag.key.to_uppercase();
            let value = tag.value.to_string();

            tracing::debug!("OGG metadata tag: {} = {}", key, value);

            match key.as_str() {
                "TITLE" => audio_metadata.title = Some(value),
                "ARTIST" => audio_metadata.artist = Some(value),
                "ALBUM" => audio_metadata.album = Some(value),
                "GENRE" => audio_metadata.genre = Some(value),
                "DATE" | "YEAR" => audio_metadata.year = Some(value),
                "COMMENT" | "DESCRIPTION" => audio_metadata.comment = Some(value),
                "TRACKNUMBER" => audio_metadata.track = parse_track_number(&value),
                _ => {}
            }
        }
    }

    if let Some(track) = format.default_track() {
        let params = &track.codec_params;
        audio_metadata.valid = true;
        audio_metadata.sample_rate_hz = params.sample_rate;
        audio_metadata.channel_mode = params.channels.map(|c| {
            if c.count() == 1 {
                ChannelMode::Mono
            } else {
                ChannelMode::Stereo
            }
        });

        let duration = match (params.time_base, params.n_frames, params.sample_rate) {
            (Some(time_base), Some(n_frames), _) => {
                let time = time_base.calc_time(n_frames);
                time.seconds as f64 + time.frac
            }
            (None, Some(n_frames), Some(rate)) if rate > 0 => n_frames as f64 / f64::from(rate),
            _ => 0.0,
        };
        audio_metadata.duration_secs = duration;
        if duration > 0.0 {
            let kbps = file_size as f64 * 8.0 / duration / 1000.0;
            audio_metadata.bitrate_kbps = Some(kbps.round() as u32);
        }
    }

    Ok(audio_metadata)
}

// "3" or "3/12"
fn parse_track_number(value: &str) -> Option<u8> {
    value.split('/').next()?.trim().parse().ok()
}
