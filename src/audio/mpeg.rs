//! MPEG audio frame header and Xing VBR header decoding.

use std::io::{self, Read, Seek, SeekFrom};

use super::id3v1;
use super::{AudioMetadata, ChannelMode, Layer, MpegVersion};

/// How far past the start of audio data we look for a frame sync.
pub const SYNC_SEARCH_LIMIT: usize = 2000;

/// The Xing marker must start within this many bytes of the frame header.
pub const XING_SEARCH_LIMIT: usize = 128;

const XING_FRAMES_FLAG: u32 = 0x0001;
const XING_BYTES_FLAG: u32 = 0x0002;

// marker + flags + frame count + byte count
const XING_MAX_LEN: usize = 16;

// kbps, indexed [MPEG-1 | MPEG-2/2.5][layer - 1][bitrate index].
// 0 marks the free-format and reserved slots.
const BITRATES: [[[u32; 16]; 3]; 2] = [
    [
        [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448, 0],
        [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 0],
        [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 0],
    ],
    [
        [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256, 0],
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0],
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0],
    ],
];

// Hz, indexed [version][sample rate index]; index 3 is reserved.
const SAMPLE_RATES: [[u32; 3]; 3] = [
    [44100, 48000, 32000],
    [22050, 24000, 16000],
    [11025, 12000, 8000],
];

/// A decoded 4-byte MPEG audio frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: MpegVersion,
    pub layer: Layer,
    pub bitrate_kbps: u32,
    pub sample_rate_hz: u32,
    pub padding: bool,
    pub channel_mode: ChannelMode,
}

impl FrameHeader {
    /// Decode a big-endian header word. Returns `None` for a missing sync
    /// pattern, reserved version or layer bits, or a bitrate / sample rate
    /// index that falls on a reserved table slot.
    pub fn decode(bytes: [u8; 4]) -> Option<Self> {
        let word = u32::from_be_bytes(bytes);
        if word >> 21 != 0x7FF {
            return None;
        }

        let version = match (word >> 19) & 0b11 {
            0b00 => MpegVersion::V25,
            0b10 => MpegVersion::V2,
            0b11 => MpegVersion::V1,
            _ => return None,
        };
        let layer = match (word >> 17) & 0b11 {
            0b01 => Layer::III,
            0b10 => Layer::II,
            0b11 => Layer::I,
            _ => return None,
        };
        let bitrate_index = ((word >> 12) & 0xF) as usize;
        let rate_index = ((word >> 10) & 0b11) as usize;
        let padding = (word >> 9) & 1 == 1;
        let channel_mode = match (word >> 6) & 0b11 {
            0b00 => ChannelMode::Stereo,
            0b01 => ChannelMode::JointStereo,
            0b10 => ChannelMode::DualChannel,
            _ => ChannelMode::Mono,
        };

        let group = match version {
            MpegVersion::V1 => 0,
            MpegVersion::V2 | MpegVersion::V25 => 1,
        };
        let bitrate_kbps = BITRATES[group][layer.number() as usize - 1][bitrate_index];
        if bitrate_kbps == 0 {
            return None;
        }

        let rates = match version {
            MpegVersion::V1 => &SAMPLE_RATES[0],
            MpegVersion::V2 => &SAMPLE_RATES[1],
            MpegVersion::V25 => &SAMPLE_RATES[2],
        };
        let sample_rate_hz = *rates.get(rate_index)?;

        Some(Self {
            version,
            layer,
            bitrate_kbps,
            sample_rate_hz,
            padding,
            channel_mode,
        })
    }

    /// Frame length in bytes.
    pub fn frame_length(&self) -> u64 {
        let bits_per_sec = u64::from(self.bitrate_kbps) * 1000;
        let rate = u64::from(self.sample_rate_hz);
        let padding = u64::from(self.padding);
        match self.layer {
            Layer::I => (12 * bits_per_sec / rate + padding) * 4,
            Layer::II | Layer::III => 144 * bits_per_sec / rate + padding,
        }
    }

    pub fn samples_per_frame(&self) -> u32 {
        match self.layer {
            Layer::I => 384,
            Layer::II | Layer::III => 1152,
        }
    }

    /// Constant-bitrate estimate for a stream of `stream_len` bytes.
    pub fn cbr_duration(&self, stream_len: u64) -> f64 {
        let frames = stream_len as f64 / self.frame_length() as f64;
        frames * self.frame_duration()
    }

    fn frame_duration(&self) -> f64 {
        f64::from(self.samples_per_frame()) / f64::from(self.sample_rate_hz)
    }
}

/// Frame and byte counts from a Xing VBR header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XingHeader {
    pub frames: Option<u32>,
    pub bytes: Option<u32>,
}

impl XingHeader {
    /// Look for a Xing header in `frame`, which starts at a frame header.
    pub fn find(frame: &[u8]) -> Option<Self> {
        let search = &frame[..frame.len().min(XING_SEARCH_LIMIT)];
        let pos = search.windows(4).position(|w| w == b"Xing")?;

        let mut fields = frame[pos + 4..]
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]));

        let flags = fields.next()?;
        let frames = if flags & XING_FRAMES_FLAG != 0 {
            Some(fields.next()?)
        } else {
            None
        };
        let bytes = if flags & XING_BYTES_FLAG != 0 {
            Some(fields.next()?)
        } else {
            None
        };

        Some(Self { frames, bytes })
    }
}

/// Read MPEG stream properties and the ID3v1 trailer from `source`.
///
/// The read position is restored to where it was on entry, whether or not
/// parsing succeeds.
pub fn parse_mpeg<R: Read + Seek>(source: &mut R) -> io::Result<AudioMetadata> {
    let origin = source.stream_position()?;
    let result = read_mpeg(source);
    source.seek(SeekFrom::Start(origin))?;
    result
}

fn read_mpeg<R: Read + Seek>(source: &mut R) -> io::Result<AudioMetadata> {
    let file_size = source.seek(SeekFrom::End(0))?;
    let mut metadata = AudioMetadata::default();

    let audio_start = id3v2_end(source)?;
    source.seek(SeekFrom::Start(audio_start))?;

    let mut window = Vec::with_capacity(SYNC_SEARCH_LIMIT + XING_SEARCH_LIMIT + XING_MAX_LEN);
    (&mut *source)
        .take((SYNC_SEARCH_LIMIT + XING_SEARCH_LIMIT + XING_MAX_LEN) as u64)
        .read_to_end(&mut window)?;

    match find_frame_header(&window) {
        Some((offset, header)) => {
            metadata.valid = true;
            metadata.mpeg_version = Some(header.version);
            metadata.layer = Some(header.layer);
            metadata.bitrate_kbps = Some(header.bitrate_kbps);
            metadata.sample_rate_hz = Some(header.sample_rate_hz);
            metadata.channel_mode = Some(header.channel_mode);
            metadata.duration_secs = header.cbr_duration(file_size);

            if let Some(xing) = XingHeader::find(&window[offset..]) {
                apply_xing(&mut metadata, &header, &xing);
            }
        }
        None => tracing::debug!("No MPEG frame header in the first {} bytes", SYNC_SEARCH_LIMIT),
    }

    if let Some(tag) = id3v1::read_tag(source, file_size)? {
        tag.apply(&mut metadata);
    }

    Ok(metadata)
}

/// First offset within the search limit holding a decodable frame header.
pub fn find_frame_header(window: &[u8]) -> Option<(usize, FrameHeader)> {
    let end = window.len().min(SYNC_SEARCH_LIMIT);
    (0..end)
        .filter(|&i| window[i] == 0xFF && i + 4 <= window.len())
        .find_map(|i| {
            let bytes = [window[i], window[i + 1], window[i + 2], window[i + 3]];
            FrameHeader::decode(bytes).map(|h| (i, h))
        })
}

fn apply_xing(metadata: &mut AudioMetadata, header: &FrameHeader, xing: &XingHeader) {
    let Some(frames) = xing.frames.filter(|&f| f > 0) else {
        return;
    };
    let duration = f64::from(frames) * header.frame_duration();
    metadata.duration_secs = duration;
    if let Some(bytes) = xing.bytes {
        let kbps = f64::from(bytes) * 8.0 / duration / 1000.0;
        metadata.bitrate_kbps = Some(kbps.round() as u32);
    }
}

/// Offset just past a leading ID3v2 tag, or 0 if there is none.
fn id3v2_end<R: Read + Seek>(source: &mut R) -> io::Result<u64> {
    source.seek(SeekFrom::Start(0))?;
    let mut header = Vec::with_capacity(10);
    (&mut *source).take(10).read_to_end(&mut header)?;
    if header.len() < 10 || &header[..3] != b"ID3" {
        return Ok(0);
    }

    // synchsafe: 7 significant bits per byte
    let size = header[6..10]
        .iter()
        .fold(0u64, |acc, &b| (acc << 7) | u64::from(b & 0x7F));
    let footer = if header[5] & 0x10 != 0 { 10 } else { 0 };
    Ok(10 + size + footer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    // MPEG-1 Layer III, 128 kbps, 44100 Hz, no padding, stereo
    const MP3_128_44K: [u8; 4] = [0xFF, 0xFB, 0x90, 0x00];

    #[test]
    fn decodes_mpeg1_layer3_header() {
        let h = FrameHeader::decode(MP3_128_44K).unwrap();
        assert_eq!(h.version, MpegVersion::V1);
        assert_eq!(h.layer, Layer::III);
        assert_eq!(h.bitrate_kbps, 128);
        assert_eq!(h.sample_rate_hz, 44100);
        assert!(!h.padding);
        assert_eq!(h.channel_mode, ChannelMode::Stereo);
        assert_eq!(h.frame_length(), 417);
        assert_eq!(h.samples_per_frame(), 1152);
    }

    #[test]
    fn decodes_other_versions_layers_and_modes() {
        // MPEG-2 Layer III, index 8 -> 64 kbps, 22050 Hz, padded, mono
        let h = FrameHeader::decode([0xFF, 0xF3, 0x82, 0xC0]).unwrap();
        assert_eq!(h.version, MpegVersion::V2);
        assert_eq!(h.bitrate_kbps, 64);
        assert_eq!(h.sample_rate_hz, 22050);
        assert!(h.padding);
        assert_eq!(h.channel_mode, ChannelMode::Mono);

        // MPEG-2.5 Layer III, 8000 Hz, joint stereo
        let h = FrameHeader::decode([0xFF, 0xE3, 0x18, 0x40]).unwrap();
        assert_eq!(h.version, MpegVersion::V25);
        assert_eq!(h.bitrate_kbps, 8);
        assert_eq!(h.sample_rate_hz, 8000);
        assert_eq!(h.channel_mode, ChannelMode::JointStereo);

        // MPEG-1 Layer I, 448 kbps, 48000 Hz, dual channel
        let h = FrameHeader::decode([0xFF, 0xFF, 0xE4, 0x80]).unwrap();
        assert_eq!(h.layer, Layer::I);
        assert_eq!(h.bitrate_kbps, 448);
        assert_eq!(h.sample_rate_hz, 48000);
        assert_eq!(h.channel_mode, ChannelMode::DualChannel);
        assert_eq!(h.samples_per_frame(), 384);
        assert_eq!(h.frame_length(), (12 * 448_000 / 48000) * 4);
    }

    #[test]
    fn rejects_reserved_and_unsynced_headers() {
        // version bits 01
        assert!(FrameHeader::decode([0xFF, 0xEB, 0x90, 0x00]).is_none());
        // layer bits 00
        assert!(FrameHeader::decode([0xFF, 0xF9, 0x90, 0x00]).is_none());
        // bitrate index 15
        assert!(FrameHeader::decode([0xFF, 0xFB, 0xF0, 0x00]).is_none());
        // free format bitrate
        assert!(FrameHeader::decode([0xFF, 0xFB, 0x00, 0x00]).is_none());
        // sample rate index 3
        assert!(FrameHeader::decode([0xFF, 0xFB, 0x9C, 0x00]).is_none());
        // incomplete sync
        assert!(FrameHeader::decode([0xFF, 0x1B, 0x90, 0x00]).is_none());
        assert!(FrameHeader::decode([0x00, 0x00, 0x00, 0x00]).is_none());
    }

    #[test]
    fn parse_reports_header_fields_and_cbr_duration() {
        let mut bytes = MP3_128_44K.to_vec();
        bytes.resize(417 * 100, 0);
        let meta = parse_mpeg(&mut Cursor::new(bytes)).unwrap();

        assert!(meta.valid);
        assert_eq!(meta.mpeg_version, Some(MpegVersion::V1));
        assert_eq!(meta.layer, Some(Layer::III));
        assert_eq!(meta.bitrate_kbps, Some(128));
        assert_eq!(meta.sample_rate_hz, Some(44100));
        assert_eq!(meta.channel_mode, Some(ChannelMode::Stereo));
        let expected = 100.0 * 1152.0 / 44100.0;
        assert!((meta.duration_secs - expected).abs() < 1e-9);
    }

    #[test]
    fn parse_finds_header_after_junk_and_id3v2() {
        let mut bytes = b"ID3\x03\x00\x00\x00\x00\x00\x14".to_vec();
        bytes.extend_from_slice(&[0u8; 20]);
        // a lone 0xFF that is not a header
        bytes.extend_from_slice(&[0xFF, 0x00, 0x12, 0x34]);
        bytes.extend_from_slice(&MP3_128_44K);
        bytes.resize(4096, 0);
        let meta = parse_mpeg(&mut Cursor::new(bytes)).unwrap();
        assert!(meta.valid);
        assert_eq!(meta.bitrate_kbps, Some(128));
    }

    #[test]
    fn parse_gives_up_past_search_limit() {
        let mut bytes = vec![0u8; SYNC_SEARCH_LIMIT + 10];
        bytes.extend_from_slice(&MP3_128_44K);
        bytes.resize(8192, 0);
        let meta = parse_mpeg(&mut Cursor::new(bytes)).unwrap();
        assert!(!meta.valid);
        assert_eq!(meta.bitrate_kbps, None);
        assert_eq!(meta.duration_secs, 0.0);
    }

    #[test]
    fn parse_of_non_audio_and_empty_input_is_not_an_error() {
        let meta = parse_mpeg(&mut Cursor::new(b"just some text".to_vec())).unwrap();
        assert_eq!(meta, AudioMetadata::default());
        let meta = parse_mpeg(&mut Cursor::new(Vec::new())).unwrap();
        assert!(!meta.valid);
    }

    #[test]
    fn xing_header_corrects_duration_and_bitrate() {
        let mut bytes = MP3_128_44K.to_vec();
        bytes.extend_from_slice(&[0u8; 32]);
        bytes.extend_from_slice(b"Xing");
        bytes.extend_from_slice(&3u32.to_be_bytes());
        bytes.extend_from_slice(&1000u32.to_be_bytes());
        bytes.extend_from_slice(&500_000u32.to_be_bytes());
        bytes.resize(500_000, 0);

        let meta = parse_mpeg(&mut Cursor::new(bytes)).unwrap();
        let expected = 1000.0 * 1152.0 / 44100.0;
        assert!((meta.duration_secs - expected).abs() < 1e-9);
        assert!((meta.duration_secs - 26.12).abs() < 0.01);
        assert_eq!(meta.bitrate_kbps, Some(153));
    }

    #[test]
    fn xing_without_byte_count_keeps_header_bitrate() {
        let mut frame = MP3_128_44K.to_vec();
        frame.extend_from_slice(b"Xing");
        frame.extend_from_slice(&1u32.to_be_bytes());
        frame.extend_from_slice(&50u32.to_be_bytes());
        let xing = XingHeader::find(&frame).unwrap();
        assert_eq!(xing, XingHeader { frames: Some(50), bytes: None });
    }

    #[test]
    fn xing_marker_beyond_search_limit_is_ignored() {
        let mut frame = MP3_128_44K.to_vec();
        frame.resize(XING_SEARCH_LIMIT, 0);
        frame.extend_from_slice(b"Xing");
        frame.extend_from_slice(&3u32.to_be_bytes());
        frame.extend_from_slice(&[0u8; 8]);
        assert!(XingHeader::find(&frame).is_none());
    }

    #[test]
    fn truncated_xing_fields_are_ignored() {
        let mut frame = MP3_128_44K.to_vec();
        frame.extend_from_slice(b"Xing");
        frame.extend_from_slice(&3u32.to_be_bytes());
        frame.extend_from_slice(&[0u8; 2]);
        assert!(XingHeader::find(&frame).is_none());
    }

    #[test]
    fn parse_restores_read_position() {
        let mut bytes = MP3_128_44K.to_vec();
        bytes.resize(2048, 0);
        let mut cursor = Cursor::new(bytes);
        cursor.set_position(7);
        parse_mpeg(&mut cursor).unwrap();
        assert_eq!(cursor.position(), 7);
    }
}
