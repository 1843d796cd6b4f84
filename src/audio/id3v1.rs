//! ID3v1 and ID3v1.1 trailers: the last 128 bytes of a file.

use std::io::{self, Read, Seek, SeekFrom};

use super::AudioMetadata;

pub const TAG_LEN: u64 = 128;

/// Reported for genre indices past the end of [`GENRES`].
pub const UNKNOWN_GENRE: &str = "Unknown";

/// Genre names by ID3v1 index, including the Winamp extensions.
pub const GENRES: [&str; 192] = [
    "Blues", "Classic Rock", "Country", "Dance", "Disco", "Funk", "Grunge", "Hip-Hop",
    "Jazz", "Metal", "New Age", "Oldies", "Other", "Pop", "R&B", "Rap",
    "Reggae", "Rock", "Techno", "Industrial", "Alternative", "Ska", "Death Metal", "Pranks",
    "Soundtrack", "Euro-Techno", "Ambient", "Trip-Hop", "Vocal", "Jazz+Funk", "Fusion", "Trance",
    "Classical", "Instrumental", "Acid", "House", "Game", "Sound Clip", "Gospel", "Noise",
    "AlternRock", "Bass", "Soul", "Punk", "Space", "Meditative", "Instrumental Pop",
    "Instrumental Rock", "Ethnic", "Gothic", "Darkwave", "Techno-Industrial", "Electronic",
    "Pop-Folk", "Eurodance", "Dream", "Southern Rock", "Comedy", "Cult", "Gangsta", "Top 40",
    "Christian Rap", "Pop/Funk", "Jungle", "Native American", "Cabaret", "New Wave",
    "Psychadelic", "Rave", "Showtunes", "Trailer", "Lo-Fi", "Tribal", "Acid Punk", "Acid Jazz",
    "Polka", "Retro", "Musical", "Rock & Roll", "Hard Rock", "Folk", "Folk-Rock",
    "National Folk", "Swing", "Fast Fusion", "Bebob", "Latin", "Revival", "Celtic", "Bluegrass",
    "Avantgarde", "Gothic Rock", "Progressive Rock", "Psychedelic Rock", "Symphonic Rock",
    "Slow Rock", "Big Band", "Chorus", "Easy Listening", "Acoustic", "Humour", "Speech",
    "Chanson", "Opera", "Chamber Music", "Sonata", "Symphony", "Booty Bass", "Primus",
    "Porn Groove", "Satire", "Slow Jam", "Club", "Tango", "Samba", "Folklore", "Ballad",
    "Power Ballad", "Rhythmic Soul", "Freestyle", "Duet", "Punk Rock", "Drum Solo", "A capella",
    "Euro-House", "Dance Hall", "Goa", "Drum & Bass", "Club-House", "Hardcore", "Terror",
    "Indie", "BritPop", "Negerpunk", "Polsk Punk", "Beat", "Christian Gangsta Rap",
    "Heavy Metal", "Black Metal", "Crossover", "Contemporary Christian", "Christian Rock",
    "Merengue", "Salsa", "Thrash Metal", "Anime", "JPop", "Synthpop", "Abstract", "Art Rock",
    "Baroque", "Bhangra", "Big Beat", "Breakbeat", "Chillout", "Downtempo", "Dub", "EBM",
    "Eclectic", "Electro", "Electroclash", "Emo", "Experimental", "Garage", "Global", "IDM",
    "Illbient", "Industro-Goth", "Jam Band", "Krautrock", "Leftfield", "Lounge", "Math Rock",
    "New Romantic", "Nu-Breakz", "Post-Punk", "Post-Rock", "Psytrance", "Shoegaze",
    "Space Rock", "Trop Rock", "World Music", "Neoclassical", "Audiobook", "Audio Theatre",
    "Neue Deutsche Welle", "Podcast", "Indie Rock", "G-Funk", "Dubstep", "Garage Rock",
    "Psybient",
];

pub fn genre_name(index: u8) -> &'static str {
    GENRES.get(usize::from(index)).copied().unwrap_or(UNKNOWN_GENRE)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Id3v1Tag {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<String>,
    pub comment: Option<String>,
    pub track: Option<u8>,
    pub genre: String,
}

impl Id3v1Tag {
    /// Decode a 128-byte trailer. `None` unless it starts with `TAG`.
    pub fn parse(block: &[u8]) -> Option<Self> {
        if block.len() != TAG_LEN as usize || &block[..3] != b"TAG" {
            return None;
        }

        let comment_field = &block[97..127];
        // ID3v1.1: a zero at byte 28 turns byte 29 into the track number
        let (comment, track) = if comment_field[28] == 0 {
            let track = Some(comment_field[29]).filter(|&t| t != 0);
            (&comment_field[..28], track)
        } else {
            (comment_field, None)
        };

        Some(Self {
            title: text_field(&block[3..33]),
            artist: text_field(&block[33..63]),
            album: text_field(&block[63..93]),
            year: text_field(&block[93..97]),
            comment: text_field(comment),
            track,
            genre: genre_name(block[127]).to_string(),
        })
    }

    /// Copy the tag fields into `metadata`.
    pub fn apply(self, metadata: &mut AudioMetadata) {
        metadata.title = self.title;
        metadata.artist = self.artist;
        metadata.album = self.album;
        metadata.year = self.year;
        metadata.comment = self.comment;
        metadata.track = self.track;
        metadata.genre = Some(self.genre);
    }
}

/// Read the trailer of a `file_size`-byte source, if it has one.
pub fn read_tag<R: Read + Seek>(source: &mut R, file_size: u64) -> io::Result<Option<Id3v1Tag>> {
    if file_size < TAG_LEN {
        return Ok(None);
    }
    source.seek(SeekFrom::Start(file_size - TAG_LEN))?;
    let mut block = [0u8; TAG_LEN as usize];
    source.read_exact(&mut block)?;
    Ok(Id3v1Tag::parse(&block))
}

// Latin-1 with trailing NUL and space padding dropped.
fn text_field(raw: &[u8]) -> Option<String> {
    let text: String = raw.iter().map(|&b| char::from(b)).collect();
    let text = text.trim_end_matches(['\0', ' ']);
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
