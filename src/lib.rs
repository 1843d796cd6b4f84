//! edna - a directory-browsing music server
//!
//! Serves one or more music directories over HTTP: JSON directory listings,
//! generated M3U playlists, and files streamed with Range support. Stream
//! properties and tags come from the MPEG, Xing and ID3v1 parsers in
//! [`audio`], with Ogg Vorbis behind the `ogg` feature.

pub mod audio;
pub mod catalog;
pub mod config;
pub mod error;
pub mod index;
pub mod library;
pub mod path;
pub mod playlist;
pub mod server;
