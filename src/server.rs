use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;

use crate::catalog::{Catalog, Target};
use crate::error::CatalogError;
use crate::index::{SearchHit, SharedIndex};
use crate::library::{EntryKind, extension_of};
use crate::path::encode_segment;
use crate::playlist::{M3U_CONTENT_TYPE, to_m3u};

/// Response header carrying a song's percent-encoded display title.
pub const DISPLAY_NAME_HEADER: &str = "x-display-name";

const DEFAULT_SEARCH_LIMIT: usize = 100;
const MAX_SEARCH_LIMIT: usize = 1000;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub index: Option<Arc<SharedIndex>>,
    /// Used for playlist URLs when a request has no `Host` header.
    pub default_host: String,
}

pub fn create_router(
    catalog: Arc<Catalog>,
    index: Option<Arc<SharedIndex>>,
    default_host: String,
) -> Router {
    let state = AppState {
        catalog,
        index,
        default_host,
    };

    Router::new()
        .route("/search", get(search))
        .route("/", get(browse))
        .route("/*path", get(browse))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        let status = match &self {
            CatalogError::IllegalPath(_) => StatusCode::BAD_REQUEST,
            CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
            CatalogError::Io(_) | CatalogError::MalformedPlaylistLine { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

/// Run a catalog call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, CatalogError>
where
    F: FnOnce() -> Result<T, CatalogError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CatalogError::Io(std::io::Error::other(e)))?
}

/// Directory listings, playlists and files under the configured sources
async fn browse(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, CatalogError> {
    let raw = uri.path().to_string();
    tracing::debug!("Browsing {}", raw);

    let catalog = Arc::clone(&state.catalog);
    let path = raw.clone();
    let located = blocking(move || catalog.locate(&path)).await?;

    match located.target.clone() {
        Target::Directory { .. } if !raw.ends_with('/') => {
            // relative hrefs in the listing need the trailing slash
            Ok((
                StatusCode::MOVED_PERMANENTLY,
                [(header::LOCATION, format!("{}/", raw))],
            )
                .into_response())
        }
        Target::Root | Target::Directory { .. } => {
            let catalog = Arc::clone(&state.catalog);
            let listing = blocking(move || catalog.list(&located)).await?;
            Ok(Json(listing).into_response())
        }
        Target::GeneratedPlaylist { .. } | Target::SongPlaylist { .. } => {
            let origin = origin(&headers, &state.default_host);
            let catalog = Arc::clone(&state.catalog);
            let lines = blocking(move || catalog.playlist(&located, &origin)).await?;
            Ok(m3u_response(to_m3u(&lines)))
        }
        Target::File {
            kind: EntryKind::Playlist,
            ..
        } => {
            let origin = origin(&headers, &state.default_host);
            let catalog = Arc::clone(&state.catalog);
            let rewritten = blocking(move || catalog.rewrite_playlist(&located, &origin)).await?;
            if !rewritten.dropped.is_empty() {
                tracing::debug!("Dropped {} playlist entries from {}", rewritten.dropped.len(), raw);
            }
            Ok(m3u_response(to_m3u(&rewritten.lines)))
        }
        Target::File { path, .. } => {
            let display = state.catalog.song_display_text(&located);
            stream_file(path, display, &headers).await
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: String,
    limit: Option<usize>,
}

/// Filename search over the name index
async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<SearchHit>>, CatalogError> {
    let index = state
        .index
        .as_ref()
        .ok_or_else(|| CatalogError::not_found("/search"))?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .min(MAX_SEARCH_LIMIT);

    let hits = index.search(&params.q, limit).await;
    tracing::debug!("Search {:?}: {} hits", params.q, hits.len());
    Ok(Json(hits))
}

/// `http://host[:port]` for absolute playlist URLs.
fn origin(headers: &HeaderMap, default_host: &str) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or(default_host);
    format!("http://{}", host)
}

fn m3u_response(body: String) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, M3U_CONTENT_TYPE.to_string()),
            (header::CONTENT_LENGTH, body.len().to_string()),
        ],
        body,
    )
        .into_response()
}

/// Content type by file extension.
pub fn content_type(name: &str) -> &'static str {
    match extension_of(name).as_deref() {
        Some("mp3" | "mp2" | "mpga") => "audio/mpeg",
        Some("ogg") => "audio/ogg",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        Some("m4a") => "audio/mp4",
        Some("wma") => "audio/x-ms-wma",
        Some("aac") => "audio/aac",
        Some("gif") => "image/gif",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("bmp") => "image/bmp",
        Some("m3u") => M3U_CONTENT_TYPE,
        Some("txt" | "nfo") => "text/plain; charset=utf-8",
        Some("html" | "htm") => "text/html; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Stream a file with HTTP Range support
async fn stream_file(
    path: PathBuf,
    display: Option<String>,
    headers: &HeaderMap,
) -> Result<Response, CatalogError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let content_type = content_type(&name);

    let file_size = tokio::fs::metadata(&path).await?.len();

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|r| parse_range(r, file_size));

    let mut response = match range {
        Some((start, end)) => stream_range(&path, start, end, file_size, content_type).await?,
        None => {
            let file = tokio::fs::File::open(&path).await?;
            tracing::debug!("Streaming {} ({} bytes)", path.display(), file_size);
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type.to_string()),
                    (header::CONTENT_LENGTH, file_size.to_string()),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                ],
                Body::from_stream(ReaderStream::new(file)),
            )
                .into_response()
        }
    };

    if let Some(display) = display {
        if let Ok(value) = HeaderValue::from_str(&encode_segment(&display)) {
            response.headers_mut().insert(DISPLAY_NAME_HEADER, value);
        }
    }
    Ok(response)
}

/// Parse Range header value
/// Returns (start, end) tuple if valid
fn parse_range(range_str: &str, file_size: u64) -> Option<(u64, u64)> {
    // "bytes=start-end", "bytes=start-" or "bytes=-suffix"; one range only
    let range_part = range_str.strip_prefix("bytes=")?;
    let (start_str, end_str) = range_part.split_once('-')?;
    let start_str = start_str.trim();
    let end_str = end_str.trim();
    if end_str.contains(['-', ',']) {
        return None;
    }

    match (start_str.is_empty(), end_str.is_empty()) {
        (false, false) => {
            let start = start_str.parse::<u64>().ok()?;
            let end = end_str.parse::<u64>().ok()?;
            if start > end || start >= file_size {
                return None;
            }
            Some((start, end.min(file_size - 1)))
        }
        (false, true) => {
            let start = start_str.parse::<u64>().ok()?;
            if start >= file_size {
                return None;
            }
            Some((start, file_size - 1))
        }
        (true, false) => {
            let suffix_length = end_str.parse::<u64>().ok()?;
            if suffix_length == 0 || suffix_length > file_size {
                return None;
            }
            Some((file_size - suffix_length, file_size - 1))
        }
        (true, true) => None,
    }
}

/// Stream a range of bytes from a file
async fn stream_range(
    path: &std::path::Path,
    start: u64,
    end: u64,
    total_size: u64,
    content_type: &str,
) -> Result<Response, CatalogError> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(start)).await?;

    let range_length = end - start + 1;
    tracing::debug!(
        "Streaming range {}-{}/{} ({} bytes) of {}",
        start,
        end,
        total_size,
        range_length,
        path.display()
    );

    Ok((
        StatusCode::PARTIAL_CONTENT,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_LENGTH, range_length.to_string()),
            (header::ACCEPT_RANGES, "bytes".to_string()),
            (
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", start, end, total_size),
            ),
        ],
        Body::from_stream(ReaderStream::new(file.take(range_length))),
    )
        .into_response())
}
