use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use edna::catalog::{Catalog, Source};
use edna::config::ListingSettings;
use edna::index::SharedIndex;
use edna::server::{DISPLAY_NAME_HEADER, create_router};
use http_body_util::BodyExt;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

async fn test_app(with_index: bool) -> (TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let music = dir.path().join("music");
    fs::create_dir_all(music.join("Alpha")).unwrap();
    let bytes: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    fs::write(music.join("Alpha/Alpha - 01 - Intro.mp3"), &bytes).unwrap();
    fs::write(
        music.join("Alpha/mix.m3u"),
        "#EXTM3U\nAlpha - 01 - Intro.mp3\n/etc/passwd\n",
    )
    .unwrap();

    let settings = ListingSettings::default();
    let sources = vec![Source::new(music, "Music".into())];
    let catalog = Catalog::new(sources.clone(), &settings);

    let index = if with_index {
        let shared = Arc::new(SharedIndex::new(sources, catalog.scanner().clone()));
        shared.refresh().await;
        Some(shared)
    } else {
        None
    };

    let router = create_router(Arc::new(catalog), index, "localhost:8080".into());
    (dir, router)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn root_listing_is_json() {
    let (_dir, app) = test_app(false).await;
    let response = app.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["subdirectories"][0]["href"], "Music/");
}

#[tokio::test]
async fn directory_without_slash_redirects() {
    let (_dir, app) = test_app(false).await;
    let response = app.oneshot(get("/Music/Alpha")).await.unwrap();
    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.headers()[header::LOCATION], "/Music/Alpha/");
}

#[tokio::test]
async fn generated_playlist_uses_host_header() {
    let (_dir, app) = test_app(false).await;
    let request = Request::builder()
        .uri("/Music/Alpha/all.m3u")
        .header(header::HOST, "music.lan:9000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/x-mpegurl");
    let expected = "http://music.lan:9000/Music/Alpha/Alpha%20-%2001%20-%20Intro.mp3\n";
    assert_eq!(
        response.headers()[header::CONTENT_LENGTH],
        expected.len().to_string().as_str()
    );
    assert_eq!(body_text(response).await, expected);
}

#[tokio::test]
async fn user_playlist_is_rewritten() {
    let (_dir, app) = test_app(false).await;
    let response = app.oneshot(get("/Music/Alpha/mix.m3u")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_text(response).await,
        "#EXTM3U\nhttp://localhost:8080/Music/Alpha/Alpha%20-%2001%20-%20Intro.mp3\n"
    );
}

#[tokio::test]
async fn song_streams_whole_and_by_range() {
    let (_dir, app) = test_app(false).await;
    let uri = "/Music/Alpha/Alpha%20-%2001%20-%20Intro.mp3";

    let response = app.clone().oneshot(get(uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
    assert_eq!(response.headers()[DISPLAY_NAME_HEADER], "Intro");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body.len(), 1000);

    let request = Request::builder()
        .uri(uri)
        .header(header::RANGE, "bytes=10-19")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 10-19/1000");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let expected: Vec<u8> = (10..20u8).collect();
    assert_eq!(body.as_ref(), expected.as_slice());
}

#[tokio::test]
async fn errors_map_to_status_codes() {
    let (_dir, app) = test_app(false).await;
    let response = app.clone().oneshot(get("/Music/../../etc")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.clone().oneshot(get("/Nowhere/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(get("/Music/Alpha/missing.mp3")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn search_needs_the_index() {
    let (_dir, app) = test_app(false).await;
    let response = app.oneshot(get("/search?q=intro")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let (_dir, app) = test_app(true).await;
    let response = app.oneshot(get("/search?q=INTRO")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json[0]["href"], "/Music/Alpha/Alpha%20-%2001%20-%20Intro.mp3");
}
