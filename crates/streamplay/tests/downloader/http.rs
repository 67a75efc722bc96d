use std::time::Duration;

use reqwest::Client;
use streamplay::{
    HttpDownloader, MemorySink, PlaybackConfig, PlaybackContext, PlaybackOutcome,
    StreamOrchestrator, SystemClock,
};
use tokio_util::sync::CancellationToken;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

async fn mock(server: &MockServer, mock_path: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(mock_path))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_http_hls_playback() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mock(&server, "/show/master.m3u8", include_str!("../fixtures/hls/master.m3u8")).await;
    mock(&server, "/show/low/index.m3u8", include_str!("../fixtures/hls/vod.m3u8")).await;
    for i in 0..3 {
        mock(&server, &format!("/show/low/seg{i}.ts"), "ts").await;
    }

    let downloader = HttpDownloader::new(Client::builder().timeout(Duration::from_secs(5)))?;
    let sink = MemorySink::new();
    let clock = SystemClock;
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, CancellationToken::new());

    let config = PlaybackConfig::new(format!("{}/show/master.m3u8", server.uri()).parse()?);
    let outcome = StreamOrchestrator::new(config).run(&ctx).await?;

    assert_eq!(
        outcome,
        PlaybackOutcome::Completed {
            played: 12.0,
            segments: 3
        }
    );
    assert!(sink.failures().is_empty());
    assert_eq!(
        sink.labels(),
        vec![
            "master playlist",
            "media playlist",
            "media segment",
            "media segment",
            "media segment"
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_http_segment_not_found() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mock(&server, "/show/master.m3u8", include_str!("../fixtures/hls/master.m3u8")).await;
    mock(&server, "/show/low/index.m3u8", include_str!("../fixtures/hls/vod.m3u8")).await;
    mock(&server, "/show/low/seg0.ts", "ts").await;

    let downloader = HttpDownloader::new(Client::builder())?;
    let sink = MemorySink::new();
    let clock = SystemClock;
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, CancellationToken::new());

    let config = PlaybackConfig::new(format!("{}/show/master.m3u8", server.uri()).parse()?);
    let mut orchestrator = StreamOrchestrator::new(config);
    let result = orchestrator.run(&ctx).await;
    assert!(result.is_err());

    let failures = sink.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].label, "media segment");
    assert_eq!(failures[0].result.status, Some(404));
    assert!(failures[0].result.uri.path().ends_with("seg1.ts"));

    // the completed segment stays committed
    let state = orchestrator
        .controller(streamplay::TrackKind::Media)
        .state();
    assert_eq!(state.last.as_ref().map(|p| p.sequence), Some(0));
    Ok(())
}

#[tokio::test]
async fn test_http_relative_uris_use_requested_uri() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/show/master.m3u8"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", "/moved/master.m3u8"),
        )
        .mount(&server)
        .await;
    mock(&server, "/moved/master.m3u8", include_str!("../fixtures/hls/master.m3u8")).await;
    mock(&server, "/show/low/index.m3u8", include_str!("../fixtures/hls/vod.m3u8")).await;
    for i in 0..3 {
        mock(&server, &format!("/show/low/seg{i}.ts"), "ts").await;
    }

    let downloader = HttpDownloader::new(Client::builder())?;
    let sink = MemorySink::new();
    let clock = SystemClock;
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, CancellationToken::new());

    let config = PlaybackConfig::new(format!("{}/show/master.m3u8", server.uri()).parse()?);
    StreamOrchestrator::new(config).run(&ctx).await?;

    assert!(sink.failures().is_empty());
    assert_eq!(
        sink.samples()[1].result.uri.path(),
        "/show/low/index.m3u8"
    );
    Ok(())
}
