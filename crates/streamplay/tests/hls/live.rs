use std::time::Duration;

use streamplay::{
    ManualClock, MemorySink, PlaybackConfig, PlaybackContext, PlaybackOutcome, StreamOrchestrator,
};
use tokio_util::sync::CancellationToken;

use super::start;
use crate::downloader::ScriptedDownloader;

const LIVE: &str = "https://live.example.com/channel/index.m3u8";

fn played_sequences(requests: &[String]) -> Vec<u64> {
    requests
        .iter()
        .filter_map(|uri| uri.rsplit('/').next())
        .filter_map(|name| name.strip_prefix("live")?.strip_suffix(".ts"))
        .filter_map(|sequence| sequence.parse().ok())
        .collect()
}

#[tokio::test]
async fn test_live_reloads_without_gaps() -> anyhow::Result<()> {
    let downloader = ScriptedDownloader::new()
        .route(LIVE, include_str!("../fixtures/hls/live_1.m3u8"))
        .route(LIVE, include_str!("../fixtures/hls/live_2.m3u8"))
        .route(LIVE, include_str!("../fixtures/hls/live_3.m3u8"))
        .route(LIVE, include_str!("../fixtures/hls/live_4.m3u8"));
    let sink = MemorySink::new();
    let clock = ManualClock::new(start());
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, CancellationToken::new());

    let outcome = StreamOrchestrator::new(PlaybackConfig::new(LIVE.parse()?))
        .run(&ctx)
        .await?;

    assert_eq!(
        outcome,
        PlaybackOutcome::Completed {
            played: 12.0,
            segments: 6
        }
    );
    assert_eq!(
        played_sequences(&downloader.requests()),
        vec![10, 11, 12, 13, 14, 15]
    );
    // one target duration between each reload
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(2); 3]);
    assert!(sink.failures().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_unchanged_reload_halves_wait() -> anyhow::Result<()> {
    let downloader = ScriptedDownloader::new()
        .route(LIVE, include_str!("../fixtures/hls/live_1.m3u8"))
        .route(LIVE, include_str!("../fixtures/hls/live_1.m3u8"))
        .route(LIVE, include_str!("../fixtures/hls/live_1.m3u8"))
        .route(LIVE, include_str!("../fixtures/hls/live_4.m3u8"));
    let sink = MemorySink::new();
    let clock = ManualClock::new(start());
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, CancellationToken::new());

    StreamOrchestrator::new(PlaybackConfig::new(LIVE.parse()?))
        .run(&ctx)
        .await?;

    assert_eq!(
        clock.sleeps(),
        vec![
            Duration::from_secs(2),
            Duration::from_secs(1),
            Duration::from_secs(1)
        ]
    );
    // unchanged playlists never replay segments
    assert_eq!(
        played_sequences(&downloader.requests()),
        vec![10, 11, 12, 13, 14, 15]
    );
    let playlist_loads = downloader
        .requests()
        .iter()
        .filter(|uri| uri.as_str() == LIVE)
        .count();
    assert_eq!(playlist_loads, 4);
    Ok(())
}

#[tokio::test]
async fn test_cancel_between_cycles() -> anyhow::Result<()> {
    let downloader = ScriptedDownloader::new().route(LIVE, include_str!("../fixtures/hls/live_1.m3u8"));
    let sink = MemorySink::new();
    let clock = ManualClock::new(start());
    let cancel = CancellationToken::new();
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, cancel.clone());

    let mut config = PlaybackConfig::new(LIVE.parse()?);
    config.play = streamplay::PlayDuration::Seconds(6.0);
    let mut orchestrator = StreamOrchestrator::new(config);
    orchestrator.run(&ctx).await?;

    // the play limit ends the cycle before any reload
    assert!(clock.sleeps().is_empty());

    cancel.cancel();
    let error = orchestrator.run(&ctx).await.unwrap_err();
    assert!(error.is_interrupted());
    assert_eq!(sink.len(), 4);
    Ok(())
}
