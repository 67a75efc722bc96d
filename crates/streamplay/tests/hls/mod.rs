mod live;

use chrono::{DateTime, Utc};
use streamplay::{
    ManualClock, MemorySink, PlayDuration, PlaybackConfig, PlaybackContext, PlaybackOutcome,
    PlaybackPhase, SelectionPolicy, StreamOrchestrator, TrackKind,
};
use tokio_util::sync::CancellationToken;

use crate::{downloader::ScriptedDownloader, AssertWrapper};

pub const MASTER: &str = "https://media.example.com/show/master.m3u8";
pub const LOW: &str = "https://media.example.com/show/low/index.m3u8";

pub fn start() -> DateTime<Utc> {
    "2024-01-01T00:00:00Z".parse().unwrap()
}

fn vod_downloader() -> ScriptedDownloader {
    ScriptedDownloader::new()
        .route(MASTER, include_str!("../fixtures/hls/master.m3u8"))
        .route(LOW, include_str!("../fixtures/hls/vod.m3u8"))
}

#[tokio::test]
async fn test_vod_plays_in_order() -> anyhow::Result<()> {
    let downloader = vod_downloader();
    let sink = MemorySink::new();
    let clock = ManualClock::new(start());
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, CancellationToken::new());

    let mut orchestrator = StreamOrchestrator::new(PlaybackConfig::new(MASTER.parse()?));
    let outcome = orchestrator.run(&ctx).await.assert_success();
    assert_eq!(
        outcome,
        PlaybackOutcome::Completed {
            played: 12.0,
            segments: 3
        }
    );

    assert_eq!(
        downloader.requests(),
        vec![
            MASTER,
            LOW,
            "https://media.example.com/show/low/seg0.ts",
            "https://media.example.com/show/low/seg1.ts",
            "https://media.example.com/show/low/seg2.ts",
        ]
    );
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
    assert!(sink.failures().is_empty());
    assert!(clock.sleeps().is_empty());
    assert_eq!(
        orchestrator.controller(TrackKind::Media).phase(),
        PlaybackPhase::Ended
    );
    Ok(())
}

#[tokio::test]
async fn test_master_not_found() -> anyhow::Result<()> {
    let downloader = ScriptedDownloader::new().status(MASTER, 404);
    let sink = MemorySink::new();
    let clock = ManualClock::new(start());
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, CancellationToken::new());

    let mut orchestrator = StreamOrchestrator::new(PlaybackConfig::new(MASTER.parse()?));
    orchestrator.run(&ctx).await.assert_error();

    let samples = sink.samples();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].label, "master playlist");
    assert!(!samples[0].result.success);
    assert_eq!(samples[0].result.status, Some(404));
    assert_eq!(downloader.requests(), vec![MASTER]);
    Ok(())
}

#[tokio::test]
async fn test_malformed_master() -> anyhow::Result<()> {
    let downloader = ScriptedDownloader::new().route(MASTER, "<html>maintenance</html>");
    let sink = MemorySink::new();
    let clock = ManualClock::new(start());
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, CancellationToken::new());

    StreamOrchestrator::new(PlaybackConfig::new(MASTER.parse()?))
        .run(&ctx)
        .await
        .assert_error();

    let failures = sink.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].label, "master playlist");
    assert_eq!(failures[0].result.status, Some(200));
    assert!(failures[0].result.message.is_some());
    Ok(())
}

#[tokio::test]
async fn test_selects_by_bandwidth() -> anyhow::Result<()> {
    let high = "https://media.example.com/show/high/index.m3u8";
    let downloader = vod_downloader().route(high, include_str!("../fixtures/hls/vod.m3u8"));
    let sink = MemorySink::new();
    let clock = ManualClock::new(start());
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, CancellationToken::new());

    let mut config = PlaybackConfig::new(MASTER.parse()?);
    config.bandwidth = SelectionPolicy::Max;
    config.play = PlayDuration::Seconds(4.0);
    StreamOrchestrator::new(config).run(&ctx).await?;

    assert_eq!(
        downloader.requests(),
        vec![
            MASTER,
            high,
            "https://media.example.com/show/high/seg0.ts"
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_no_matching_variant() -> anyhow::Result<()> {
    let downloader = vod_downloader();
    let sink = MemorySink::new();
    let clock = ManualClock::new(start());
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, CancellationToken::new());

    let mut config = PlaybackConfig::new(MASTER.parse()?);
    config.bandwidth = SelectionPolicy::Custom(Some(999));
    let mut orchestrator = StreamOrchestrator::new(config);
    let outcome = orchestrator.run(&ctx).await?;

    assert_eq!(outcome, PlaybackOutcome::NoMatchingMedia);
    assert_eq!(downloader.requests(), vec![MASTER]);
    assert_eq!(sink.labels(), vec!["master playlist", "media playlist"]);
    let failures = sink.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].result.message.as_deref(), Some("no matching media"));
    assert_eq!(
        orchestrator.controller(TrackKind::Media).phase(),
        PlaybackPhase::Failed
    );
    Ok(())
}

#[tokio::test]
async fn test_media_playlist_at_top_level() -> anyhow::Result<()> {
    let downloader = ScriptedDownloader::new().route(LOW, include_str!("../fixtures/hls/vod.m3u8"));
    let sink = MemorySink::new();
    let clock = ManualClock::new(start());
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, CancellationToken::new());

    let outcome = StreamOrchestrator::new(PlaybackConfig::new(LOW.parse()?))
        .run(&ctx)
        .await?;

    assert_eq!(
        outcome,
        PlaybackOutcome::Completed {
            played: 12.0,
            segments: 3
        }
    );
    assert_eq!(sink.labels()[0], "master playlist");
    assert_eq!(sink.len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_play_duration_limit() -> anyhow::Result<()> {
    let downloader = vod_downloader();
    let sink = MemorySink::new();
    let clock = ManualClock::new(start());
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, CancellationToken::new());

    // a partially covered segment is still downloaded whole
    let mut config = PlaybackConfig::new(MASTER.parse()?);
    config.play = PlayDuration::Seconds(5.0);
    let outcome = StreamOrchestrator::new(config).run(&ctx).await?;

    assert_eq!(
        outcome,
        PlaybackOutcome::Completed {
            played: 8.0,
            segments: 2
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_resume_continues_between_invocations() -> anyhow::Result<()> {
    let downloader = vod_downloader();
    let sink = MemorySink::new();
    let clock = ManualClock::new(start());
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, CancellationToken::new());

    let mut config = PlaybackConfig::new(MASTER.parse()?);
    config.play = PlayDuration::Seconds(4.0);
    config.resume = true;
    let mut orchestrator = StreamOrchestrator::new(config);

    orchestrator.run(&ctx).await?;
    orchestrator.run(&ctx).await?;
    let state = orchestrator.controller(TrackKind::Media).state();
    assert_eq!(state.last.as_ref().map(|p| p.sequence), Some(1));
    assert_eq!(state.consumed, 8.0);

    orchestrator.reset_state();
    orchestrator.run(&ctx).await?;

    let segments: Vec<_> = downloader
        .requests()
        .into_iter()
        .filter(|uri| uri.ends_with(".ts"))
        .collect();
    assert_eq!(
        segments,
        vec![
            "https://media.example.com/show/low/seg0.ts",
            "https://media.example.com/show/low/seg1.ts",
            "https://media.example.com/show/low/seg0.ts",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_without_resume_restarts() -> anyhow::Result<()> {
    let downloader = vod_downloader();
    let sink = MemorySink::new();
    let clock = ManualClock::new(start());
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, CancellationToken::new());

    let mut config = PlaybackConfig::new(MASTER.parse()?);
    config.play = PlayDuration::Seconds(4.0);
    let mut orchestrator = StreamOrchestrator::new(config);
    orchestrator.run(&ctx).await?;
    orchestrator.run(&ctx).await?;

    let segments: Vec<_> = downloader
        .requests()
        .into_iter()
        .filter(|uri| uri.ends_with(".ts"))
        .collect();
    assert_eq!(
        segments,
        vec![
            "https://media.example.com/show/low/seg0.ts",
            "https://media.example.com/show/low/seg0.ts",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_interrupt_keeps_state() -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let downloader =
        vod_downloader().interrupt_at("https://media.example.com/show/low/seg1.ts", cancel.clone());
    let sink = MemorySink::new();
    let clock = ManualClock::new(start());
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, cancel);

    let mut orchestrator = StreamOrchestrator::new(PlaybackConfig::new(MASTER.parse()?));
    let error = orchestrator.run(&ctx).await.unwrap_err();
    assert!(error.is_interrupted());

    // the interrupted download is neither recorded nor committed
    assert_eq!(sink.len(), 3);
    assert!(sink.failures().is_empty());
    let controller = orchestrator.controller(TrackKind::Media);
    assert_eq!(
        controller.state().last.as_ref().map(|p| p.sequence),
        Some(0)
    );
    assert_ne!(controller.phase(), PlaybackPhase::Failed);
    Ok(())
}
