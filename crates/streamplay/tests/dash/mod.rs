use std::time::Duration;

use chrono::{DateTime, Utc};
use streamplay::{
    ManualClock, MemorySink, PlayDuration, PlaybackConfig, PlaybackContext, PlaybackOutcome,
    PlaybackPhase, ProtocolMode, SelectionPolicy, StreamOrchestrator, TrackKind,
};
use tokio_util::sync::CancellationToken;

use crate::{downloader::ScriptedDownloader, AssertWrapper};

const VIDEO_ONLY: &str = "https://cdn.example.com/vod/video_only.mpd";
const VOD: &str = "https://cdn.example.com/vod/manifest.mpd";
const LIVE: &str = "https://cdn.example.com/live/manifest.mpd";

fn start() -> DateTime<Utc> {
    "2024-01-01T00:00:00Z".parse().unwrap()
}

#[tokio::test]
async fn test_play_duration_stops_template() -> anyhow::Result<()> {
    let downloader = ScriptedDownloader::new()
        .route(VIDEO_ONLY, include_str!("../fixtures/dash/video_only.mpd"));
    let sink = MemorySink::new();
    let clock = ManualClock::new(start());
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, CancellationToken::new());

    let mut config = PlaybackConfig::new(VIDEO_ONLY.parse()?);
    config.play = PlayDuration::Seconds(8.0);
    let outcome = StreamOrchestrator::new(config).run(&ctx).await.assert_success();

    assert_eq!(
        outcome,
        PlaybackOutcome::Completed {
            played: 8.0,
            segments: 2
        }
    );
    assert_eq!(
        downloader.requests(),
        vec![
            VIDEO_ONLY,
            "https://cdn.example.com/vod/video/init.mp4",
            "https://cdn.example.com/vod/video/seg-1.m4s",
            "https://cdn.example.com/vod/video/seg-2.m4s",
        ]
    );
    assert_eq!(
        sink.labels(),
        vec!["manifest", "media init", "media segment", "media segment"]
    );
    Ok(())
}

#[tokio::test]
async fn test_audio_follows_video() -> anyhow::Result<()> {
    let downloader =
        ScriptedDownloader::new().route(VOD, include_str!("../fixtures/dash/vod.mpd"));
    let sink = MemorySink::new();
    let clock = ManualClock::new(start());
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, CancellationToken::new());

    let mut orchestrator = StreamOrchestrator::new(PlaybackConfig::new(VOD.parse()?));
    let outcome = orchestrator.run(&ctx).await?;
    assert_eq!(
        outcome,
        PlaybackOutcome::Completed {
            played: 16.0,
            segments: 4
        }
    );

    let requests = downloader.requests();
    assert_eq!(requests[1], "https://cdn.example.com/vod/video/360p/init.mp4");
    assert_eq!(requests[2], "https://cdn.example.com/vod/video/360p/00001.m4s");
    assert_eq!(requests[3], "https://cdn.example.com/vod/audio/128000/init.mp4");
    assert_eq!(requests[4], "https://cdn.example.com/vod/audio/128000/1.m4s");
    // one init per track
    assert_eq!(requests.iter().filter(|uri| uri.ends_with("init.mp4")).count(), 2);
    assert_eq!(orchestrator.controller(TrackKind::Audio).played(), 16.0);
    assert_eq!(
        orchestrator.controller(TrackKind::Subtitles).phase(),
        PlaybackPhase::Ended
    );
    assert!(sink.failures().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_highest_bandwidth() -> anyhow::Result<()> {
    let downloader =
        ScriptedDownloader::new().route(VOD, include_str!("../fixtures/dash/vod.mpd"));
    let sink = MemorySink::new();
    let clock = ManualClock::new(start());
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, CancellationToken::new());

    let mut config = PlaybackConfig::new(VOD.parse()?);
    config.bandwidth = SelectionPolicy::Max;
    config.play = PlayDuration::Seconds(4.0);
    let mut orchestrator = StreamOrchestrator::new(config);
    orchestrator.run(&ctx).await?;

    assert_eq!(
        orchestrator
            .controller(TrackKind::Media)
            .state()
            .representation
            .as_deref(),
        Some("720p")
    );
    assert!(downloader
        .requests()
        .contains(&"https://cdn.example.com/vod/video/720p/00001.m4s".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_no_matching_representation() -> anyhow::Result<()> {
    let downloader =
        ScriptedDownloader::new().route(VOD, include_str!("../fixtures/dash/vod.mpd"));
    let sink = MemorySink::new();
    let clock = ManualClock::new(start());
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, CancellationToken::new());

    let mut config = PlaybackConfig::new(VOD.parse()?);
    config.resolution = SelectionPolicy::Custom(Some("3840x2160".parse()?));
    let outcome = StreamOrchestrator::new(config).run(&ctx).await?;

    assert_eq!(outcome, PlaybackOutcome::NoMatchingMedia);
    assert_eq!(sink.labels(), vec!["manifest", "media playlist"]);
    assert_eq!(sink.failures().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_forced_protocol() -> anyhow::Result<()> {
    // no .mpd suffix, so auto detection would not pick DASH either way
    let uri = "https://cdn.example.com/vod/stream?format=dash";
    let downloader = ScriptedDownloader::new().route(uri, include_str!("../fixtures/dash/vod.mpd"));
    let sink = MemorySink::new();
    let clock = ManualClock::new(start());
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, CancellationToken::new());

    let mut config = PlaybackConfig::new(uri.parse()?);
    config.protocol = ProtocolMode::Dash;
    config.play = PlayDuration::Seconds(4.0);
    StreamOrchestrator::new(config).run(&ctx).await?;

    assert_eq!(sink.labels()[0], "manifest");
    assert!(sink.failures().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_invalid_manifest() -> anyhow::Result<()> {
    let downloader = ScriptedDownloader::new().route(VOD, "#EXTM3U\n");
    let sink = MemorySink::new();
    let clock = ManualClock::new(start());
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, CancellationToken::new());

    StreamOrchestrator::new(PlaybackConfig::new(VOD.parse()?))
        .run(&ctx)
        .await
        .assert_error();

    let failures = sink.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].label, "manifest");
    Ok(())
}

#[tokio::test]
async fn test_live_timeline_reload() -> anyhow::Result<()> {
    let downloader = ScriptedDownloader::new()
        .route(LIVE, include_str!("../fixtures/dash/live_1.mpd"))
        .route(LIVE, include_str!("../fixtures/dash/live_2.mpd"))
        .route(LIVE, include_str!("../fixtures/dash/live_3.mpd"));
    let sink = MemorySink::new();
    // the presentation delay puts the start at the first segment
    let clock = ManualClock::new(start() + chrono::Duration::seconds(6));
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, CancellationToken::new());

    let outcome = StreamOrchestrator::new(PlaybackConfig::new(LIVE.parse()?))
        .run(&ctx)
        .await?;
    assert_eq!(
        outcome,
        PlaybackOutcome::Completed {
            played: 8.0,
            segments: 4
        }
    );

    let segments: Vec<_> = downloader
        .requests()
        .into_iter()
        .filter(|uri| uri.ends_with(".m4s"))
        .collect();
    assert_eq!(
        segments,
        vec![
            "https://cdn.example.com/live/live/0.m4s",
            "https://cdn.example.com/live/live/2.m4s",
            "https://cdn.example.com/live/live/4.m4s",
            "https://cdn.example.com/live/live/6.m4s",
        ]
    );
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(2); 2]);
    Ok(())
}

#[tokio::test]
async fn test_live_waits_for_availability() -> anyhow::Result<()> {
    let downloader =
        ScriptedDownloader::new().route(LIVE, include_str!("../fixtures/dash/live_1.mpd"));
    let sink = MemorySink::new();
    // live position is 0s but the first segment only completes at 2s
    let clock = ManualClock::new(start() + chrono::Duration::milliseconds(500));
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, CancellationToken::new());

    let mut config = PlaybackConfig::new(LIVE.parse()?);
    config.play = PlayDuration::Seconds(2.0);
    StreamOrchestrator::new(config).run(&ctx).await?;

    assert_eq!(clock.sleeps(), vec![Duration::from_millis(1500)]);
    assert!(downloader
        .requests()
        .contains(&"https://cdn.example.com/live/live/0.m4s".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_resume_by_period_and_number() -> anyhow::Result<()> {
    let downloader = ScriptedDownloader::new()
        .route(VIDEO_ONLY, include_str!("../fixtures/dash/video_only.mpd"));
    let sink = MemorySink::new();
    let clock = ManualClock::new(start());
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, CancellationToken::new());

    let mut config = PlaybackConfig::new(VIDEO_ONLY.parse()?);
    config.play = PlayDuration::Seconds(4.0);
    config.resume = true;
    let mut orchestrator = StreamOrchestrator::new(config);
    for _ in 0..3 {
        orchestrator.run(&ctx).await?;
    }

    let segments: Vec<_> = downloader
        .requests()
        .into_iter()
        .filter(|uri| uri.ends_with(".m4s"))
        .collect();
    assert_eq!(
        segments,
        vec![
            "https://cdn.example.com/vod/video/seg-1.m4s",
            "https://cdn.example.com/vod/video/seg-2.m4s",
            "https://cdn.example.com/vod/video/seg-3.m4s",
        ]
    );
    let state = orchestrator.controller(TrackKind::Media).state();
    assert_eq!(state.last.as_ref().map(|p| p.period.as_str()), Some("#0"));
    assert_eq!(state.consumed, 12.0);
    Ok(())
}

#[tokio::test]
async fn test_live_sliding_window() -> anyhow::Result<()> {
    // timeline numbering restarts with every window
    let downloader = ScriptedDownloader::new()
        .route(LIVE, include_str!("../fixtures/dash/slide_1.mpd"))
        .route(LIVE, include_str!("../fixtures/dash/slide_2.mpd"))
        .route(LIVE, include_str!("../fixtures/dash/slide_3.mpd"));
    let sink = MemorySink::new();
    let clock = ManualClock::new(start() + chrono::Duration::seconds(6));
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, CancellationToken::new());

    let outcome = StreamOrchestrator::new(PlaybackConfig::new(LIVE.parse()?))
        .run(&ctx)
        .await?;
    assert_eq!(
        outcome,
        PlaybackOutcome::Completed {
            played: 10.0,
            segments: 5
        }
    );

    let segments: Vec<_> = downloader
        .requests()
        .into_iter()
        .filter(|uri| uri.ends_with(".m4s"))
        .collect();
    assert_eq!(
        segments,
        vec![
            "https://cdn.example.com/live/live/0.m4s",
            "https://cdn.example.com/live/live/2.m4s",
            "https://cdn.example.com/live/live/4.m4s",
            "https://cdn.example.com/live/live/6.m4s",
            "https://cdn.example.com/live/live/8.m4s",
        ]
    );
    assert_eq!(
        downloader.requests().iter().filter(|uri| *uri == LIVE).count(),
        3
    );
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(2); 2]);
    Ok(())
}

#[tokio::test]
async fn test_unresolvable_segment_uri() -> anyhow::Result<()> {
    const BAD_HOST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" type="static" mediaPresentationDuration="PT8S" minBufferTime="PT2S" profiles="urn:mpeg:dash:profile:isoff-live:2011">
  <Period id="p0">
    <AdaptationSet contentType="video" mimeType="video/mp4">
      <SegmentTemplate media="https://$RepresentationID$.cdn.example.com/$Number$.m4s" startNumber="1" timescale="1" duration="4"/>
      <Representation id="bad id" bandwidth="1000000"/>
    </AdaptationSet>
  </Period>
</MPD>
"#;
    let downloader = ScriptedDownloader::new().route(VOD, BAD_HOST);
    let sink = MemorySink::new();
    let clock = ManualClock::new(start());
    let ctx = PlaybackContext::new(&downloader, &sink, &clock, CancellationToken::new());

    let mut orchestrator = StreamOrchestrator::new(PlaybackConfig::new(VOD.parse()?));
    let error = orchestrator.run(&ctx).await.unwrap_err();
    assert_eq!(error.kind(), streamplay::FailureKind::Parse);

    assert_eq!(sink.labels(), vec!["manifest", "media segment"]);
    let failures = sink.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].label, "media segment");
    assert_eq!(failures[0].result.uri.as_str(), VOD);
    assert_eq!(
        orchestrator.controller(TrackKind::Media).phase(),
        PlaybackPhase::Failed
    );
    assert_eq!(downloader.requests(), vec![VOD]);
    Ok(())
}
