mod controller;
mod orchestrator;

use std::time::Duration;

use chrono::{DateTime, Utc};
use url::Url;

pub use controller::*;
pub use orchestrator::*;

use crate::{
    clock::Clock,
    dash::DashTrack,
    download::Downloader,
    error::PlayResult,
    hls::HlsTrack,
    segment::MediaSegment,
    sink::ResultSink,
    PlaybackContext,
};

/// Where a track stands: the period it is in and the last segment played there.
///
/// HLS playlists have no periods and use an empty key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentPosition {
    pub period: String,
    pub sequence: u64,
    /// Start of the segment relative to its period. Only DASH tracks know it.
    pub start: Option<Duration>,
}

/// What a segment source produces next.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceItem {
    Segment {
        segment: MediaSegment,
        init: Option<Url>,
        position: SegmentPosition,
    },
    /// The next segment is not available at the live edge yet.
    Wait(Duration),
    /// Nothing left in the current manifest.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    BeforeManifest,
    DownloadingSegments,
    AwaitingReload,
    /// The last reload returned an unchanged manifest.
    LivePollRetry,
    Ended,
    Failed,
}

/// Per-track bookkeeping that survives between invocations when resuming.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackState {
    pub last: Option<SegmentPosition>,
    /// Seconds of media downloaded in total.
    pub consumed: f64,
    pub manifest_uri: Option<Url>,
    pub representation: Option<String>,
}

/// Segment source behind one controller.
#[derive(Debug, Clone)]
pub enum TrackSource {
    Hls(HlsTrack),
    Dash(DashTrack),
    /// A rendition that turned out to be a single file, already downloaded.
    Opaque,
}

impl TrackSource {
    pub fn next_item(
        &mut self,
        last: Option<&SegmentPosition>,
        now: DateTime<Utc>,
    ) -> PlayResult<SourceItem> {
        match self {
            Self::Hls(track) => Ok(
                match track.next_segment(last.map(|position| position.sequence)) {
                    Some(next) => SourceItem::Segment {
                        segment: next.segment.clone(),
                        init: next.init.clone(),
                        position: SegmentPosition {
                            period: String::new(),
                            sequence: next.segment.sequence,
                            start: None,
                        },
                    },
                    None => SourceItem::Exhausted,
                },
            ),
            Self::Dash(track) => track.next_item(last, now),
            Self::Opaque => Ok(SourceItem::Exhausted),
        }
    }

    pub fn is_finite(&self) -> bool {
        match self {
            Self::Hls(track) => track.is_finite(),
            Self::Dash(track) => track.is_finite(),
            Self::Opaque => true,
        }
    }

    pub fn reload_interval(&self) -> Duration {
        match self {
            Self::Hls(track) => track.reload_interval(),
            Self::Dash(track) => track.reload_interval(),
            Self::Opaque => Duration::ZERO,
        }
    }

    pub fn downloaded_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Hls(track) => Some(track.downloaded_at()),
            Self::Dash(track) => Some(track.downloaded_at()),
            Self::Opaque => None,
        }
    }

    pub fn manifest_uri(&self) -> Option<&Url> {
        match self {
            Self::Hls(track) => Some(track.uri()),
            Self::Dash(track) => Some(track.uri()),
            Self::Opaque => None,
        }
    }

    pub fn representation(&self) -> Option<String> {
        match self {
            Self::Dash(track) => track.representation_id().map(str::to_string),
            _ => None,
        }
    }

    pub async fn reload<D, S, C>(&mut self, ctx: &PlaybackContext<'_, D, S, C>) -> PlayResult<bool>
    where
        D: Downloader,
        S: ResultSink,
        C: Clock,
    {
        match self {
            Self::Hls(track) => track.reload(ctx).await,
            Self::Dash(track) => track.reload(ctx).await,
            Self::Opaque => Ok(false),
        }
    }
}
