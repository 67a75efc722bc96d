use std::time::Duration;

use m3u8_rs::MediaPlaylistType;
use url::Url;

use crate::{
    error::PlayResult,
    segment::{ManifestSnapshot, MediaSegment},
};

#[derive(Debug, Clone, PartialEq)]
pub struct HlsSegment {
    pub segment: MediaSegment,
    /// `EXT-X-MAP` in effect for this segment.
    pub init: Option<Url>,
}

#[derive(Debug, Clone)]
pub struct MediaPlaylist {
    pub snapshot: ManifestSnapshot,
    /// Seconds, the basis of the reload cadence.
    pub target_duration: f64,
    pub media_sequence: u64,
    pub segments: Vec<HlsSegment>,
    /// `EXT-X-ENDLIST` or `EXT-X-PLAYLIST-TYPE:VOD`.
    pub finite: bool,
}

impl MediaPlaylist {
    pub(crate) fn from_m3u8(
        snapshot: ManifestSnapshot,
        playlist: m3u8_rs::MediaPlaylist,
    ) -> PlayResult<Self> {
        let base = &snapshot.uri;

        let mut init = None;
        let mut segments = Vec::with_capacity(playlist.segments.len());
        for (i, segment) in playlist.segments.iter().enumerate() {
            if let Some(map) = &segment.map {
                init = Some(base.join(&map.uri)?);
            }

            segments.push(HlsSegment {
                segment: MediaSegment {
                    sequence: playlist.media_sequence + i as u64,
                    uri: base.join(&segment.uri)?,
                    duration: segment.duration as f64,
                },
                init: init.clone(),
            });
        }

        let finite = playlist.end_list
            || matches!(playlist.playlist_type, Some(MediaPlaylistType::Vod));

        Ok(Self {
            snapshot,
            target_duration: playlist.target_duration as f64,
            media_sequence: playlist.media_sequence,
            segments,
            finite,
        })
    }

    pub fn target_duration(&self) -> Duration {
        Duration::from_secs_f64(self.target_duration.max(0.0))
    }

    /// Segments not yet played, given the last played sequence number.
    pub fn segments_after(&self, last_sequence: Option<u64>) -> impl Iterator<Item = &HlsSegment> {
        self.segments
            .iter()
            .filter(move |s| last_sequence.map_or(true, |last| s.segment.sequence > last))
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.segments.last().map(|s| s.segment.sequence)
    }
}
