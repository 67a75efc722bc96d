use std::time::Duration;

use chrono::{DateTime, Utc};
use url::Url;

use crate::{
    clock::Clock,
    download::Downloader,
    error::PlayResult,
    hls::{is_playlist, parse_media_playlist, HlsSegment, MediaPlaylist},
    segment::{ManifestSnapshot, TrackKind},
    sink::ResultSink,
    PlaybackContext,
};

/// Segment source backed by one HLS media playlist.
#[derive(Debug, Clone)]
pub struct HlsTrack {
    kind: TrackKind,
    playlist: MediaPlaylist,
}

impl HlsTrack {
    pub fn new(kind: TrackKind, playlist: MediaPlaylist) -> Self {
        Self { kind, playlist }
    }

    /// Download and parse the media playlist at `uri`.
    pub async fn load<D, S, C>(
        ctx: &PlaybackContext<'_, D, S, C>,
        kind: TrackKind,
        uri: &Url,
    ) -> PlayResult<Self>
    where
        D: Downloader,
        S: ResultSink,
        C: Clock,
    {
        let playlist = fetch_media_playlist(ctx, kind, uri).await?;
        Ok(Self::new(kind, playlist))
    }

    /// Load an alternate rendition. A body that is not a playlist at all (a bare subtitle file,
    /// for instance) counts as a single opaque download and yields `None`.
    pub async fn load_rendition<D, S, C>(
        ctx: &PlaybackContext<'_, D, S, C>,
        kind: TrackKind,
        uri: &Url,
    ) -> PlayResult<Option<Self>>
    where
        D: Downloader,
        S: ResultSink,
        C: Clock,
    {
        let downloaded_at = ctx.now();
        let (_, playlist) = ctx
            .fetch_parsed(&kind.playlist_label(), uri, |response| {
                if !is_playlist(&response.body) {
                    return Ok(None);
                }
                parse_media_playlist(ManifestSnapshot::from_response(
                    uri,
                    response,
                    downloaded_at,
                ))
                .map(Some)
            })
            .await?;

        if playlist.is_none() {
            log::info!("{kind} rendition {uri} is not a playlist, treating it as a single download");
        }
        Ok(playlist.map(|playlist| Self::new(kind, playlist)))
    }

    pub fn playlist(&self) -> &MediaPlaylist {
        &self.playlist
    }

    pub fn uri(&self) -> &Url {
        &self.playlist.snapshot.uri
    }

    /// First segment after `last_sequence`.
    pub fn next_segment(&self, last_sequence: Option<u64>) -> Option<&HlsSegment> {
        self.playlist.segments_after(last_sequence).next()
    }

    pub fn is_finite(&self) -> bool {
        self.playlist.finite
    }

    pub fn reload_interval(&self) -> Duration {
        self.playlist.target_duration()
    }

    pub fn downloaded_at(&self) -> DateTime<Utc> {
        self.playlist.snapshot.downloaded_at
    }

    /// Refetch the playlist. Returns `false` when the body did not change.
    pub async fn reload<D, S, C>(&mut self, ctx: &PlaybackContext<'_, D, S, C>) -> PlayResult<bool>
    where
        D: Downloader,
        S: ResultSink,
        C: Clock,
    {
        let uri = self.playlist.snapshot.uri.clone();
        let playlist = fetch_media_playlist(ctx, self.kind, &uri).await?;

        if playlist.snapshot.is_same_manifest(&self.playlist.snapshot) {
            log::debug!("{} playlist unchanged: {uri}", self.kind);
            // keep the original download time so the next wait is measured from it
            return Ok(false);
        }

        log::debug!(
            "{} playlist reloaded: {uri}, last sequence {:?}",
            self.kind,
            playlist.last_sequence()
        );
        self.playlist = playlist;
        Ok(true)
    }
}

async fn fetch_media_playlist<D, S, C>(
    ctx: &PlaybackContext<'_, D, S, C>,
    kind: TrackKind,
    uri: &Url,
) -> PlayResult<MediaPlaylist>
where
    D: Downloader,
    S: ResultSink,
    C: Clock,
{
    let downloaded_at = ctx.now();
    let (_, playlist) = ctx
        .fetch_parsed(&kind.playlist_label(), uri, |response| {
            parse_media_playlist(ManifestSnapshot::from_response(
                uri,
                response,
                downloaded_at,
            ))
        })
        .await?;
    Ok(playlist)
}
