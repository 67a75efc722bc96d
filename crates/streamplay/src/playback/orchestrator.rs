use url::Url;

use super::{PlaybackController, TrackSource};
use crate::{
    clock::Clock,
    config::PlaybackConfig,
    dash::{fetch_manifest, DashTrack},
    download::Downloader,
    error::PlayResult,
    hls::{parse_playlist, HlsPlaylist, HlsTrack},
    segment::{ManifestSnapshot, TrackKind, MASTER_PLAYLIST_LABEL},
    sink::ResultSink,
    PlaybackContext,
};

const NO_MATCHING_MEDIA: &str = "no matching media";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackOutcome {
    /// The primary track ended, or reached the play limit.
    Completed { played: f64, segments: usize },
    /// No variant or representation satisfied the selectors. Already reported to the sink.
    NoMatchingMedia,
}

/// Runs playback cycles of one stream: the primary media track plus optional audio and
/// subtitles.
#[derive(Debug)]
pub struct StreamOrchestrator {
    config: PlaybackConfig,
    media: PlaybackController,
    audio: PlaybackController,
    subtitles: PlaybackController,
}

impl StreamOrchestrator {
    pub fn new(config: PlaybackConfig) -> Self {
        let resume = config.resume;
        Self {
            config,
            media: PlaybackController::new(TrackKind::Media, resume),
            audio: PlaybackController::new(TrackKind::Audio, resume),
            subtitles: PlaybackController::new(TrackKind::Subtitles, resume),
        }
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn controller(&self, kind: TrackKind) -> &PlaybackController {
        match kind {
            TrackKind::Media => &self.media,
            TrackKind::Audio => &self.audio,
            TrackKind::Subtitles => &self.subtitles,
        }
    }

    fn controller_mut(&mut self, kind: TrackKind) -> &mut PlaybackController {
        match kind {
            TrackKind::Media => &mut self.media,
            TrackKind::Audio => &mut self.audio,
            TrackKind::Subtitles => &mut self.subtitles,
        }
    }

    /// Forget every track position, even when resuming is enabled.
    pub fn reset_state(&mut self) {
        self.media.reset_state();
        self.audio.reset_state();
        self.subtitles.reset_state();
    }

    /// One playback cycle.
    ///
    /// Download and parse failures of the master playlist, manifest or primary track end the
    /// cycle with an error that has already been reported to the sink. Secondary tracks fail
    /// on their own.
    pub async fn run<D, S, C>(
        &mut self,
        ctx: &PlaybackContext<'_, D, S, C>,
    ) -> PlayResult<PlaybackOutcome>
    where
        D: Downloader,
        S: ResultSink,
        C: Clock,
    {
        self.media.begin();
        self.audio.begin();
        self.subtitles.begin();

        let uri = self.config.master_url.clone();
        let prepared = if self.config.protocol.is_hls(&uri) {
            tracing::info!(%uri, "starting HLS playback");
            self.prepare_hls(ctx, &uri).await
        } else {
            tracing::info!(%uri, "starting DASH playback");
            self.prepare_dash(ctx, &uri).await
        };
        let matched = match prepared {
            Ok(matched) => matched,
            Err(e) => {
                if !e.is_interrupted() {
                    self.media.fail();
                }
                return Err(e);
            }
        };
        if !matched {
            ctx.report_failure(&TrackKind::Media.playlist_label(), &uri, NO_MATCHING_MEDIA);
            self.media.fail();
            self.audio.end();
            self.subtitles.end();
            return Ok(PlaybackOutcome::NoMatchingMedia);
        }

        self.play(ctx).await
    }

    async fn prepare_hls<D, S, C>(
        &mut self,
        ctx: &PlaybackContext<'_, D, S, C>,
        uri: &Url,
    ) -> PlayResult<bool>
    where
        D: Downloader,
        S: ResultSink,
        C: Clock,
    {
        let downloaded_at = ctx.now();
        let (_, playlist) = ctx
            .fetch_parsed(MASTER_PLAYLIST_LABEL, uri, |response| {
                parse_playlist(ManifestSnapshot::from_response(uri, response, downloaded_at))
            })
            .await?;

        let master = match playlist {
            HlsPlaylist::Media(playlist) => {
                tracing::info!("top-level playlist is a media playlist, playing it directly");
                self.media
                    .attach(TrackSource::Hls(HlsTrack::new(TrackKind::Media, playlist)));
                self.audio.end();
                self.subtitles.end();
                return Ok(true);
            }
            HlsPlaylist::Master(master) => master,
        };

        let Some(variant) = master.select_variant(&self.config.selector()) else {
            tracing::warn!(variants = master.variants.len(), "no variant matches the selectors");
            return Ok(false);
        };
        tracing::info!(
            uri = %variant.uri,
            bandwidth = variant.bandwidth,
            resolution = ?variant.resolution,
            "selected variant"
        );

        let track = HlsTrack::load(ctx, TrackKind::Media, &variant.uri).await?;
        self.media.attach(TrackSource::Hls(track));

        for (kind, language) in [
            (TrackKind::Audio, self.config.audio_language.clone()),
            (TrackKind::Subtitles, self.config.subtitle_language.clone()),
        ] {
            let rendition_uri = master
                .find_rendition(variant, kind, language.as_deref())
                .and_then(|rendition| rendition.uri.clone());
            let Some(rendition_uri) = rendition_uri else {
                tracing::debug!(%kind, "no separate rendition");
                self.controller_mut(kind).end();
                continue;
            };

            match HlsTrack::load_rendition(ctx, kind, &rendition_uri).await {
                Ok(Some(track)) => self.controller_mut(kind).attach(TrackSource::Hls(track)),
                Ok(None) => self.controller_mut(kind).attach(TrackSource::Opaque),
                Err(e) if e.is_interrupted() => return Err(e),
                Err(e) => {
                    tracing::warn!(%kind, uri = %rendition_uri, "dropping track: {e}");
                    self.controller_mut(kind).fail();
                }
            }
        }
        Ok(true)
    }

    async fn prepare_dash<D, S, C>(
        &mut self,
        ctx: &PlaybackContext<'_, D, S, C>,
        uri: &Url,
    ) -> PlayResult<bool>
    where
        D: Downloader,
        S: ResultSink,
        C: Clock,
    {
        let manifest = fetch_manifest(ctx, uri).await?;
        let now = ctx.now();

        let Some(media) = DashTrack::new(
            manifest.clone(),
            TrackKind::Media,
            None,
            self.config.selector(),
            self.media.resume_position(),
            now,
        ) else {
            return Ok(false);
        };
        self.media.attach(TrackSource::Dash(media));

        let selector = self.config.secondary_selector();
        for (kind, language) in [
            (TrackKind::Audio, self.config.audio_language.clone()),
            (TrackKind::Subtitles, self.config.subtitle_language.clone()),
        ] {
            let controller = self.controller_mut(kind);
            let track = DashTrack::new(
                manifest.clone(),
                kind,
                language,
                selector.clone(),
                controller.resume_position(),
                now,
            );
            match track {
                Some(track) => controller.attach(TrackSource::Dash(track)),
                None => {
                    tracing::debug!(%kind, "no matching adaptation set");
                    controller.end();
                }
            }
        }
        Ok(true)
    }

    /// Alternate primary segments and secondary catch-up until the primary track ends.
    async fn play<D, S, C>(
        &mut self,
        ctx: &PlaybackContext<'_, D, S, C>,
    ) -> PlayResult<PlaybackOutcome>
    where
        D: Downloader,
        S: ResultSink,
        C: Clock,
    {
        let play = self.config.play;
        while self.media.step(ctx, play).await? {
            let target = match play.limit() {
                Some(limit) => self.media.played().min(limit),
                None => self.media.played(),
            };
            self.audio.catch_up(ctx, target).await?;
            self.subtitles.catch_up(ctx, target).await?;
        }
        self.audio.stop();
        self.subtitles.stop();

        tracing::info!(
            played = self.media.played(),
            segments = self.media.segments(),
            "playback cycle finished"
        );
        Ok(PlaybackOutcome::Completed {
            played: self.media.played(),
            segments: self.media.segments(),
        })
    }
}
