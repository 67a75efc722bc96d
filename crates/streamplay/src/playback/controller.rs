use std::{collections::HashSet, time::Duration};

use url::Url;

use super::{PlaybackPhase, PlaybackState, SegmentPosition, SourceItem, TrackSource};
use crate::{
    clock::Clock, config::PlayDuration, download::Downloader, error::PlayResult,
    segment::TrackKind, sink::ResultSink, PlaybackContext,
};

/// Lower bound of the retry wait after an unchanged reload.
const MIN_RETRY_WAIT: Duration = Duration::from_millis(500);

/// Drives one track: segment downloads, init downloads and manifest reloads.
#[derive(Debug)]
pub struct PlaybackController {
    kind: TrackKind,
    resume: bool,
    phase: PlaybackPhase,
    state: PlaybackState,
    source: Option<TrackSource>,

    /// Seconds downloaded during the current invocation.
    played: f64,
    segments: usize,
    inits: HashSet<Url>,
}

impl PlaybackController {
    pub fn new(kind: TrackKind, resume: bool) -> Self {
        Self {
            kind,
            resume,
            phase: PlaybackPhase::BeforeManifest,
            state: PlaybackState::default(),
            source: None,
            played: 0.0,
            segments: 0,
            inits: HashSet::new(),
        }
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Forget the sequence bookkeeping so the next invocation starts from scratch.
    pub fn reset_state(&mut self) {
        self.state = PlaybackState::default();
    }

    pub fn played(&self) -> f64 {
        self.played
    }

    pub fn segments(&self) -> usize {
        self.segments
    }

    pub fn is_done(&self) -> bool {
        matches!(self.phase, PlaybackPhase::Ended | PlaybackPhase::Failed)
    }

    /// Position to continue from when resuming.
    pub fn resume_position(&self) -> Option<&SegmentPosition> {
        self.state.last.as_ref()
    }

    /// Prepare for a new invocation.
    pub fn begin(&mut self) {
        if !self.resume {
            self.reset_state();
        }
        self.phase = PlaybackPhase::BeforeManifest;
        self.source = None;
        self.played = 0.0;
        self.segments = 0;
        self.inits.clear();
    }

    pub fn attach(&mut self, source: TrackSource) {
        let uri = source.manifest_uri().cloned();
        if uri.is_some() && uri != self.state.manifest_uri {
            if self.state.manifest_uri.is_some() {
                log::debug!("{} manifest changed, continuing by position", self.kind);
            }
            self.state.manifest_uri = uri;
        }
        self.phase = PlaybackPhase::DownloadingSegments;
        self.source = Some(source);
    }

    /// Mark the track as absent or finished without playing anything.
    pub fn end(&mut self) {
        self.phase = PlaybackPhase::Ended;
    }

    /// End the track unless it already ended or failed.
    pub fn stop(&mut self) {
        if !self.is_done() {
            self.phase = PlaybackPhase::Ended;
        }
    }

    pub fn fail(&mut self) {
        self.phase = PlaybackPhase::Failed;
    }

    /// Download the next segment, reloading the manifest while the live edge is reached.
    ///
    /// Returns `false` once the track has nothing left to play or `limit` was reached in this
    /// invocation. Errors other than interruption move the track to [`PlaybackPhase::Failed`].
    pub async fn step<D, S, C>(
        &mut self,
        ctx: &PlaybackContext<'_, D, S, C>,
        limit: PlayDuration,
    ) -> PlayResult<bool>
    where
        D: Downloader,
        S: ResultSink,
        C: Clock,
    {
        let result = self.step_inner(ctx, limit).await;
        if let Err(e) = &result {
            if !e.is_interrupted() {
                self.phase = PlaybackPhase::Failed;
            }
        }
        result
    }

    async fn step_inner<D, S, C>(
        &mut self,
        ctx: &PlaybackContext<'_, D, S, C>,
        limit: PlayDuration,
    ) -> PlayResult<bool>
    where
        D: Downloader,
        S: ResultSink,
        C: Clock,
    {
        if self.is_done() {
            return Ok(false);
        }
        if limit.is_reached(self.played) {
            log::debug!("{} reached the play limit after {}s", self.kind, self.played);
            self.phase = PlaybackPhase::Ended;
            return Ok(false);
        }
        let Some(source) = self.source.as_mut() else {
            self.phase = PlaybackPhase::Ended;
            return Ok(false);
        };

        loop {
            let item = match source.next_item(self.state.last.as_ref(), ctx.now()) {
                Ok(item) => item,
                Err(e) => {
                    // segment addressing failed before anything was downloaded
                    if let Some(uri) = source.manifest_uri() {
                        ctx.report_failure(&self.kind.segment_label(), uri, e.to_string());
                    }
                    return Err(e);
                }
            };
            match item {
                SourceItem::Segment {
                    segment,
                    init,
                    position,
                } => {
                    self.phase = PlaybackPhase::DownloadingSegments;
                    if let Some(init) = init {
                        if !self.inits.contains(&init) {
                            ctx.fetch(&self.kind.init_label(), &init).await?;
                            self.inits.insert(init);
                        }
                    }
                    ctx.fetch(&self.kind.segment_label(), &segment.uri).await?;

                    // only a completed download moves the position
                    self.state.last = Some(position);
                    self.state.consumed += segment.duration;
                    self.state.representation = source.representation();
                    self.played += segment.duration;
                    self.segments += 1;
                    return Ok(true);
                }
                SourceItem::Wait(wait) => {
                    log::debug!("{} waiting {wait:?} for the live edge", self.kind);
                    self.phase = PlaybackPhase::LivePollRetry;
                    ctx.sleep(wait).await?;
                }
                SourceItem::Exhausted if source.is_finite() => {
                    log::info!("{} finished after {} segments", self.kind, self.segments);
                    self.phase = PlaybackPhase::Ended;
                    return Ok(false);
                }
                SourceItem::Exhausted => {
                    await_reload(source, &mut self.phase, ctx).await?;
                }
            }
        }
    }

    /// Play until `target` seconds were downloaded in this invocation or the track ends.
    ///
    /// Failures drop only this track.
    pub async fn catch_up<D, S, C>(
        &mut self,
        ctx: &PlaybackContext<'_, D, S, C>,
        target: f64,
    ) -> PlayResult<()>
    where
        D: Downloader,
        S: ResultSink,
        C: Clock,
    {
        while !self.is_done() && self.played < target {
            match self.step(ctx, PlayDuration::Whole).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) if e.is_interrupted() => return Err(e),
                Err(e) => {
                    log::warn!("Dropping {} track: {e}", self.kind);
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Reload until the manifest changes.
///
/// The first wait is the reload interval minus the age of the current manifest. Every unchanged
/// reload waits half the interval before retrying.
async fn await_reload<D, S, C>(
    source: &mut TrackSource,
    phase: &mut PlaybackPhase,
    ctx: &PlaybackContext<'_, D, S, C>,
) -> PlayResult<()>
where
    D: Downloader,
    S: ResultSink,
    C: Clock,
{
    *phase = PlaybackPhase::AwaitingReload;
    let interval = source.reload_interval();
    let age = source
        .downloaded_at()
        .and_then(|downloaded_at| (ctx.now() - downloaded_at).to_std().ok())
        .unwrap_or_default();
    let mut wait = interval.saturating_sub(age);

    loop {
        ctx.sleep(wait).await?;
        if source.reload(ctx).await? {
            *phase = PlaybackPhase::DownloadingSegments;
            return Ok(());
        }
        *phase = PlaybackPhase::LivePollRetry;
        wait = (interval / 2).max(MIN_RETRY_WAIT);
    }
}
