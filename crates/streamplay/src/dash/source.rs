use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use url::Url;

use crate::{
    clock::Clock,
    dash::{
        addressing::{SegmentCursor, SegmentRef},
        manifest::{DashManifest, PeriodId, RepresentationId},
    },
    download::Downloader,
    error::PlayResult,
    playback::{SegmentPosition, SourceItem},
    segment::{ManifestSnapshot, MediaSegment, TrackKind, DASH_MANIFEST_LABEL},
    selector::VariantSelector,
    sink::ResultSink,
    PlaybackContext,
};

const DEFAULT_MINIMUM_UPDATE_PERIOD: Duration = Duration::from_secs(2);

/// Segment source for one track of an MPD, continuing across periods.
#[derive(Debug, Clone)]
pub struct DashTrack {
    kind: TrackKind,
    language: Option<String>,
    selector: VariantSelector,

    manifest: DashManifest,
    period: PeriodId,
    representation: Option<RepresentationId>,
    cursor: SegmentCursor,
    /// Start of the last produced segment, relative to its period.
    last_start: Option<Duration>,
}

impl DashTrack {
    /// Pick the starting period and representation of `kind`.
    ///
    /// Returns `None` when the starting period has no matching adaptation set or representation.
    pub fn new(
        manifest: DashManifest,
        kind: TrackKind,
        language: Option<String>,
        selector: VariantSelector,
        resume: Option<&SegmentPosition>,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        if manifest.periods().is_empty() {
            tracing::warn!(uri = %manifest.snapshot.uri, "MPD has no periods");
            return None;
        }

        let resumed = resume.and_then(|position| {
            manifest
                .find_period(&position.period)
                .map(|period| (period, position.start))
        });
        let (period, offset) = match (resumed, live_position(&manifest, now)) {
            (Some((period, start)), _) => (period, start),
            (None, Some(position)) => {
                let period = manifest.period_at(position)?;
                let start = manifest.period(period).start.unwrap_or_default();
                (period, Some(position.saturating_sub(start)))
            }
            (None, None) => (PeriodId(0), None),
        };

        let mut track = Self {
            kind,
            language,
            selector,
            cursor: SegmentCursor::new(None, None, None, None),
            period,
            representation: None,
            manifest,
            last_start: None,
        };
        track.enter_period(period, None);
        track.representation?;

        if let Some(offset) = offset {
            tracing::debug!(
                %kind,
                period = %track.period_key(),
                offset_secs = offset.as_secs_f64(),
                resumed = resumed.is_some(),
                "positioning segment cursor"
            );
            track.cursor.advance_to(offset);
            if resumed.is_some() {
                track.last_start = Some(offset);
            }
        }
        Some(track)
    }

    /// Select the representation for `period` and reset the cursor onto it.
    fn enter_period(&mut self, period: PeriodId, previous_representation: Option<&str>) {
        self.period = period;
        self.last_start = None;

        let set = self
            .manifest
            .select_adaptation_set(period, self.kind, self.language.as_deref());
        self.representation = set.and_then(|set| {
            previous_representation
                .and_then(|id| self.manifest.find_representation(set, id))
                .or_else(|| self.manifest.select_representation(set, &self.selector))
        });

        let period_duration = self.manifest.period(period).duration;
        self.cursor = match self.representation {
            Some(id) => {
                let representation = self.manifest.representation(id);
                tracing::info!(
                    kind = %self.kind,
                    period = %self.manifest.period(period).key(),
                    representation = representation.id.as_deref().unwrap_or_default(),
                    bandwidth = representation.bandwidth,
                    "selected representation"
                );
                SegmentCursor::new(
                    representation.addressing.clone(),
                    representation.id.clone(),
                    representation.bandwidth,
                    period_duration,
                )
            }
            None => {
                tracing::warn!(
                    kind = %self.kind,
                    period = %self.manifest.period(period).key(),
                    "no matching representation in period"
                );
                SegmentCursor::new(None, None, None, period_duration)
            }
        };
    }

    pub fn manifest(&self) -> &DashManifest {
        &self.manifest
    }

    pub fn uri(&self) -> &Url {
        &self.manifest.snapshot.uri
    }

    pub fn period_key(&self) -> String {
        self.manifest.period(self.period).key()
    }

    pub fn representation_id(&self) -> Option<&str> {
        self.representation
            .and_then(|id| self.manifest.representation(id).id.as_deref())
    }

    pub fn is_finite(&self) -> bool {
        !self.manifest.dynamic
    }

    /// Basis of the refresh wait: the larger of `@minimumUpdatePeriod` (2s when absent) and
    /// `@timeShiftBufferDepth`.
    pub fn reload_interval(&self) -> Duration {
        let update_period = self
            .manifest
            .minimum_update_period
            .unwrap_or(DEFAULT_MINIMUM_UPDATE_PERIOD);
        update_period.max(self.manifest.time_shift_buffer_depth.unwrap_or_default())
    }

    pub fn downloaded_at(&self) -> DateTime<Utc> {
        self.manifest.snapshot.downloaded_at
    }

    /// Next segment after `last`, a wait for the live edge, or exhaustion.
    pub fn next_item(
        &mut self,
        last: Option<&SegmentPosition>,
        now: DateTime<Utc>,
    ) -> PlayResult<SourceItem> {
        loop {
            let Some(segment) = self.cursor.peek()? else {
                match self.manifest.next_period(self.period) {
                    Some(next) => {
                        tracing::debug!(kind = %self.kind, from = %self.period_key(), "period ended");
                        let previous = self.representation_id().map(str::to_string);
                        self.enter_period(next, previous.as_deref());
                        continue;
                    }
                    None => return Ok(SourceItem::Exhausted),
                }
            };

            let period = self.period_key();
            if last.is_some_and(|last| last.period == period && self.is_played(&segment, last)) {
                self.cursor.step();
                continue;
            }

            if let Some(wait) = self.availability_wait(&segment, now) {
                return Ok(SourceItem::Wait(wait));
            }

            self.cursor.step();
            self.last_start = Some(segment.start);
            return Ok(SourceItem::Segment {
                init: self.cursor.init_uri()?,
                position: SegmentPosition {
                    period,
                    sequence: segment.number,
                    start: Some(segment.start),
                },
                segment: MediaSegment {
                    sequence: segment.number,
                    uri: segment.uri,
                    duration: segment.duration.as_secs_f64(),
                },
            });
        }
    }

    /// Whether `segment` is at or before `last` within the same period.
    ///
    /// Timeline segments compare by start time, everything else by number.
    fn is_played(&self, segment: &SegmentRef, last: &SegmentPosition) -> bool {
        match last.start {
            Some(start) if self.cursor.is_time_keyed() => segment.start <= start,
            _ => segment.number <= last.sequence,
        }
    }

    /// How long until `segment` is fully available at the live edge.
    fn availability_wait(&self, segment: &SegmentRef, now: DateTime<Utc>) -> Option<Duration> {
        if !self.manifest.dynamic {
            return None;
        }
        let availability_start = self.manifest.availability_start_time?;
        let period_start = self.manifest.period(self.period).start.unwrap_or_default();
        let end = TimeDelta::from_std(period_start + segment.start + segment.duration).ok()?;
        let available_at = availability_start + end;

        (available_at > now)
            .then(|| (available_at - now).to_std().ok())
            .flatten()
    }

    /// Refetch the MPD. Returns `false` when it did not change.
    pub async fn reload<D, S, C>(&mut self, ctx: &PlaybackContext<'_, D, S, C>) -> PlayResult<bool>
    where
        D: Downloader,
        S: ResultSink,
        C: Clock,
    {
        let uri = self.manifest.snapshot.uri.clone();
        let manifest = fetch_manifest(ctx, &uri).await?;
        if manifest.snapshot.is_same_manifest(&self.manifest.snapshot) {
            tracing::debug!(kind = %self.kind, %uri, "MPD unchanged");
            return Ok(false);
        }

        let period_key = self.period_key();
        let previous = self.representation_id().map(str::to_string);
        let last_start = self.last_start;

        self.manifest = manifest;
        let period = match self.manifest.find_period(&period_key) {
            Some(period) => period,
            None => {
                tracing::warn!(kind = %self.kind, period = %period_key, "period disappeared after reload");
                PeriodId(0)
            }
        };
        let same_period = self.manifest.period(period).key() == period_key;
        self.enter_period(period, previous.as_deref());
        if same_period {
            if let Some(start) = last_start {
                self.cursor.advance_to(start);
                self.last_start = Some(start);
            }
        }
        Ok(true)
    }
}

/// Offset from the presentation start where a dynamic manifest begins playing.
fn live_position(manifest: &DashManifest, now: DateTime<Utc>) -> Option<Duration> {
    if !manifest.dynamic {
        return None;
    }
    let elapsed = (now - manifest.availability_start_time?).to_std().ok()?;
    Some(elapsed.saturating_sub(manifest.suggested_presentation_delay.unwrap_or_default()))
}

pub async fn fetch_manifest<D, S, C>(
    ctx: &PlaybackContext<'_, D, S, C>,
    uri: &Url,
) -> PlayResult<DashManifest>
where
    D: Downloader,
    S: ResultSink,
    C: Clock,
{
    let downloaded_at = ctx.now();
    let (_, manifest) = ctx
        .fetch_parsed(DASH_MANIFEST_LABEL, uri, |response| {
            DashManifest::parse(ManifestSnapshot::from_response(
                uri,
                response,
                downloaded_at,
            ))
        })
        .await?;
    Ok(manifest)
}
