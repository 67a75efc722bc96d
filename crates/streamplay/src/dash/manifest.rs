use std::time::Duration;

use chrono::{DateTime, Utc};
use dash_mpd::{AdaptationSet as MpdAdaptationSet, BaseURL, MPD};
use url::Url;

use crate::{
    dash::{
        addressing::{AddressingLevel, SegmentAddressing},
        url::merge_baseurls,
    },
    error::{PlayError, PlayResult},
    segment::{ManifestSnapshot, TrackKind},
    selector::{Resolution, Selectable, VariantSelector},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeriodId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdaptationSetId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RepresentationId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub struct Period {
    pub id: Option<String>,
    pub index: usize,
    /// Offset from the presentation start. `None` for the first period of a dynamic manifest
    /// without `@start`.
    pub start: Option<Duration>,
    pub duration: Option<Duration>,
    pub adaptation_sets: Vec<AdaptationSetId>,
}

impl Period {
    /// Stable identity across manifest reloads: `@id`, or the position when absent.
    pub fn key(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => format!("#{}", self.index),
        }
    }

    pub fn end(&self) -> Option<Duration> {
        Some(self.start? + self.duration?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdaptationSet {
    pub period: PeriodId,
    pub kind: Option<TrackKind>,
    pub language: Option<String>,
    pub representations: Vec<RepresentationId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Representation {
    pub period: PeriodId,
    pub adaptation_set: AdaptationSetId,
    pub id: Option<String>,
    pub bandwidth: Option<u64>,
    pub resolution: Option<Resolution>,
    pub mime_type: Option<String>,
    pub base_uri: Url,
    /// `None` when no addressing element applies, so the representation has no segments.
    pub addressing: Option<SegmentAddressing>,
}

impl Selectable for Representation {
    fn bandwidth(&self) -> Option<u64> {
        self.bandwidth
    }

    fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }
}

/// Parsed MPD. Periods, adaptation sets and representations live in flat arenas and refer to
/// their owners by id.
#[derive(Debug, Clone)]
pub struct DashManifest {
    pub snapshot: ManifestSnapshot,
    pub dynamic: bool,
    pub availability_start_time: Option<DateTime<Utc>>,
    pub media_presentation_duration: Option<Duration>,
    pub minimum_update_period: Option<Duration>,
    pub time_shift_buffer_depth: Option<Duration>,
    pub suggested_presentation_delay: Option<Duration>,

    periods: Vec<Period>,
    adaptation_sets: Vec<AdaptationSet>,
    representations: Vec<Representation>,
}

impl DashManifest {
    pub fn parse(snapshot: ManifestSnapshot) -> PlayResult<Self> {
        let text = std::str::from_utf8(&snapshot.body)
            .map_err(|e| PlayError::MpdParsing(format!("manifest is not valid UTF-8: {e}")))?;
        let mpd = dash_mpd::parse(text)?;
        Self::from_mpd(snapshot, mpd)
    }

    pub fn from_mpd(snapshot: ManifestSnapshot, mpd: MPD) -> PlayResult<Self> {
        let dynamic = mpd.mpdtype.as_deref() == Some("dynamic");
        let timings = period_timings(
            mpd.periods.iter().map(|p| (p.start, p.duration)),
            dynamic,
            mpd.mediaPresentationDuration,
        );

        let mut periods = Vec::with_capacity(mpd.periods.len());
        let mut adaptation_sets = Vec::new();
        let mut representations = Vec::new();

        for (index, (period, (start, duration))) in mpd.periods.iter().zip(timings).enumerate() {
            let period_id = PeriodId(index);
            let period_level = AddressingLevel {
                template: period.SegmentTemplate.as_ref(),
                list: period.SegmentList.as_ref(),
                base: period.SegmentBase.as_ref(),
            };

            let mut set_ids = Vec::with_capacity(period.adaptations.len());
            for adaptation in &period.adaptations {
                let set_id = AdaptationSetId(adaptation_sets.len());
                let set_level = AddressingLevel {
                    template: adaptation.SegmentTemplate.as_ref(),
                    list: adaptation.SegmentList.as_ref(),
                    base: adaptation.SegmentBase.as_ref(),
                };

                let mut rep_ids = Vec::with_capacity(adaptation.representations.len());
                for representation in &adaptation.representations {
                    let declared_base = [
                        &representation.BaseURL,
                        &adaptation.BaseURL,
                        &period.BaseURL,
                        &mpd.base_url,
                    ]
                    .into_iter()
                    .find_map(|urls| first_base(urls));
                    let base_uri = match declared_base {
                        Some(base) => merge_baseurls(&snapshot.uri, base)?,
                        None => snapshot.uri.clone(),
                    };

                    let levels = [
                        AddressingLevel {
                            template: representation.SegmentTemplate.as_ref(),
                            list: representation.SegmentList.as_ref(),
                            base: representation.SegmentBase.as_ref(),
                        },
                        set_level,
                        period_level,
                    ];
                    let addressing = SegmentAddressing::resolve(&base_uri, &levels)?;

                    rep_ids.push(RepresentationId(representations.len()));
                    representations.push(Representation {
                        period: period_id,
                        adaptation_set: set_id,
                        id: representation.id.clone(),
                        bandwidth: representation.bandwidth,
                        resolution: match (representation.width, representation.height) {
                            (Some(width), Some(height)) => Some(Resolution::new(width, height)),
                            _ => None,
                        },
                        mime_type: representation
                            .mimeType
                            .clone()
                            .or_else(|| adaptation.mimeType.clone()),
                        base_uri,
                        addressing,
                    });
                }

                adaptation_sets.push(AdaptationSet {
                    period: period_id,
                    kind: content_kind(adaptation),
                    language: adaptation.lang.clone(),
                    representations: rep_ids,
                });
                set_ids.push(set_id);
            }

            periods.push(Period {
                id: period.id.clone(),
                index,
                start,
                duration,
                adaptation_sets: set_ids,
            });
        }

        tracing::debug!(
            uri = %snapshot.uri,
            dynamic,
            periods = periods.len(),
            representations = representations.len(),
            "parsed MPD"
        );

        Ok(Self {
            snapshot,
            dynamic,
            availability_start_time: mpd.availabilityStartTime,
            media_presentation_duration: mpd.mediaPresentationDuration,
            minimum_update_period: mpd.minimumUpdatePeriod,
            time_shift_buffer_depth: mpd.timeShiftBufferDepth,
            suggested_presentation_delay: mpd.suggestedPresentationDelay,
            periods,
            adaptation_sets,
            representations,
        })
    }

    pub fn periods(&self) -> &[Period] {
        &self.periods
    }

    pub fn period(&self, id: PeriodId) -> &Period {
        &self.periods[id.0]
    }

    pub fn adaptation_set(&self, id: AdaptationSetId) -> &AdaptationSet {
        &self.adaptation_sets[id.0]
    }

    pub fn representation(&self, id: RepresentationId) -> &Representation {
        &self.representations[id.0]
    }

    pub fn next_period(&self, id: PeriodId) -> Option<PeriodId> {
        let next = id.0 + 1;
        (next < self.periods.len()).then_some(PeriodId(next))
    }

    pub fn find_period(&self, key: &str) -> Option<PeriodId> {
        self.periods
            .iter()
            .position(|p| p.key() == key)
            .map(PeriodId)
    }

    /// The last period starting at or before `offset` from the presentation start.
    pub fn period_at(&self, offset: Duration) -> Option<PeriodId> {
        self.periods
            .iter()
            .rposition(|p| p.start.unwrap_or_default() <= offset)
            .or_else(|| (!self.periods.is_empty()).then_some(0))
            .map(PeriodId)
    }

    /// Adaptation set of `kind` in `period`, preferring an exact (case-insensitive) language match.
    pub fn select_adaptation_set(
        &self,
        period: PeriodId,
        kind: TrackKind,
        language: Option<&str>,
    ) -> Option<AdaptationSetId> {
        let mut candidates = self
            .period(period)
            .adaptation_sets
            .iter()
            .copied()
            .filter(|id| self.adaptation_set(*id).kind == Some(kind));

        if let Some(language) = language {
            let matched = candidates.clone().find(|id| {
                self.adaptation_set(*id)
                    .language
                    .as_deref()
                    .is_some_and(|l| l.eq_ignore_ascii_case(language))
            });
            if matched.is_some() {
                return matched;
            }
        }

        let first = candidates.next()?;
        if let Some(language) = language {
            tracing::warn!(
                %kind,
                language,
                "no adaptation set matches the language, using the first one"
            );
        }
        Some(first)
    }

    pub fn select_representation(
        &self,
        set: AdaptationSetId,
        selector: &VariantSelector,
    ) -> Option<RepresentationId> {
        let ids = &self.adaptation_set(set).representations;
        let candidates: Vec<&Representation> =
            ids.iter().map(|id| self.representation(*id)).collect();
        selector.select_index(&candidates).map(|index| ids[index])
    }

    /// Representation with the given `@id` inside an adaptation set.
    pub fn find_representation(&self, set: AdaptationSetId, id: &str) -> Option<RepresentationId> {
        self.adaptation_set(set)
            .representations
            .iter()
            .copied()
            .find(|rep| self.representation(*rep).id.as_deref() == Some(id))
    }
}

fn first_base(urls: &[BaseURL]) -> Option<&str> {
    urls.first().map(|u| u.base.as_str())
}

/// `@contentType`, else the `@mimeType` of the set, else that of its first representation.
fn content_kind(adaptation: &MpdAdaptationSet) -> Option<TrackKind> {
    if let Some(kind) = adaptation
        .contentType
        .as_deref()
        .and_then(TrackKind::from_content_type)
    {
        return Some(kind);
    }

    TrackKind::from_mime_type(adaptation.mimeType.as_deref()).or_else(|| {
        TrackKind::from_mime_type(
            adaptation
                .representations
                .first()
                .and_then(|r| r.mimeType.as_deref()),
        )
    })
}

/// Resolve `(start, duration)` of every period.
///
/// - start: declared; else previous start + previous duration; else zero for the first period
///   of a static manifest; else unknown.
/// - duration: declared; else the presentation duration; else next start - start.
pub(crate) fn period_timings(
    declared: impl Iterator<Item = (Option<Duration>, Option<Duration>)>,
    dynamic: bool,
    presentation_duration: Option<Duration>,
) -> Vec<(Option<Duration>, Option<Duration>)> {
    let declared: Vec<_> = declared.collect();

    let mut starts: Vec<Option<Duration>> = Vec::with_capacity(declared.len());
    for (index, (start, _)) in declared.iter().enumerate() {
        let start = match start {
            Some(start) => Some(*start),
            None if index > 0 => {
                let previous_start = starts[index - 1];
                let previous_duration = declared[index - 1].1.or(presentation_duration);
                previous_start.zip(previous_duration).map(|(s, d)| s + d)
            }
            None if !dynamic => Some(Duration::ZERO),
            None => None,
        };
        starts.push(start);
    }

    declared
        .iter()
        .enumerate()
        .map(|(index, (_, duration))| {
            let start = starts[index];
            let duration = duration.or(presentation_duration).or_else(|| {
                let next = starts.get(index + 1).copied().flatten()?;
                next.checked_sub(start?)
            });
            (start, duration)
        })
        .collect()
}
