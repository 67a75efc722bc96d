use std::time::Duration;

use dash_mpd::{SegmentBase, SegmentList, SegmentTemplate};
use url::Url;

use crate::{
    dash::{template::Template, url::merge_baseurls},
    error::PlayResult,
};

/// How a representation locates its segments.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentAddressing {
    Template(TemplateAddressing),
    List(ListAddressing),
    /// The whole representation is a single file.
    Base(Url),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateAddressing {
    /// Inherited BaseURL. Identifiers are substituted before resolving against it.
    pub base: Url,
    pub media: String,
    pub initialization: Option<String>,
    pub start_number: u64,
    pub timescale: u64,
    /// Fixed segment duration in timescale units. Ignored when a timeline is present.
    pub duration: Option<u64>,
    pub presentation_time_offset: u64,
    pub timeline: Vec<TimelineEntry>,
}

/// One `S` element of a `SegmentTimeline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineEntry {
    pub time: Option<u64>,
    pub duration: u64,
    /// Additional segments with the same duration. Negative means "until the next entry or the
    /// end of the period".
    pub repeat: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListAddressing {
    pub initialization: Option<Url>,
    pub media: Vec<Url>,
    pub timescale: u64,
    pub duration: Option<u64>,
}

/// Addressing elements declared at one level of the manifest hierarchy.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AddressingLevel<'a> {
    pub template: Option<&'a SegmentTemplate>,
    pub list: Option<&'a SegmentList>,
    pub base: Option<&'a SegmentBase>,
}

impl SegmentAddressing {
    /// Pick the addressing mode of a representation.
    ///
    /// `levels` is ordered representation, adaptation set, period. The innermost level declaring
    /// any mode wins, preferring template over list over base at that level. Template attributes
    /// missing at the winning level are inherited from outer templates.
    pub(crate) fn resolve(base_uri: &Url, levels: &[AddressingLevel<'_>]) -> PlayResult<Option<Self>> {
        for (depth, level) in levels.iter().enumerate() {
            if level.template.is_some() {
                let templates: Vec<_> = levels[depth..].iter().filter_map(|l| l.template).collect();
                if let Some(template) = TemplateAddressing::merge(base_uri, &templates) {
                    return Ok(Some(Self::Template(template)));
                }
            }
            if let Some(list) = level.list {
                return Ok(Some(Self::List(ListAddressing::from_mpd(base_uri, list)?)));
            }
            if level.base.is_some() {
                return Ok(Some(Self::Base(base_uri.clone())));
            }
        }
        Ok(None)
    }

    pub fn timescale(&self) -> u64 {
        match self {
            Self::Template(template) => template.timescale,
            Self::List(list) => list.timescale,
            Self::Base(_) => 1,
        }
    }
}

impl TemplateAddressing {
    fn merge(base_uri: &Url, templates: &[&SegmentTemplate]) -> Option<Self> {
        let Some(media) = templates.iter().find_map(|t| t.media.as_deref()) else {
            tracing::warn!("SegmentTemplate without @media, ignoring");
            return None;
        };
        let initialization = templates
            .iter()
            .find_map(|t| t.initialization.as_deref())
            .map(str::to_string);

        let timeline = templates
            .iter()
            .find_map(|t| t.SegmentTimeline.as_ref())
            .map(|timeline| {
                timeline
                    .segments
                    .iter()
                    .map(|s| TimelineEntry {
                        time: s.t,
                        duration: s.d,
                        repeat: s.r.unwrap_or(0),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            base: base_uri.clone(),
            media: media.to_string(),
            initialization,
            start_number: templates.iter().find_map(|t| t.startNumber).unwrap_or(1),
            timescale: templates
                .iter()
                .find_map(|t| t.timescale)
                .filter(|t| *t > 0)
                .unwrap_or(1),
            duration: templates
                .iter()
                .find_map(|t| t.duration)
                .map(|d| d.round() as u64)
                .filter(|d| *d > 0),
            presentation_time_offset: templates
                .iter()
                .find_map(|t| t.presentationTimeOffset)
                .unwrap_or(0),
            timeline,
        })
    }

    /// Substitute `values` into `template` and resolve the result against the BaseURL.
    fn resolve(&self, template: &str, values: &Template<'_>) -> PlayResult<Url> {
        merge_baseurls(&self.base, &values.resolve(template))
    }
}

impl ListAddressing {
    fn from_mpd(base_uri: &Url, list: &SegmentList) -> PlayResult<Self> {
        let initialization = list
            .Initialization
            .as_ref()
            .and_then(|init| init.sourceURL.as_deref())
            .map(|source| merge_baseurls(base_uri, source))
            .transpose()?;

        let mut media = Vec::with_capacity(list.segment_urls.len());
        for segment_url in &list.segment_urls {
            match segment_url.media.as_deref() {
                Some(uri) => media.push(merge_baseurls(base_uri, uri)?),
                // a SegmentURL without @media addresses the representation's base URL itself
                None => media.push(base_uri.clone()),
            }
        }

        Ok(Self {
            initialization,
            media,
            timescale: list.timescale.filter(|t| *t > 0).unwrap_or(1),
            duration: list.duration.filter(|d| *d > 0),
        })
    }
}

/// A concrete segment produced by a [`SegmentCursor`].
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRef {
    pub number: u64,
    pub uri: Url,
    /// Offset from the period start.
    pub start: Duration,
    pub duration: Duration,
}

/// Walks the segments of one representation within one period.
#[derive(Debug, Clone)]
pub struct SegmentCursor {
    addressing: Option<SegmentAddressing>,
    representation_id: Option<String>,
    bandwidth: Option<u64>,
    period_duration: Option<Duration>,

    number: u64,
    /// Media time of the next segment, in timescale units.
    time: u64,
    entry: usize,
    repeat: u64,
    exhausted: bool,
}

impl SegmentCursor {
    pub fn new(
        addressing: Option<SegmentAddressing>,
        representation_id: Option<String>,
        bandwidth: Option<u64>,
        period_duration: Option<Duration>,
    ) -> Self {
        let (number, time) = match &addressing {
            Some(SegmentAddressing::Template(t)) => (t.start_number, t.presentation_time_offset),
            _ => (1, 0),
        };
        let mut cursor = Self {
            exhausted: addressing.is_none(),
            addressing,
            representation_id,
            bandwidth,
            period_duration,
            number,
            time,
            entry: 0,
            repeat: 0,
        };
        cursor.settle();
        cursor
    }

    fn template(&self) -> Template<'static> {
        let mut template = Template::new();
        template
            .insert_optional(Template::REPRESENTATION_ID, self.representation_id.clone())
            .insert_optional(Template::BANDWIDTH, self.bandwidth.map(|b| b.to_string()));
        template
    }

    /// Initialization segment of the representation, if any.
    pub fn init_uri(&self) -> PlayResult<Option<Url>> {
        match &self.addressing {
            Some(SegmentAddressing::Template(t)) => match &t.initialization {
                Some(init) => Ok(Some(t.resolve(init, &self.template())?)),
                None => Ok(None),
            },
            Some(SegmentAddressing::List(list)) => Ok(list.initialization.clone()),
            _ => Ok(None),
        }
    }

    fn period_end_scaled(&self, timescale: u64) -> Option<u64> {
        self.period_duration.map(|d| to_scaled(d, timescale))
    }

    /// Move past timeline entries that cannot produce another segment.
    fn settle(&mut self) {
        let Some(SegmentAddressing::Template(t)) = &self.addressing else {
            return;
        };
        if t.timeline.is_empty() {
            return;
        }
        let period_end = self
            .period_end_scaled(t.timescale)
            .map(|end| end + t.presentation_time_offset);

        while let Some(entry) = t.timeline.get(self.entry) {
            if self.repeat == 0 {
                if let Some(time) = entry.time {
                    self.time = time;
                }
            }
            let has_room = if entry.repeat >= 0 {
                self.repeat <= entry.repeat as u64
            } else {
                match t.timeline.get(self.entry + 1).and_then(|next| next.time) {
                    Some(next) => self.time < next,
                    None => period_end.map_or(true, |end| self.time < end),
                }
            };
            if has_room && entry.duration > 0 {
                return;
            }
            self.entry += 1;
            self.repeat = 0;
        }
    }

    /// The next segment, without consuming it.
    pub fn peek(&self) -> PlayResult<Option<SegmentRef>> {
        if self.exhausted {
            return Ok(None);
        }
        let Some(addressing) = &self.addressing else {
            return Ok(None);
        };

        match addressing {
            SegmentAddressing::Template(t) => {
                let (start, duration) = if t.timeline.is_empty() {
                    let Some(duration) = t.duration else {
                        return Ok(None);
                    };
                    ((self.number - t.start_number) * duration, duration)
                } else {
                    let Some(entry) = t.timeline.get(self.entry) else {
                        return Ok(None);
                    };
                    (
                        self.time.saturating_sub(t.presentation_time_offset),
                        entry.duration,
                    )
                };
                if self
                    .period_end_scaled(t.timescale)
                    .is_some_and(|end| start >= end)
                {
                    return Ok(None);
                }

                let mut template = self.template();
                template
                    .insert(Template::NUMBER, self.number.to_string())
                    .insert(
                        Template::TIME,
                        (start + t.presentation_time_offset).to_string(),
                    );
                Ok(Some(SegmentRef {
                    number: self.number,
                    uri: t.resolve(&t.media, &template)?,
                    start: from_scaled(start, t.timescale),
                    duration: from_scaled(duration, t.timescale),
                }))
            }
            SegmentAddressing::List(list) => {
                let index = (self.number - 1) as usize;
                let Some(uri) = list.media.get(index) else {
                    return Ok(None);
                };
                let (start, duration) = match list.duration {
                    Some(d) => (
                        from_scaled(index as u64 * d, list.timescale),
                        from_scaled(d, list.timescale),
                    ),
                    None => {
                        let duration = self
                            .period_duration
                            .map(|p| p / list.media.len().max(1) as u32)
                            .unwrap_or_default();
                        (duration * index as u32, duration)
                    }
                };
                Ok(Some(SegmentRef {
                    number: self.number,
                    uri: uri.clone(),
                    start,
                    duration,
                }))
            }
            SegmentAddressing::Base(uri) => Ok(Some(SegmentRef {
                number: self.number,
                uri: uri.clone(),
                start: Duration::ZERO,
                duration: self.period_duration.unwrap_or_default(),
            })),
        }
    }

    /// Consume the segment returned by [`SegmentCursor::peek`].
    pub fn step(&mut self) {
        match &self.addressing {
            Some(SegmentAddressing::Template(t)) if !t.timeline.is_empty() => {
                if let Some(entry) = t.timeline.get(self.entry) {
                    self.time += entry.duration;
                    self.repeat += 1;
                }
                self.number += 1;
                self.settle();
            }
            Some(SegmentAddressing::Base(_)) => {
                self.number += 1;
                self.exhausted = true;
            }
            _ => self.number += 1,
        }
    }

    /// Position the cursor on the segment covering `offset` from the period start.
    pub fn advance_to(&mut self, offset: Duration) {
        let Some(addressing) = self.addressing.clone() else {
            return;
        };
        let target = to_scaled(offset, addressing.timescale());

        match &addressing {
            SegmentAddressing::Template(t) if t.timeline.is_empty() => {
                if let Some(duration) = t.duration {
                    self.number = t.start_number + target / duration;
                }
            }
            SegmentAddressing::Template(t) => {
                let target = target + t.presentation_time_offset;
                let period_end = self
                    .period_end_scaled(t.timescale)
                    .map(|end| end + t.presentation_time_offset);

                while let Some(entry) = t.timeline.get(self.entry) {
                    if self.time + entry.duration > target {
                        break;
                    }
                    let remaining = if entry.repeat >= 0 {
                        entry.repeat as u64 + 1 - self.repeat
                    } else {
                        let limit = t
                            .timeline
                            .get(self.entry + 1)
                            .and_then(|next| next.time)
                            .or(period_end);
                        limit.map_or(u64::MAX, |limit| {
                            limit.saturating_sub(self.time).div_ceil(entry.duration)
                        })
                    };
                    let skip = ((target - self.time) / entry.duration).min(remaining).max(1);

                    self.time += skip * entry.duration;
                    self.repeat += skip;
                    self.number += skip;
                    self.settle();
                }
            }
            SegmentAddressing::List(list) => {
                if let Some(duration) = list.duration {
                    let index = (target / duration).min(list.media.len() as u64);
                    self.number = 1 + index;
                }
            }
            SegmentAddressing::Base(_) => {}
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    /// Whether segments are identified by their media time rather than their number.
    ///
    /// Timeline numbering restarts at `@startNumber` on every manifest, so it does not survive a
    /// sliding live window.
    pub fn is_time_keyed(&self) -> bool {
        matches!(&self.addressing, Some(SegmentAddressing::Template(t)) if !t.timeline.is_empty())
    }
}

fn to_scaled(duration: Duration, timescale: u64) -> u64 {
    (duration.as_nanos() * timescale as u128 / 1_000_000_000) as u64
}

fn from_scaled(value: u64, timescale: u64) -> Duration {
    let nanos = value as u128 * 1_000_000_000 / timescale.max(1) as u128;
    Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}
