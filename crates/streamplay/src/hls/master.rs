use m3u8_rs::AlternativeMediaType;
use url::Url;

use crate::{
    error::PlayResult,
    segment::{ManifestSnapshot, TrackKind},
    selector::{Resolution, Selectable, VariantSelector},
};

/// One `EXT-X-STREAM-INF` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub uri: Url,
    pub bandwidth: u64,
    pub resolution: Option<Resolution>,
    pub audio_group: Option<String>,
    pub subtitles_group: Option<String>,
}

impl Variant {
    pub fn group(&self, kind: TrackKind) -> Option<&str> {
        match kind {
            TrackKind::Media => None,
            TrackKind::Audio => self.audio_group.as_deref(),
            TrackKind::Subtitles => self.subtitles_group.as_deref(),
        }
    }
}

impl Selectable for Variant {
    fn bandwidth(&self) -> Option<u64> {
        Some(self.bandwidth)
    }

    fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }
}

/// One `EXT-X-MEDIA` entry of type AUDIO or SUBTITLES.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendition {
    pub kind: TrackKind,
    pub group_id: String,
    pub name: String,
    pub language: Option<String>,
    pub default: bool,
    /// `None` when the rendition is muxed into the variant stream.
    pub uri: Option<Url>,
}

impl Rendition {
    fn matches(&self, selector: &str) -> bool {
        self.name.eq_ignore_ascii_case(selector)
            || self
                .language
                .as_deref()
                .is_some_and(|l| l.eq_ignore_ascii_case(selector))
    }
}

#[derive(Debug, Clone)]
pub struct MasterPlaylist {
    pub snapshot: ManifestSnapshot,
    pub variants: Vec<Variant>,
    pub renditions: Vec<Rendition>,
}

impl MasterPlaylist {
    pub(crate) fn from_m3u8(
        snapshot: ManifestSnapshot,
        playlist: m3u8_rs::MasterPlaylist,
    ) -> PlayResult<Self> {
        let base = &snapshot.uri;

        let mut variants = Vec::with_capacity(playlist.variants.len());
        for variant in playlist.variants {
            if variant.is_i_frame {
                continue;
            }
            variants.push(Variant {
                uri: base.join(&variant.uri)?,
                bandwidth: variant.bandwidth,
                resolution: variant
                    .resolution
                    .map(|r| Resolution::new(r.width, r.height)),
                audio_group: variant.audio,
                subtitles_group: variant.subtitles,
            });
        }

        let mut renditions = Vec::new();
        for media in playlist.alternatives {
            let kind = match media.media_type {
                AlternativeMediaType::Audio => TrackKind::Audio,
                AlternativeMediaType::Subtitles => TrackKind::Subtitles,
                _ => continue,
            };
            let uri = match media.uri {
                Some(uri) => Some(base.join(&uri)?),
                None => None,
            };
            renditions.push(Rendition {
                kind,
                group_id: media.group_id,
                name: media.name,
                language: media.language,
                default: media.default,
                uri,
            });
        }

        Ok(Self {
            snapshot,
            variants,
            renditions,
        })
    }

    pub fn select_variant(&self, selector: &VariantSelector) -> Option<&Variant> {
        selector.select(&self.variants)
    }

    /// Resolve the alternate rendition of `kind` linked to `variant`.
    ///
    /// The operator selector matches the rendition name or language case-insensitively. Without a
    /// match the group's default rendition is used. A rendition muxed into the variant (no URI)
    /// counts as absent.
    pub fn find_rendition(
        &self,
        variant: &Variant,
        kind: TrackKind,
        selector: Option<&str>,
    ) -> Option<&Rendition> {
        let group = variant.group(kind)?;
        let mut candidates = self
            .renditions
            .iter()
            .filter(|r| r.kind == kind && r.group_id == group);

        let chosen = selector
            .and_then(|selector| candidates.clone().find(|r| r.matches(selector)))
            .or_else(|| candidates.find(|r| r.default))?;

        if chosen.uri.is_none() {
            log::debug!(
                "{kind} rendition {name} is muxed into the variant stream",
                name = chosen.name
            );
            return None;
        }
        Some(chosen)
    }
}
