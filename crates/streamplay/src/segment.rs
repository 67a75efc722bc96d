use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use url::Url;

use crate::download::DownloadResponse;

/// A time-bounded, URI-addressable chunk of media.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSegment {
    /// Monotonic within a track (media sequence for HLS, segment number for DASH)
    pub sequence: u64,
    pub uri: Url,
    /// Duration in seconds
    pub duration: f64,
}

/// The role a track plays in a playback cycle.
///
/// The primary track is always [`TrackKind::Media`], the one that drives elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum TrackKind {
    #[default]
    Media,
    Audio,
    Subtitles,
}

impl TrackKind {
    pub fn from_mime_type(mime_type: Option<&str>) -> Option<Self> {
        let mime_type = mime_type?;

        if mime_type.starts_with("video") {
            Some(Self::Media)
        } else if mime_type.starts_with("audio") {
            Some(Self::Audio)
        } else if mime_type.starts_with("text") || mime_type == "application/ttml+xml" {
            Some(Self::Subtitles)
        } else {
            None
        }
    }

    /// `@contentType` values as defined by DASH, with `text` mapped to subtitles.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type {
            "video" => Some(Self::Media),
            "audio" => Some(Self::Audio),
            "text" => Some(Self::Subtitles),
            _ => None,
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, Self::Media)
    }

    fn prefix(&self) -> &'static str {
        match self {
            Self::Media => "media",
            Self::Audio => "audio",
            Self::Subtitles => "subtitles",
        }
    }

    pub fn playlist_label(&self) -> String {
        format!("{} playlist", self.prefix())
    }

    pub fn init_label(&self) -> String {
        format!("{} init", self.prefix())
    }

    pub fn segment_label(&self) -> String {
        format!("{} segment", self.prefix())
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Raw manifest body as downloaded. Two snapshots are the same manifest only if both the
/// source URI and the body bytes are identical.
#[derive(Debug, Clone)]
pub struct ManifestSnapshot {
    /// Requested URI, also the base for relative references.
    pub uri: Url,
    pub body: Bytes,
    pub downloaded_at: DateTime<Utc>,
}

impl ManifestSnapshot {
    pub fn new(uri: Url, body: Bytes, downloaded_at: DateTime<Utc>) -> Self {
        Self {
            uri,
            body,
            downloaded_at,
        }
    }

    pub fn from_response(uri: &Url, response: &DownloadResponse, downloaded_at: DateTime<Utc>) -> Self {
        Self {
            uri: uri.clone(),
            body: response.body.clone(),
            downloaded_at,
        }
    }

    pub fn is_same_manifest(&self, other: &ManifestSnapshot) -> bool {
        self.uri == other.uri && self.body == other.body
    }

    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

pub const MASTER_PLAYLIST_LABEL: &str = "master playlist";
pub const DASH_MANIFEST_LABEL: &str = "manifest";
