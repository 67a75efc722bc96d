use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum PlayError {
    #[error("HTTP error {status} while downloading {uri}")]
    HttpError { uri: Url, status: u16 },

    #[error("Invalid m3u8 file: {0}")]
    M3u8ParseError(String),

    #[error("Expected a media playlist but got a master playlist: {0}")]
    UnexpectedMasterPlaylist(Url),

    #[error(transparent)]
    MpdParseError(#[from] dash_mpd::DashMpdError),

    #[error("Invalid MPD: {0}")]
    MpdParsing(String),

    #[error("No matching media for the configured selectors")]
    NoMatchingMedia,

    #[error("Invalid resolution: {0}")]
    InvalidResolution(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Playback interrupted")]
    Interrupted,

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
}

/// Coarse classification of a [`PlayError`], deciding how the playback loop reacts to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The transport reported a non-success result.
    Download,
    /// A manifest body was malformed or incomplete.
    Parse,
    /// No variant or representation satisfied the configured selectors.
    Selection,
    /// Cooperative cancellation. Never reported as a sample failure.
    Interrupted,
}

impl PlayError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::HttpError { .. } | Self::RequestError(_) | Self::IOError(_) => {
                FailureKind::Download
            }
            Self::M3u8ParseError(_)
            | Self::UnexpectedMasterPlaylist(_)
            | Self::MpdParseError(_)
            | Self::MpdParsing(_)
            | Self::InvalidResolution(_)
            | Self::InvalidConfig(_)
            | Self::UrlParseError(_)
            | Self::JsonError(_) => FailureKind::Parse,
            Self::NoMatchingMedia => FailureKind::Selection,
            Self::Interrupted => FailureKind::Interrupted,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

pub type PlayResult<T> = Result<T, PlayError>;
