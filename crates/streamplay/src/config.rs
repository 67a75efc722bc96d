use std::{fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    error::{PlayError, PlayResult},
    selector::{Resolution, SelectionPolicy, VariantSelector},
};

/// Which manifest format to expect at the master URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolMode {
    /// HLS if the URL mentions `.m3u8`, DASH otherwise.
    #[default]
    Auto,
    Hls,
    Dash,
}

impl ProtocolMode {
    pub fn is_hls(&self, url: &Url) -> bool {
        match self {
            Self::Auto => url.as_str().contains(".m3u8"),
            Self::Hls => true,
            Self::Dash => false,
        }
    }
}

impl FromStr for ProtocolMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "hls" => Ok(Self::Hls),
            "dash" => Ok(Self::Dash),
            _ => Err(format!("unknown protocol: {s}")),
        }
    }
}

impl fmt::Display for ProtocolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Hls => "hls",
            Self::Dash => "dash",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "mode", content = "seconds")]
pub enum PlayDuration {
    #[default]
    Whole,
    Seconds(f64),
}

impl PlayDuration {
    pub fn limit(&self) -> Option<f64> {
        match self {
            Self::Whole => None,
            Self::Seconds(seconds) => Some(*seconds),
        }
    }

    pub fn is_reached(&self, consumed: f64) -> bool {
        self.limit().is_some_and(|limit| consumed >= limit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    pub master_url: Url,
    #[serde(default)]
    pub protocol: ProtocolMode,
    #[serde(default)]
    pub bandwidth: SelectionPolicy<u64>,
    #[serde(default)]
    pub resolution: SelectionPolicy<Resolution>,
    #[serde(default)]
    pub audio_language: Option<String>,
    #[serde(default)]
    pub subtitle_language: Option<String>,
    #[serde(default)]
    pub play: PlayDuration,
    /// Keep sequence bookkeeping between invocations.
    #[serde(default)]
    pub resume: bool,
}

impl PlaybackConfig {
    pub fn new(master_url: Url) -> Self {
        Self {
            master_url,
            protocol: Default::default(),
            bandwidth: Default::default(),
            resolution: Default::default(),
            audio_language: None,
            subtitle_language: None,
            play: Default::default(),
            resume: false,
        }
    }

    pub fn from_json(json: &str) -> PlayResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> PlayResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn selector(&self) -> VariantSelector {
        VariantSelector::new(self.bandwidth.clone(), self.resolution.clone())
    }

    /// Selector used for secondary DASH tracks, which rarely carry a resolution.
    pub fn secondary_selector(&self) -> VariantSelector {
        let bandwidth = match self.bandwidth {
            SelectionPolicy::Min => SelectionPolicy::Min,
            _ => SelectionPolicy::Max,
        };
        VariantSelector::new(bandwidth, SelectionPolicy::Min)
    }

    pub fn validate(&self) -> PlayResult<()> {
        if let PlayDuration::Seconds(seconds) = self.play {
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(PlayError::InvalidConfig(format!(
                    "play duration must be a non-negative number of seconds, got {seconds}"
                )));
            }
        }
        Ok(())
    }
}
