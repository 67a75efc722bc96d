//! MPEG-DASH manifest model and segment addressing.
//!
//! An MPD is parsed with `dash-mpd` into a [`DashManifest`], whose periods, adaptation sets and
//! representations are stored in flat arenas. Every representation carries its resolved base
//! URI and [`SegmentAddressing`] mode, and a [`DashTrack`] walks one track across periods with a
//! [`SegmentCursor`].

mod addressing;
mod manifest;
mod source;
pub mod template;
mod url;

pub use addressing::*;
pub use dash_mpd;
pub use manifest::*;
pub use source::*;
