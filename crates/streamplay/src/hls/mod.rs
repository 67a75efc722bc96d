mod master;
mod media;
mod source;

pub use m3u8_rs;
pub use master::*;
pub use media::*;
pub use source::*;

use m3u8_rs::Playlist;

use crate::{
    error::{PlayError, PlayResult},
    segment::ManifestSnapshot,
};

#[derive(Debug, Clone)]
pub enum HlsPlaylist {
    Master(MasterPlaylist),
    Media(MediaPlaylist),
}

/// Whether a downloaded body looks like an m3u8 playlist at all.
pub fn is_playlist(body: &[u8]) -> bool {
    let body = body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body);
    body.trim_ascii_start().starts_with(b"#EXTM3U")
}

pub fn parse_playlist(snapshot: ManifestSnapshot) -> PlayResult<HlsPlaylist> {
    let invalid = || PlayError::M3u8ParseError(format!("{} is not a valid playlist", snapshot.uri));
    if !is_playlist(&snapshot.body) {
        return Err(invalid());
    }
    let parsed = m3u8_rs::parse_playlist_res(&snapshot.body).map_err(|_| invalid())?;

    match parsed {
        Playlist::MasterPlaylist(playlist) => {
            log::debug!(
                "Master playlist {} with {} variants",
                snapshot.uri,
                playlist.variants.len()
            );
            Ok(HlsPlaylist::Master(MasterPlaylist::from_m3u8(
                snapshot, playlist,
            )?))
        }
        Playlist::MediaPlaylist(playlist) => Ok(HlsPlaylist::Media(MediaPlaylist::from_m3u8(
            snapshot, playlist,
        )?)),
    }
}

pub fn parse_media_playlist(snapshot: ManifestSnapshot) -> PlayResult<MediaPlaylist> {
    match parse_playlist(snapshot)? {
        HlsPlaylist::Media(playlist) => Ok(playlist),
        HlsPlaylist::Master(playlist) => {
            Err(PlayError::UnexpectedMasterPlaylist(playlist.snapshot.uri))
        }
    }
}
