use url::Url;

use crate::error::PlayResult;

pub(crate) fn is_absolute_url(s: &str) -> bool {
    s.starts_with("http://")
        || s.starts_with("https://")
        || s.starts_with("file://")
        || s.starts_with("ftp://")
}

/// Resolve `new` against `current`, carrying over the query of `current` (typically an auth
/// token on the manifest URL) when `new` has none of its own.
///
/// ```text
/// https://example.com/manifest.mpd?auth=secret + /video42.mp4
///   => https://example.com/video42.mp4?auth=secret
/// https://example.com/manifest.mpd?auth=old + /video42.mp4?auth=new
///   => https://example.com/video42.mp4?auth=new
/// ```
pub(crate) fn merge_baseurls(current: &Url, new: &str) -> PlayResult<Url> {
    if is_absolute_url(new) {
        return Ok(Url::parse(new)?);
    }

    let mut merged = current.join(new)?;
    if merged.query().is_none() {
        merged.set_query(current.query());
    }
    Ok(merged)
}
