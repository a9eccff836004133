use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

/// Separator used in caption filenames when the identifier itself contains a hyphen.
pub const BANG_MARKER: &str = "-!";

static VIDEO_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:https?://)?(?:www\.)?(?:youtube\.com|youtu\.be)/(?:watch\?v=)?(?:embed/)?(?:v/)?(?:shorts/)?([A-Za-z0-9_-]{11})",
    )
    .expect("video id pattern compiles")
});

/// Extract the 11-character video ID from a YouTube URL or a text blob containing one.
pub fn extract(text: &str) -> Option<String> {
    VIDEO_ID_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Derive the video ID from a caption filename (`Title-ID.vtt` or `Title-!ID.vtt`).
pub fn from_filename(filename: &str) -> Option<String> {
    let stem = file_stem(filename);

    let id = match stem.rfind(BANG_MARKER) {
        Some(pos) => &stem[pos + BANG_MARKER.len()..],
        None => match stem.rfind('-') {
            Some(pos) => &stem[pos + 1..],
            None => return None,
        },
    };

    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Whether `id` is a well-formed video ID, i.e. [`extract`] recovers it from its watch URL.
pub fn is_valid(id: &str) -> bool {
    extract(&watch_url(id)).as_deref() == Some(id)
}

/// Like [`from_filename`], but only when the suffix is a well-formed video ID.
///
/// `Part-2.vtt` yields `None` here, while [`from_filename`] returns `2`.
pub fn caption_file_id(filename: &str) -> Option<String> {
    from_filename(filename).filter(|id| is_valid(id))
}

/// Strip the identifier suffix from a caption filename stem, leaving the title part.
pub fn strip_from_stem(stem: &str) -> &str {
    if let Some(pos) = stem.rfind(BANG_MARKER) {
        return &stem[..pos];
    }
    match stem.rfind('-') {
        Some(pos) => &stem[..pos],
        None => stem,
    }
}

/// Canonical watch URL for a video ID.
pub fn watch_url(id: &str) -> String {
    format!("{WATCH_URL}{id}")
}

/// Filename a caption track is stored under: `<name>-<id>.vtt`.
///
/// IDs containing a hyphen use the `-!` marker so that [`from_filename`]
/// recovers them unchanged.
pub fn caption_filename(name: &str, id: &str) -> String {
    if id.contains('-') {
        format!("{name}{BANG_MARKER}{id}.vtt")
    } else {
        format!("{name}-{id}.vtt")
    }
}

pub(crate) fn file_stem(filename: &str) -> &str {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);
    match name.rfind('.') {
        Some(pos) if pos > 0 => &name[..pos],
        _ => name,
    }
}
