//! Path utilities for detecting video files and deriving thumbnail paths.
//!
//! These are used by the scanner to decide which files enter the catalog and
//! by the image cache to locate the downscaled copy of a poster.

use std::path::{Path, PathBuf};

/// List of supported video file extensions.
const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "mov", "m4v", "wmv", "flv", "webm"];

/// Suffix appended to a poster's file stem to name its thumbnail.
pub const THUMBNAIL_SUFFIX: &str = "_thumb";

/// Check if a path has a video file extension.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use reelvault_common::paths::is_video_file;
///
/// assert!(is_video_file(Path::new("movie.mkv")));
/// assert!(is_video_file(Path::new("/path/to/video.MP4")));
/// assert!(!is_video_file(Path::new("subtitle.srt")));
/// ```
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Get the list of video file extensions.
#[must_use]
pub fn video_extensions() -> &'static [&'static str] {
    VIDEO_EXTENSIONS
}

/// Check whether a file or directory name is hidden (dot-prefixed).
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Derive the thumbnail path for a poster: `<stem>_thumb<.ext>` in the same directory.
///
/// # Examples
///
/// ```
/// use std::path::{Path, PathBuf};
/// use reelvault_common::paths::thumbnail_path;
///
/// assert_eq!(
///     thumbnail_path(Path::new("/cache/42.jpg")),
///     PathBuf::from("/cache/42_thumb.jpg")
/// );
/// ```
pub fn thumbnail_path(poster: &Path) -> PathBuf {
    let stem = poster
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match poster.extension() {
        Some(ext) => format!("{}{}.{}", stem, THUMBNAIL_SUFFIX, ext.to_string_lossy()),
        None => format!("{}{}", stem, THUMBNAIL_SUFFIX),
    };
    poster.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_video_file() {
        for ext in video_extensions() {
            assert!(is_video_file(Path::new(&format!("movie.{}", ext))));
        }

        assert!(is_video_file(Path::new("movie.MKV")));
        assert!(is_video_file(Path::new("/path/to/movie.mkv")));

        assert!(!is_video_file(Path::new("movie.ts")));
        assert!(!is_video_file(Path::new("subtitle.srt")));
        assert!(!is_video_file(Path::new("no_extension")));
    }

    #[test]
    fn test_is_hidden() {
        assert!(is_hidden(".DS_Store"));
        assert!(is_hidden(".hidden_dir"));
        assert!(!is_hidden("Season 1"));
    }

    #[test]
    fn test_thumbnail_path() {
        assert_eq!(
            thumbnail_path(Path::new("/posters/7.jpg")),
            PathBuf::from("/posters/7_thumb.jpg")
        );
        assert_eq!(
            thumbnail_path(Path::new("poster.large.png")),
            PathBuf::from("poster.large_thumb.png")
        );
        assert_eq!(
            thumbnail_path(Path::new("/posters/noext")),
            PathBuf::from("/posters/noext_thumb")
        );
    }
}
