//! Thumbnail derivation and atomic file writes.
//!
//! A poster `<cache>/<id>.jpg` has its thumbnail at `<cache>/<id>_thumb.jpg`.
//! The thumbnail is regenerated only when it is missing or older than the
//! poster. Every write goes through a temporary file in the destination
//! directory followed by a rename, so readers see the old file or the new
//! one and never a partial write.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use tempfile::NamedTempFile;
use tracing::debug;

pub use reelvault_common::paths::thumbnail_path;

/// JPEG quality used for thumbnails.
pub const THUMBNAIL_QUALITY: u8 = 85;

/// Write `bytes` to `dest` through a temporary sibling file and a rename.
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    let dir = dest
        .parent()
        .with_context(|| format!("{} has no parent directory", dest.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(bytes).context("Failed to write temp file")?;
    tmp.as_file().sync_all().context("Failed to sync temp file")?;
    tmp.persist(dest)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to move file into place: {}", dest.display()))?;
    Ok(())
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Whether the thumbnail exists and is at least as new as the poster.
pub fn is_thumbnail_fresh(poster: &Path) -> bool {
    match (modified(poster), modified(&thumbnail_path(poster))) {
        (Some(source), Some(thumb)) => thumb >= source,
        _ => false,
    }
}

/// Encode an image as JPEG at [`THUMBNAIL_QUALITY`].
fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, THUMBNAIL_QUALITY);
    rgb.write_with_encoder(encoder)
        .context("Failed to encode thumbnail as JPEG")?;
    Ok(buf.into_inner())
}

/// Downscale `img` to fit within `width` x `height`, keeping its aspect ratio.
///
/// Images already inside the box are returned unchanged.
pub fn fit_within(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    if img.width() <= width && img.height() <= height {
        img.clone()
    } else {
        img.resize(width, height, FilterType::Lanczos3)
    }
}

/// Decode `poster`, downscale it and write the thumbnail next to it.
///
/// # Returns
///
/// The thumbnail path.
pub fn generate_thumbnail(poster: &Path, width: u32, height: u32) -> Result<PathBuf> {
    let img = image::open(poster)
        .with_context(|| format!("Failed to decode poster: {}", poster.display()))?;
    let thumb = fit_within(&img, width, height);
    let dest = thumbnail_path(poster);

    write_atomic(&dest, &encode_jpeg(&thumb)?)?;
    debug!(
        poster = %poster.display(),
        width = thumb.width(),
        height = thumb.height(),
        "Wrote thumbnail"
    );
    Ok(dest)
}

/// Regenerate the thumbnail only when it is missing or stale.
///
/// Returns `true` when a new thumbnail was written.
pub fn ensure_thumbnail(poster: &Path, width: u32, height: u32) -> Result<bool> {
    if is_thumbnail_fresh(poster) {
        return Ok(false);
    }
    generate_thumbnail(poster, width, height)?;
    Ok(true)
}

/// Bitmap to display for a poster.
///
/// Refreshes a stale thumbnail and decodes it. When no thumbnail can be
/// written or read, the poster itself is decoded and fitted to the box; a
/// stale thumbnail is the last resort. `None` means the caller should show a
/// placeholder.
pub fn load_display_image(poster: &Path, width: u32, height: u32) -> Option<RgbaImage> {
    let thumb = thumbnail_path(poster);

    match ensure_thumbnail(poster, width, height) {
        Ok(_) => match image::open(&thumb) {
            Ok(img) => return Some(img.to_rgba8()),
            Err(e) => debug!(thumb = %thumb.display(), error = %e, "Unreadable thumbnail"),
        },
        Err(e) => debug!(poster = %poster.display(), error = %e, "Thumbnail refresh failed"),
    }

    match image::open(poster) {
        Ok(img) => Some(fit_within(&img, width, height).to_rgba8()),
        Err(e) => {
            debug!(poster = %poster.display(), error = %e, "Poster not decodable");
            image::open(&thumb).ok().map(|img| img.to_rgba8())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_poster(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 255) as u8, (y % 255) as u8, 128u8])
        });
        let path = dir.join(name);
        img.save(&path).unwrap();
        path
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(time).unwrap();
    }

    #[test]
    fn test_generate_keeps_aspect_ratio() {
        let dir = TempDir::new().unwrap();
        let poster = write_poster(dir.path(), "1.jpg", 500, 750);

        let thumb = generate_thumbnail(&poster, 150, 225).unwrap();
        assert_eq!(thumb, dir.path().join("1_thumb.jpg"));

        let img = image::open(&thumb).unwrap();
        assert_eq!((img.width(), img.height()), (150, 225));
    }

    #[test]
    fn test_wide_poster_fits_box() {
        let dir = TempDir::new().unwrap();
        let poster = write_poster(dir.path(), "2.png", 600, 300);

        generate_thumbnail(&poster, 150, 225).unwrap();
        let img = image::open(thumbnail_path(&poster)).unwrap();
        assert_eq!(img.width(), 150);
        assert_eq!(img.height(), 75);
    }

    #[test]
    fn test_small_poster_is_not_upscaled() {
        let img = DynamicImage::new_rgb8(100, 120);
        let fitted = fit_within(&img, 150, 225);
        assert_eq!((fitted.width(), fitted.height()), (100, 120));
    }

    #[test]
    fn test_freshness_follows_mtime() {
        let dir = TempDir::new().unwrap();
        let poster = write_poster(dir.path(), "3.jpg", 300, 450);
        assert!(!is_thumbnail_fresh(&poster));

        assert!(ensure_thumbnail(&poster, 150, 225).unwrap());
        assert!(is_thumbnail_fresh(&poster));
        assert!(!ensure_thumbnail(&poster, 150, 225).unwrap());

        set_mtime(&poster, SystemTime::now() + Duration::from_secs(60));
        assert!(!is_thumbnail_fresh(&poster));
        assert!(ensure_thumbnail(&poster, 150, 225).unwrap());
    }

    #[test]
    fn test_undecodable_poster_gives_placeholder() {
        let dir = TempDir::new().unwrap();
        let poster = dir.path().join("4.jpg");
        std::fs::write(&poster, b"<html>not an image</html>").unwrap();

        assert!(generate_thumbnail(&poster, 150, 225).is_err());
        assert!(!thumbnail_path(&poster).exists());
        assert!(load_display_image(&poster, 150, 225).is_none());
    }

    #[test]
    fn test_unwritable_thumbnail_falls_back_to_poster() {
        let dir = TempDir::new().unwrap();
        let poster = write_poster(dir.path(), "5.jpg", 300, 450);
        // A directory in the thumbnail's place makes the rename fail.
        std::fs::create_dir(thumbnail_path(&poster)).unwrap();
        set_mtime(&poster, SystemTime::now() + Duration::from_secs(60));

        assert!(ensure_thumbnail(&poster, 150, 225).is_err());
        let img = load_display_image(&poster, 150, 225).unwrap();
        assert_eq!((img.width(), img.height()), (150, 225));
        assert!(thumbnail_path(&poster).is_dir());
    }

    #[test]
    fn test_stale_thumbnail_kept_when_poster_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let poster = write_poster(dir.path(), "6.jpg", 300, 450);
        generate_thumbnail(&poster, 150, 225).unwrap();

        std::fs::write(&poster, b"truncated").unwrap();
        set_mtime(&poster, SystemTime::now() + Duration::from_secs(60));

        let img = load_display_image(&poster, 150, 225).unwrap();
        assert_eq!((img.width(), img.height()), (150, 225));
    }

    #[test]
    fn test_write_atomic_replaces_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.jpg");

        write_atomic(&dest, b"first").unwrap();
        write_atomic(&dest, b"second").unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"second");
        let names: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(names.len(), 1);
    }
}
