//! Poster cache on disk.
//!
//! Posters live at `{cache_dir}/{entry_id}.jpg` with their thumbnail beside
//! them. A new poster replaces the old one atomically; when the download or
//! decode fails the previous poster is left as it was.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::ImageFormat;
use reelvault_common::EntryId;
use tracing::{debug, warn};

use super::thumbnails::{generate_thumbnail, write_atomic};

/// Filesystem manager for downloaded poster art.
#[derive(Debug, Clone)]
pub struct PosterStore {
    cache_dir: PathBuf,
    thumb_width: u32,
    thumb_height: u32,
}

impl PosterStore {
    /// Create a store rooted at `cache_dir` producing `thumb_width` x `thumb_height` thumbnails.
    pub fn new(cache_dir: impl Into<PathBuf>, thumb_width: u32, thumb_height: u32) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            thumb_width,
            thumb_height,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn thumb_size(&self) -> (u32, u32) {
        (self.thumb_width, self.thumb_height)
    }

    /// Where the poster of `entry_id` is stored.
    pub fn poster_path(&self, entry_id: EntryId) -> PathBuf {
        self.cache_dir.join(format!("{}.jpg", entry_id))
    }

    /// Store downloaded poster bytes for an entry and derive its thumbnail.
    ///
    /// The bytes must decode as an image. JPEG data is written as-is, any
    /// other format is re-encoded to JPEG. A thumbnail failure is logged and
    /// does not fail the call, since the poster itself is in place.
    ///
    /// # Returns
    ///
    /// The poster path.
    pub fn store(&self, entry_id: EntryId, data: &[u8]) -> Result<PathBuf> {
        let format = image::guess_format(data).context("Unrecognized poster image data")?;
        let img = image::load_from_memory_with_format(data, format)
            .context("Failed to decode poster image")?;

        let bytes = if format == ImageFormat::Jpeg {
            data.to_vec()
        } else {
            let mut buf = Cursor::new(Vec::new());
            img.to_rgb8()
                .write_to(&mut buf, ImageFormat::Jpeg)
                .context("Failed to encode poster as JPEG")?;
            buf.into_inner()
        };

        let dest = self.poster_path(entry_id);
        write_atomic(&dest, &bytes)?;
        debug!(entry_id = %entry_id, path = %dest.display(), "Stored poster");

        if let Err(e) = generate_thumbnail(&dest, self.thumb_width, self.thumb_height) {
            warn!(entry_id = %entry_id, error = %e, "Failed to derive thumbnail");
        }
        Ok(dest)
    }
}
