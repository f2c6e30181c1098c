//! Fixed-size worker pool for poster decoding.
//!
//! Requests return immediately. Each worker refreshes the thumbnail when it
//! is stale, decodes it and posts a [`Delivery::Thumbnail`] tagged with the
//! identity it was requested for. The consumer ignores results for
//! identities that are no longer on screen.

use std::path::PathBuf;

use anyhow::{Context, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use reelvault_common::EntryId;
use reelvault_db::models::CatalogEntry;
use tracing::{debug, info, warn};

use super::thumbnails::{ensure_thumbnail, load_display_image};
use crate::loader::delivery::{Delivery, DeliverySender};

/// Outcome of a batch thumbnail pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThumbnailStats {
    pub generated: usize,
    pub fresh: usize,
    pub failed: usize,
}

/// Worker pool that decodes posters off the coordination thread.
pub struct ThumbnailPool {
    pool: ThreadPool,
    sink: DeliverySender,
    width: u32,
    height: u32,
}

impl ThumbnailPool {
    /// Create a pool of `workers` threads posting results to `sink`.
    pub fn new(workers: usize, width: u32, height: u32, sink: DeliverySender) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("thumbnail-{i}"))
            .build()
            .context("Failed to start thumbnail workers")?;

        Ok(Self {
            pool,
            sink,
            width,
            height,
        })
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Queue a thumbnail for `identity`. The result arrives on the delivery queue.
    pub fn request(&self, identity: EntryId, poster: PathBuf) {
        let sink = self.sink.clone();
        let (width, height) = (self.width, self.height);

        self.pool.spawn(move || {
            let image = load_display_image(&poster, width, height);
            if image.is_none() {
                debug!(entry_id = %identity, poster = %poster.display(), "Using placeholder");
            }
            sink.send(Delivery::Thumbnail { identity, image });
        });
    }

    /// Pre-generate thumbnails for every entry that has a poster.
    pub fn ensure_thumbnails(&self, entries: &[CatalogEntry]) -> ThumbnailStats {
        let posters: Vec<PathBuf> = entries
            .iter()
            .filter_map(|e| e.poster_path.as_deref())
            .map(PathBuf::from)
            .collect();
        self.ensure_all(&posters)
    }

    /// Bring every poster's thumbnail up to date, blocking until done.
    pub fn ensure_all(&self, posters: &[PathBuf]) -> ThumbnailStats {
        let (width, height) = (self.width, self.height);

        let stats = self.pool.install(|| {
            posters
                .par_iter()
                .map(|poster| match ensure_thumbnail(poster, width, height) {
                    Ok(true) => ThumbnailStats {
                        generated: 1,
                        ..Default::default()
                    },
                    Ok(false) => ThumbnailStats {
                        fresh: 1,
                        ..Default::default()
                    },
                    Err(e) => {
                        warn!(poster = %poster.display(), error = %e, "Thumbnail failed");
                        ThumbnailStats {
                            failed: 1,
                            ..Default::default()
                        }
                    }
                })
                .reduce(ThumbnailStats::default, |a, b| ThumbnailStats {
                    generated: a.generated + b.generated,
                    fresh: a.fresh + b.fresh,
                    failed: a.failed + b.failed,
                })
        });

        info!(
            generated = stats.generated,
            fresh = stats.fresh,
            failed = stats.failed,
            "Thumbnail pass complete"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::delivery::channel;
    use assert_matches::assert_matches;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn recv_within(
        rx: &mut crate::loader::delivery::DeliveryQueue,
        timeout: Duration,
    ) -> Option<Delivery> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(d) = rx.try_recv() {
                return Some(d);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn test_request_delivers_by_identity() {
        let dir = TempDir::new().unwrap();
        let poster = dir.path().join("5.jpg");
        image::DynamicImage::new_rgb8(300, 450)
            .to_rgb8()
            .save(&poster)
            .unwrap();

        let (tx, mut rx) = channel();
        let pool = ThumbnailPool::new(2, 150, 225, tx).unwrap();
        assert_eq!(pool.workers(), 2);

        pool.request(EntryId::from(5), poster);
        let delivery = recv_within(&mut rx, Duration::from_secs(10));
        assert_matches!(
            delivery,
            Some(Delivery::Thumbnail { identity, image: Some(img) })
                if identity == EntryId::from(5) && img.width() == 150
        );
    }

    #[test]
    fn test_missing_poster_delivers_placeholder() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = channel();
        let pool = ThumbnailPool::new(1, 150, 225, tx).unwrap();

        pool.request(EntryId::from(9), dir.path().join("missing.jpg"));
        let delivery = recv_within(&mut rx, Duration::from_secs(10));
        assert_matches!(delivery, Some(Delivery::Thumbnail { image: None, .. }));
    }

    #[test]
    fn test_ensure_all_counts() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("1.jpg");
        image::DynamicImage::new_rgb8(200, 300).to_rgb8().save(&good).unwrap();
        let bad = dir.path().join("2.jpg");
        std::fs::write(&bad, b"junk").unwrap();

        let (tx, _rx) = channel();
        let pool = ThumbnailPool::new(2, 150, 225, tx).unwrap();

        let stats = pool.ensure_all(&[good.clone(), bad.clone()]);
        assert_eq!(stats, ThumbnailStats { generated: 1, fresh: 0, failed: 1 });

        let stats = pool.ensure_all(&[good]);
        assert_eq!(stats.fresh, 1);
    }
}
