//! Coordination thread glue.
//!
//! The [`Coordinator`] owns the receiving end of the delivery queue and the
//! loader. It is the only place where background results touch consumer
//! state: pages and counts are checked against the current generation,
//! thumbnails against the set of identities still on screen, and the match
//! "done" signal is held back until its progress items have all been seen.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use image::RgbaImage;
use reelvault_common::EntryId;
use reelvault_db::models::{CatalogEntry, EntryFilter};
use reelvault_db::pool::Catalog;
use reelvault_db::queries::entries;
use tracing::{debug, warn};

use super::delivery::{channel, Delivery, DeliveryQueue, DeliverySender};
use super::{LibraryLoader, LoaderOptions, PageOutcome};
use crate::metadata::{AutoMatchSweep, MatchProgress, Matcher};
use crate::scanner::{ScanProgress, Scanner};

/// Callbacks into the presentation layer.
///
/// All methods run on the coordination thread.
pub trait LibraryConsumer {
    /// New rows for the current generation, in offset order.
    fn on_page_delivered(&mut self, rows: &[CatalogEntry], generation: u64);

    fn on_counts_updated(&mut self, total: u32, unmatched: u32, generation: u64);

    fn on_scan_progress(&mut self, progress: &ScanProgress);

    fn on_match_progress(&mut self, progress: &MatchProgress);

    /// The sweep stopped. `error` is set when it failed before matching.
    fn on_match_done(&mut self, canceled: bool, error: Option<&str>);

    /// Bitmap for an identity still on screen; `None` means placeholder.
    fn on_thumbnail_ready(&mut self, identity: EntryId, image: Option<RgbaImage>);

    /// A scan finished; the consumer usually refreshes.
    fn on_scan_finished(&mut self, _added: usize, _error: Option<&str>) {}

    /// A background page fetch of the current generation failed.
    fn on_page_failed(&mut self, _error: &str, _generation: u64) {}

    /// The count query of the current generation failed; counts are unknown.
    fn on_counts_failed(&mut self, _error: &str, _generation: u64) {}

    /// Genre names in use changed after a scan or match.
    fn on_genres_updated(&mut self, _genres: &[String]) {}
}

/// Pending match completion.
#[derive(Debug, Clone)]
struct MatchDone {
    canceled: bool,
    error: Option<String>,
}

/// Owns the delivery queue, the loader and the consumer.
pub struct Coordinator<C: LibraryConsumer> {
    catalog: Catalog,
    queue: DeliveryQueue,
    sink: DeliverySender,
    loader: LibraryLoader,
    consumer: C,
    live_thumbnails: HashSet<EntryId>,
    pending_match_done: Option<MatchDone>,
}

impl<C: LibraryConsumer> Coordinator<C> {
    pub fn new(catalog: Catalog, options: LoaderOptions, consumer: C) -> Self {
        let (sink, queue) = channel();
        let loader = LibraryLoader::new(catalog.clone(), sink.clone(), options);
        Self {
            catalog,
            queue,
            sink,
            loader,
            consumer,
            live_thumbnails: HashSet::new(),
            pending_match_done: None,
        }
    }

    /// Posting handle for background work started elsewhere.
    pub fn sender(&self) -> DeliverySender {
        self.sink.clone()
    }

    pub fn loader(&self) -> &LibraryLoader {
        &self.loader
    }

    pub fn loader_mut(&mut self) -> &mut LibraryLoader {
        &mut self.loader
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    pub fn consumer_mut(&mut self) -> &mut C {
        &mut self.consumer
    }

    /// Start a new view session and hand the first page to the consumer.
    pub fn refresh(&mut self, filter: EntryFilter) -> Result<()> {
        self.loader.refresh(filter)?;
        let generation = self.loader.generation();
        self.consumer
            .on_page_delivered(self.loader.rows(), generation);
        if self.loader.state() == super::LoadState::Exhausted {
            self.reload_genres_if_dirty();
        }
        Ok(())
    }

    /// Scroll hook; see [`LibraryLoader::maybe_request_next_page`].
    pub fn on_scrolled(&mut self, remaining_px: f64, scrollable: bool) -> bool {
        self.loader.maybe_request_next_page(remaining_px, scrollable)
    }

    /// Start accepting thumbnail results for `identity`.
    pub fn watch_thumbnail(&mut self, identity: EntryId) {
        self.live_thumbnails.insert(identity);
    }

    /// Stop accepting thumbnail results for `identity`.
    pub fn forget_thumbnail(&mut self, identity: EntryId) {
        self.live_thumbnails.remove(&identity);
    }

    /// Scan `roots` on a background thread.
    pub fn start_scan(&self, roots: Vec<PathBuf>) -> JoinHandle<()> {
        let catalog = self.catalog.clone();
        let sink = self.sink.clone();

        thread::spawn(move || {
            let progress_sink = sink.clone();
            let scanner = Scanner::new(catalog).with_progress(Box::new(move |p| {
                progress_sink.send(Delivery::ScanProgress(p))
            }));

            let delivery = match scanner.scan_all(&roots) {
                Ok(added) => Delivery::ScanFinished { added, error: None },
                Err(e) => {
                    warn!(error = %e, "Scan failed");
                    Delivery::ScanFinished {
                        added: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            sink.send(delivery);
        })
    }

    /// Start an auto-match sweep on the given runtime.
    ///
    /// Returns the cancel flag of the sweep.
    pub fn start_match(
        &self,
        runtime: &tokio::runtime::Handle,
        matcher: Arc<Matcher>,
        delay: Duration,
    ) -> Arc<AtomicBool> {
        let sweep = AutoMatchSweep::new(matcher, delay);
        let cancel = sweep.cancel_flag();
        let sink = self.sink.clone();
        runtime.spawn(async move { sweep.run(Some(&sink)).await });
        cancel
    }

    /// Dispatch every delivery that is ready without blocking.
    ///
    /// Returns how many deliveries were drained.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        while let Some(delivery) = self.queue.try_recv() {
            self.dispatch(delivery);
            drained += 1;
        }
        self.flush_match_done();
        drained
    }

    /// Block until one delivery arrives and dispatch it.
    ///
    /// Returns `false` once every sender is gone.
    pub fn wait_one(&mut self) -> bool {
        match self.queue.blocking_recv() {
            Some(delivery) => {
                self.dispatch(delivery);
                self.flush_match_done();
                true
            }
            None => false,
        }
    }

    fn dispatch(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Page {
                generation,
                offset,
                requested,
                rows,
            } => match self.loader.apply_page(generation, offset, requested, rows) {
                PageOutcome::Applied { start, exhausted } => {
                    self.consumer
                        .on_page_delivered(&self.loader.rows()[start..], generation);
                    if exhausted {
                        self.reload_genres_if_dirty();
                    }
                }
                PageOutcome::Stale => {}
            },
            Delivery::PageFailed { generation, error } => {
                if self.loader.page_failed(generation) {
                    self.consumer.on_page_failed(&error, generation);
                }
            }
            Delivery::Counts {
                generation,
                total,
                unmatched,
            } => {
                if generation == self.loader.generation() {
                    self.consumer.on_counts_updated(total, unmatched, generation);
                } else {
                    debug!(generation, "Dropped stale counts");
                }
            }
            Delivery::CountsFailed { generation, error } => {
                if generation == self.loader.generation() {
                    self.consumer.on_counts_failed(&error, generation);
                } else {
                    debug!(generation, "Dropped stale count failure");
                }
            }
            Delivery::ScanProgress(progress) => self.consumer.on_scan_progress(&progress),
            Delivery::ScanFinished { added, error } => {
                self.loader.mark_genres_dirty();
                self.consumer.on_scan_finished(added, error.as_deref());
            }
            Delivery::MatchProgress(progress) => self.consumer.on_match_progress(&progress),
            Delivery::MatchDone {
                canceled, error, ..
            } => {
                self.loader.mark_genres_dirty();
                self.pending_match_done = Some(MatchDone { canceled, error });
            }
            Delivery::GenresChanged => self.loader.mark_genres_dirty(),
            Delivery::Thumbnail { identity, image } => {
                if self.live_thumbnails.contains(&identity) {
                    self.consumer.on_thumbnail_ready(identity, image);
                } else {
                    debug!(entry_id = %identity, "Dropped thumbnail for hidden item");
                }
            }
        }
    }

    fn flush_match_done(&mut self) {
        if self.queue.outstanding_progress() > 0 {
            return;
        }
        if let Some(done) = self.pending_match_done.take() {
            self.consumer
                .on_match_done(done.canceled, done.error.as_deref());
        }
    }

    fn reload_genres_if_dirty(&mut self) {
        if !self.loader.take_genres_dirty() {
            return;
        }
        let genres = self
            .catalog
            .conn()
            .and_then(|conn| entries::list_genres(&conn));
        match genres {
            Ok(genres) => self.consumer.on_genres_updated(&genres),
            Err(e) => warn!(error = %e, "Failed to reload genres"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelvault_db::models::NewEntry;

    #[derive(Default)]
    struct Recorder {
        pages: Vec<(usize, u64)>,
        counts: Vec<(u32, u32, u64)>,
        count_failures: Vec<u64>,
        thumbnails: Vec<EntryId>,
        match_progress: usize,
        done: Vec<(bool, Option<String>)>,
        genres: Vec<Vec<String>>,
    }

    impl LibraryConsumer for Recorder {
        fn on_page_delivered(&mut self, rows: &[CatalogEntry], generation: u64) {
            self.pages.push((rows.len(), generation));
        }
        fn on_counts_updated(&mut self, total: u32, unmatched: u32, generation: u64) {
            self.counts.push((total, unmatched, generation));
        }
        fn on_scan_progress(&mut self, _progress: &ScanProgress) {}
        fn on_match_progress(&mut self, _progress: &MatchProgress) {
            self.match_progress += 1;
        }
        fn on_match_done(&mut self, canceled: bool, error: Option<&str>) {
            self.done.push((canceled, error.map(str::to_string)));
        }
        fn on_counts_failed(&mut self, _error: &str, generation: u64) {
            self.count_failures.push(generation);
        }
        fn on_thumbnail_ready(&mut self, identity: EntryId, _image: Option<RgbaImage>) {
            self.thumbnails.push(identity);
        }
        fn on_genres_updated(&mut self, genres: &[String]) {
            self.genres.push(genres.to_vec());
        }
    }

    fn coordinator(n: usize) -> Coordinator<Recorder> {
        let catalog = Catalog::in_memory().unwrap();
        {
            let conn = catalog.conn().unwrap();
            for i in 0..n {
                entries::insert_entry(
                    &conn,
                    &NewEntry::film(format!("/m/{i}.mkv"), format!("Film {i}"), None),
                )
                .unwrap();
            }
        }
        Coordinator::new(
            catalog,
            LoaderOptions {
                first_page_size: 2,
                page_size: 2,
            },
            Recorder::default(),
        )
    }

    #[test]
    fn test_thumbnails_only_for_live_identities() {
        let mut c = coordinator(0);
        c.watch_thumbnail(EntryId::from(1));
        let tx = c.sender();
        tx.send(Delivery::Thumbnail {
            identity: EntryId::from(1),
            image: None,
        });
        tx.send(Delivery::Thumbnail {
            identity: EntryId::from(2),
            image: None,
        });

        c.drain();
        assert_eq!(c.consumer().thumbnails, vec![EntryId::from(1)]);

        c.forget_thumbnail(EntryId::from(1));
        tx.send(Delivery::Thumbnail {
            identity: EntryId::from(1),
            image: None,
        });
        c.drain();
        assert_eq!(c.consumer().thumbnails.len(), 1);
    }

    #[test]
    fn test_match_done_follows_progress() {
        let mut c = coordinator(0);
        let tx = c.sender();
        for index in 0..3 {
            tx.send(Delivery::MatchProgress(MatchProgress {
                index,
                total: 3,
                entry_id: EntryId::from(index as i64 + 1),
                title: "t".into(),
                matched: false,
            }));
        }
        tx.send(Delivery::MatchDone {
            canceled: true,
            matched: 0,
            processed: 3,
            error: None,
        });

        c.drain();
        assert_eq!(c.consumer().match_progress, 3);
        assert_eq!(c.consumer().done, vec![(true, None)]);
    }

    #[test]
    fn test_failed_sweep_reaches_consumer_with_error() {
        let mut c = coordinator(0);
        c.sender().send(Delivery::MatchDone {
            canceled: false,
            matched: 0,
            processed: 0,
            error: Some("no such table: entries".into()),
        });

        c.drain();
        assert_eq!(
            c.consumer().done,
            vec![(false, Some("no such table: entries".to_string()))]
        );
    }

    #[test]
    fn test_count_failure_only_for_current_generation() {
        let mut c = coordinator(3);
        c.refresh(EntryFilter::default()).unwrap();
        c.sender().send(Delivery::CountsFailed {
            generation: 0,
            error: "stale".into(),
        });
        c.sender().send(Delivery::CountsFailed {
            generation: 1,
            error: "disk I/O error".into(),
        });

        while c.consumer().count_failures.is_empty() {
            c.wait_one();
        }
        c.drain();
        assert_eq!(c.consumer().count_failures, vec![1]);
    }

    #[test]
    fn test_genres_changed_marks_dirty() {
        let mut c = coordinator(1);
        c.sender().send(Delivery::GenresChanged);
        c.drain();
        assert!(c.consumer().genres.is_empty());

        c.refresh(EntryFilter::default()).unwrap();
        assert_eq!(c.consumer().genres.len(), 1);
    }

    #[test]
    fn test_stale_counts_dropped() {
        let mut c = coordinator(3);
        c.refresh(EntryFilter::default()).unwrap();
        c.sender().send(Delivery::Counts {
            generation: 0,
            total: 99,
            unmatched: 99,
        });
        c.sender().send(Delivery::Counts {
            generation: 1,
            total: 3,
            unmatched: 3,
        });

        while c.consumer().counts.iter().filter(|c| c.2 == 1).count() < 2 {
            c.wait_one();
        }
        assert!(c.consumer().counts.iter().all(|(total, _, generation)| {
            *generation == 1 && *total == 3
        }));
    }

    #[test]
    fn test_genres_reload_after_scan_on_page_done() {
        let mut c = coordinator(1);
        c.sender().send(Delivery::ScanFinished {
            added: 1,
            error: None,
        });
        c.drain();
        assert!(c.consumer().genres.is_empty());

        c.refresh(EntryFilter::default()).unwrap();
        assert_eq!(c.consumer().pages, vec![(1, 1)]);
        assert_eq!(c.consumer().genres, vec![Vec::<String>::new()]);
    }
}
