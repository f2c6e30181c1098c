//! Paginated catalog loader.
//!
//! A refresh bumps the generation, clears the rows and loads a small first
//! page synchronously. Later pages are fetched on background threads against
//! a read-only catalog handle and come back through the delivery queue.
//! Every request carries the generation it was issued under and a copy of
//! the filter; a delivery from an older generation is dropped when drained.

pub mod coordinator;
pub mod delivery;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use reelvault_db::models::{CatalogEntry, EntryFilter, Pagination};
use reelvault_db::pool::Catalog;
use reelvault_db::queries::entries;
use tracing::{debug, trace, warn};

pub use coordinator::{Coordinator, LibraryConsumer};
pub use delivery::{channel, Delivery, DeliveryQueue, DeliverySender};

/// Remaining scroll distance below which the next page is requested.
pub const NEAR_BOTTOM_PX: f64 = 400.0;

/// Page sizes of a loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderOptions {
    /// Rows loaded synchronously on refresh.
    pub first_page_size: u32,
    /// Rows per background page.
    pub page_size: u32,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            first_page_size: 80,
            page_size: 250,
        }
    }
}

/// Where the current view session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Nothing loaded yet.
    Idle,
    /// More rows may exist.
    Streaming,
    /// A background page is outstanding.
    Loading,
    /// The last page came back short; no more requests until refresh.
    Exhausted,
}

/// What happened to a drained page delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// Rows were appended starting at this index.
    Applied { start: usize, exhausted: bool },
    /// The delivery belonged to an older generation or offset.
    Stale,
}

/// Loader for one consumer.
///
/// All methods run on the coordination thread. Only the generation mirror
/// is shared with background threads.
pub struct LibraryLoader {
    catalog: Catalog,
    sink: DeliverySender,
    options: LoaderOptions,
    filter: EntryFilter,
    generation: u64,
    live_generation: Arc<AtomicU64>,
    rows: Vec<CatalogEntry>,
    state: LoadState,
    genres_dirty: bool,
}

impl LibraryLoader {
    pub fn new(catalog: Catalog, sink: DeliverySender, options: LoaderOptions) -> Self {
        Self {
            catalog,
            sink,
            options,
            filter: EntryFilter::default(),
            generation: 0,
            live_generation: Arc::new(AtomicU64::new(0)),
            rows: Vec::new(),
            state: LoadState::Idle,
            genres_dirty: false,
        }
    }

    pub fn rows(&self) -> &[CatalogEntry] {
        &self.rows
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn filter(&self) -> &EntryFilter {
        &self.filter
    }

    pub fn options(&self) -> LoaderOptions {
        self.options
    }

    /// Start a new view session with `filter`.
    ///
    /// Bumps the generation, drops the current rows, loads the first page
    /// synchronously and schedules a background count.
    pub fn refresh(&mut self, filter: EntryFilter) -> Result<()> {
        self.filter = filter;
        self.generation += 1;
        self.live_generation.store(self.generation, Ordering::SeqCst);
        self.rows.clear();
        self.state = LoadState::Idle;

        let limit = self.options.first_page_size;
        let first = {
            let conn = self.catalog.conn()?;
            entries::list_page(&conn, &self.filter, Pagination::new(0, limit))
                .context("Failed to load first page")?
        };

        self.state = if (first.len() as u32) < limit {
            LoadState::Exhausted
        } else {
            LoadState::Streaming
        };
        debug!(
            generation = self.generation,
            rows = first.len(),
            state = ?self.state,
            "Loaded first page"
        );
        self.rows = first;

        self.spawn_counts();
        Ok(())
    }

    /// Replace the filter and refresh.
    pub fn set_filter(&mut self, filter: EntryFilter) -> Result<()> {
        self.refresh(filter)
    }

    /// Re-run the current filter from the start.
    pub fn reload(&mut self) -> Result<()> {
        self.refresh(self.filter.clone())
    }

    /// Ask for the next background page.
    ///
    /// No-op (returns `false`) while a page is outstanding, after the end was
    /// reached, or before the first refresh.
    pub fn request_next_page(&mut self) -> bool {
        if self.state != LoadState::Streaming {
            trace!(state = ?self.state, "Page request ignored");
            return false;
        }
        self.state = LoadState::Loading;

        let generation = self.generation;
        let live = self.live_generation.clone();
        let filter = self.filter.clone();
        let page = Pagination::new(self.rows.len() as u32, self.options.page_size);
        let catalog = self.catalog.clone();
        let sink = self.sink.clone();

        thread::spawn(move || {
            if live.load(Ordering::SeqCst) != generation {
                trace!(generation, "Skipping page for superseded generation");
                return;
            }

            let result = catalog
                .reader()
                .and_then(|conn| entries::list_page(&conn, &filter, page));

            match result {
                Ok(rows) => sink.send(Delivery::Page {
                    generation,
                    offset: page.offset,
                    requested: page.limit,
                    rows,
                }),
                Err(e) => {
                    warn!(generation, offset = page.offset, error = %e, "Page fetch failed");
                    sink.send(Delivery::PageFailed {
                        generation,
                        error: e.to_string(),
                    });
                }
            }
        });
        true
    }

    /// Request the next page when the view is near its bottom edge or
    /// cannot scroll yet.
    pub fn maybe_request_next_page(&mut self, remaining_px: f64, scrollable: bool) -> bool {
        if !scrollable || remaining_px < NEAR_BOTTOM_PX {
            self.request_next_page()
        } else {
            false
        }
    }

    /// Apply a drained page delivery.
    pub fn apply_page(
        &mut self,
        generation: u64,
        offset: u32,
        requested: u32,
        rows: Vec<CatalogEntry>,
    ) -> PageOutcome {
        if generation != self.generation || offset as usize != self.rows.len() {
            trace!(
                generation,
                current = self.generation,
                rows = rows.len(),
                "Dropped stale page"
            );
            return PageOutcome::Stale;
        }

        let start = self.rows.len();
        let exhausted = rows.is_empty() || (rows.len() as u32) < requested;
        self.rows.extend(rows);
        self.state = if exhausted {
            LoadState::Exhausted
        } else {
            LoadState::Streaming
        };

        debug!(generation, start, total = self.rows.len(), exhausted, "Applied page");
        PageOutcome::Applied { start, exhausted }
    }

    /// Note a failed background page. Returns whether it was current.
    ///
    /// The session stays open so the next scroll retries.
    pub fn page_failed(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        if self.state == LoadState::Loading {
            self.state = LoadState::Streaming;
        }
        true
    }

    /// Record that a scan or match changed the set of genres in use.
    pub fn mark_genres_dirty(&mut self) {
        self.genres_dirty = true;
    }

    /// Whether the genre list should be reloaded, clearing the flag.
    pub fn take_genres_dirty(&mut self) -> bool {
        std::mem::take(&mut self.genres_dirty)
    }

    fn spawn_counts(&self) {
        let generation = self.generation;
        let live = self.live_generation.clone();
        let filter = self.filter.clone();
        let catalog = self.catalog.clone();
        let sink = self.sink.clone();

        thread::spawn(move || {
            if live.load(Ordering::SeqCst) != generation {
                return;
            }
            let counts = catalog.reader().and_then(|conn| {
                Ok((
                    entries::count(&conn, &filter)?,
                    entries::count_unmatched(&conn)?,
                ))
            });
            match counts {
                Ok((total, unmatched)) => sink.send(Delivery::Counts {
                    generation,
                    total,
                    unmatched,
                }),
                Err(e) => {
                    warn!(generation, error = %e, "Count query failed");
                    sink.send(Delivery::CountsFailed {
                        generation,
                        error: e.to_string(),
                    });
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelvault_db::models::NewEntry;

    fn seeded(n: usize) -> Catalog {
        let catalog = Catalog::in_memory().unwrap();
        let conn = catalog.conn().unwrap();
        for i in 0..n {
            entries::insert_entry(
                &conn,
                &NewEntry::film(format!("/m/{i:03}.mkv"), format!("Film {i:03}"), None),
            )
            .unwrap();
        }
        catalog
    }

    fn options() -> LoaderOptions {
        LoaderOptions {
            first_page_size: 3,
            page_size: 5,
        }
    }

    #[test]
    fn test_first_page_is_synchronous() {
        let (tx, _rx) = channel();
        let mut loader = LibraryLoader::new(seeded(10), tx, options());
        assert_eq!(loader.state(), LoadState::Idle);
        assert!(!loader.request_next_page());

        loader.refresh(EntryFilter::default()).unwrap();
        assert_eq!(loader.generation(), 1);
        assert_eq!(loader.rows().len(), 3);
        assert_eq!(loader.state(), LoadState::Streaming);
    }

    #[test]
    fn test_short_first_page_exhausts() {
        let (tx, _rx) = channel();
        let mut loader = LibraryLoader::new(seeded(2), tx, options());
        loader.refresh(EntryFilter::default()).unwrap();
        assert_eq!(loader.state(), LoadState::Exhausted);
        assert!(!loader.request_next_page());
    }

    #[test]
    fn test_apply_page_rules() {
        let (tx, _rx) = channel();
        let mut loader = LibraryLoader::new(seeded(10), tx, options());
        loader.refresh(EntryFilter::default()).unwrap();
        let extra = loader.rows()[0].clone();

        assert!(loader.request_next_page());
        assert_eq!(loader.state(), LoadState::Loading);
        assert!(!loader.request_next_page());

        assert_eq!(loader.apply_page(0, 3, 5, vec![extra.clone()]), PageOutcome::Stale);
        assert_eq!(loader.apply_page(1, 0, 5, vec![extra.clone()]), PageOutcome::Stale);
        assert_eq!(loader.rows().len(), 3);

        let full = vec![extra.clone(); 5];
        assert_eq!(
            loader.apply_page(1, 3, 5, full),
            PageOutcome::Applied {
                start: 3,
                exhausted: false
            }
        );
        assert_eq!(loader.state(), LoadState::Streaming);

        assert_eq!(
            loader.apply_page(1, 8, 5, vec![extra]),
            PageOutcome::Applied {
                start: 8,
                exhausted: true
            }
        );
        assert_eq!(loader.state(), LoadState::Exhausted);
    }

    #[test]
    fn test_empty_page_exhausts() {
        let (tx, _rx) = channel();
        let mut loader = LibraryLoader::new(seeded(10), tx, options());
        loader.refresh(EntryFilter::default()).unwrap();
        loader.request_next_page();

        assert_eq!(
            loader.apply_page(1, 3, 5, Vec::new()),
            PageOutcome::Applied {
                start: 3,
                exhausted: true
            }
        );
    }

    #[test]
    fn test_near_bottom_trigger() {
        let (tx, _rx) = channel();
        let mut loader = LibraryLoader::new(seeded(10), tx, options());
        loader.refresh(EntryFilter::default()).unwrap();

        assert!(!loader.maybe_request_next_page(1200.0, true));
        assert!(loader.maybe_request_next_page(399.0, true));

        loader.page_failed(1);
        assert_eq!(loader.state(), LoadState::Streaming);
        assert!(loader.maybe_request_next_page(5000.0, false));
    }

    #[test]
    fn test_genres_dirty_flag() {
        let (tx, _rx) = channel();
        let mut loader = LibraryLoader::new(seeded(1), tx, options());
        assert!(!loader.take_genres_dirty());
        loader.mark_genres_dirty();
        assert!(loader.take_genres_dirty());
        assert!(!loader.take_genres_dirty());
    }
}
