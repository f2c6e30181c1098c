//! Single-consumer delivery queue.
//!
//! Every background task (page fetch, count query, scan, match sweep,
//! thumbnail worker) reports back by posting a [`Delivery`] here. Only the
//! coordination thread drains the queue, so consumer-facing state is never
//! touched from two threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::RgbaImage;
use reelvault_common::EntryId;
use reelvault_db::models::CatalogEntry;
use tokio::sync::mpsc;
use tracing::trace;

use crate::metadata::sweep::MatchProgress;
use crate::scanner::ScanProgress;

/// A result crossing back to the coordination thread.
#[derive(Debug)]
pub enum Delivery {
    /// Rows of a background page fetch.
    Page {
        generation: u64,
        offset: u32,
        requested: u32,
        rows: Vec<CatalogEntry>,
    },
    /// A background page fetch failed.
    PageFailed { generation: u64, error: String },
    /// Totals for the current filter.
    Counts {
        generation: u64,
        total: u32,
        unmatched: u32,
    },
    /// The background count query failed.
    CountsFailed { generation: u64, error: String },
    ScanProgress(ScanProgress),
    /// A scan finished. `error` is set when it stopped early.
    ScanFinished {
        added: usize,
        error: Option<String>,
    },
    MatchProgress(MatchProgress),
    /// The auto-match sweep stopped. `error` is set when it could not run.
    MatchDone {
        canceled: bool,
        matched: usize,
        processed: usize,
        error: Option<String>,
    },
    /// Genre links of some entry changed outside a scan or sweep.
    GenresChanged,
    /// A decoded thumbnail, or `None` for the placeholder.
    Thumbnail {
        identity: EntryId,
        image: Option<RgbaImage>,
    },
}

/// Create a connected sender/queue pair.
pub fn channel() -> (DeliverySender, DeliveryQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    let outstanding = Arc::new(AtomicUsize::new(0));
    (
        DeliverySender {
            tx,
            outstanding_progress: outstanding.clone(),
        },
        DeliveryQueue {
            rx,
            outstanding_progress: outstanding,
        },
    )
}

/// Cloneable posting side of the queue.
#[derive(Clone)]
pub struct DeliverySender {
    tx: mpsc::UnboundedSender<Delivery>,
    outstanding_progress: Arc<AtomicUsize>,
}

impl DeliverySender {
    /// Post a delivery. A closed queue means the consumer is gone; the
    /// delivery is dropped.
    pub fn send(&self, delivery: Delivery) {
        let is_progress = matches!(delivery, Delivery::MatchProgress(_));
        if is_progress {
            self.outstanding_progress.fetch_add(1, Ordering::SeqCst);
        }
        if let Err(e) = self.tx.send(delivery) {
            if is_progress {
                self.outstanding_progress.fetch_sub(1, Ordering::SeqCst);
            }
            trace!(delivery = ?e.0, "Delivery queue closed");
        }
    }
}

/// Receiving side, owned by the coordination thread.
pub struct DeliveryQueue {
    rx: mpsc::UnboundedReceiver<Delivery>,
    outstanding_progress: Arc<AtomicUsize>,
}

impl DeliveryQueue {
    /// Next delivery if one is ready.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok().inspect(|d| self.observed(d))
    }

    /// Block the current thread until a delivery arrives.
    ///
    /// Returns `None` once every sender is gone. Must not be called from
    /// inside an async runtime.
    pub fn blocking_recv(&mut self) -> Option<Delivery> {
        let delivery = self.rx.blocking_recv();
        if let Some(d) = &delivery {
            self.observed(d);
        }
        delivery
    }

    /// Wait for the next delivery.
    pub async fn recv(&mut self) -> Option<Delivery> {
        let delivery = self.rx.recv().await;
        if let Some(d) = &delivery {
            self.observed(d);
        }
        delivery
    }

    /// Match progress items sent but not yet drained.
    pub fn outstanding_progress(&self) -> usize {
        self.outstanding_progress.load(Ordering::SeqCst)
    }

    /// Drop everything currently queued without dispatching it.
    pub fn discard_pending(&mut self) -> usize {
        let mut dropped = 0;
        while let Some(d) = self.try_recv() {
            trace!(delivery = ?d, "Discarded");
            dropped += 1;
        }
        dropped
    }

    fn observed(&self, delivery: &Delivery) {
        if matches!(delivery, Delivery::MatchProgress(_)) {
            self.outstanding_progress.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn progress(index: usize) -> Delivery {
        Delivery::MatchProgress(MatchProgress {
            index,
            total: 2,
            entry_id: EntryId::from(1),
            title: "Heat".into(),
            matched: true,
        })
    }

    #[test]
    fn test_fifo_order() {
        let (tx, mut rx) = channel();
        tx.send(Delivery::ScanFinished {
            added: 1,
            error: None,
        });
        tx.send(Delivery::ScanFinished {
            added: 2,
            error: None,
        });

        assert_matches!(rx.try_recv(), Some(Delivery::ScanFinished { added: 1, .. }));
        assert_matches!(rx.try_recv(), Some(Delivery::ScanFinished { added: 2, .. }));
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_outstanding_progress_counter() {
        let (tx, mut rx) = channel();
        tx.send(progress(0));
        tx.send(progress(1));
        assert_eq!(rx.outstanding_progress(), 2);

        rx.try_recv();
        assert_eq!(rx.outstanding_progress(), 1);
        rx.try_recv();
        assert_eq!(rx.outstanding_progress(), 0);
    }

    #[test]
    fn test_send_after_close_is_dropped() {
        let (tx, rx) = channel();
        drop(rx);
        tx.send(progress(0));
        assert_eq!(tx.outstanding_progress.load(Ordering::SeqCst), 0);
    }
}
