//! Background auto-match sweep.
//!
//! Walks every unmatched entry one at a time, pausing between entries so the
//! remote service is not flooded. The sweep can be cancelled between entries;
//! a request already in flight is allowed to finish.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reelvault_common::EntryId;
use reelvault_db::queries::entries;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, warn};

use super::matcher::Matcher;
use crate::loader::delivery::{Delivery, DeliverySender};

/// Default pause between two entries.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(250);

/// Outcome for one processed entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchProgress {
    /// Zero-based position in the sweep.
    pub index: usize,
    pub total: usize,
    pub entry_id: EntryId,
    pub title: String,
    pub matched: bool,
}

/// Final result of a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub canceled: bool,
    pub matched: usize,
    pub processed: usize,
}

/// Auto-match sweep over all unmatched entries.
pub struct AutoMatchSweep {
    matcher: Arc<Matcher>,
    delay: Duration,
    cancel: Arc<AtomicBool>,
}

impl AutoMatchSweep {
    pub fn new(matcher: Arc<Matcher>, delay: Duration) -> Self {
        Self {
            matcher,
            delay,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops the sweep before its next entry when set.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    fn is_canceled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Run the sweep to completion or cancellation.
    ///
    /// Progress and the final outcome are also posted to `sink` when given.
    /// A sweep that cannot list its entries posts a `MatchDone` carrying the
    /// error before returning it.
    pub async fn run(&self, sink: Option<&DeliverySender>) -> Result<SweepOutcome> {
        let outcome = self.sweep(sink).await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Auto-match sweep failed");
                if let Some(sink) = sink {
                    sink.send(Delivery::MatchDone {
                        canceled: false,
                        matched: 0,
                        processed: 0,
                        error: Some(format!("{e:#}")),
                    });
                }
                return Err(e);
            }
        };

        info!(
            canceled = outcome.canceled,
            matched = outcome.matched,
            processed = outcome.processed,
            "Auto-match sweep finished"
        );
        if let Some(sink) = sink {
            sink.send(Delivery::MatchDone {
                canceled: outcome.canceled,
                matched: outcome.matched,
                processed: outcome.processed,
                error: None,
            });
        }
        Ok(outcome)
    }

    async fn sweep(&self, sink: Option<&DeliverySender>) -> Result<SweepOutcome> {
        let mut outcome = SweepOutcome::default();

        if !self.matcher.provider().is_available() {
            warn!("No API key configured; auto-match skipped");
            return Ok(outcome);
        }

        let pending = {
            let conn = self.matcher.catalog().conn()?;
            entries::list_unmatched(&conn)?
        };
        let total = pending.len();
        info!(total, "Starting auto-match sweep");

        for (index, entry) in pending.into_iter().enumerate() {
            if index > 0 {
                sleep(self.delay).await;
            }
            if self.is_canceled() {
                outcome.canceled = true;
                break;
            }

            let matched = match self.matcher.auto_match(&entry).await {
                Ok(matched) => matched,
                Err(e) => {
                    warn!(entry_id = %entry.id, error = %e, "Auto-match failed");
                    false
                }
            };

            outcome.processed += 1;
            if matched {
                outcome.matched += 1;
            }

            if let Some(sink) = sink {
                sink.send(Delivery::MatchProgress(MatchProgress {
                    index,
                    total,
                    entry_id: entry.id,
                    title: entry.title,
                    matched,
                }));
            }
        }

        Ok(outcome)
    }

    /// Run the sweep on a tokio task.
    pub fn spawn(self, sink: DeliverySender) -> JoinHandle<Result<SweepOutcome>> {
        tokio::spawn(async move { self.run(Some(&sink)).await })
    }
}
