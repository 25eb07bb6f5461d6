//! The harvest loop: page through history, persist every track link.
//!
//! Failures never abort a harvest. A failed row write skips that row; a failed
//! page fetch ends the loop as if the history were exhausted.

use std::time::{Duration, Instant};

use chatlist_shared::{HarvestConfig, ProgressReporter, StoredLink, find_track_links};
use chatlist_storage::Storage;
use tracing::{debug, info, instrument, warn};

use crate::source::{ChatHistory, Cursor};

// ---------------------------------------------------------------------------
// HarvestReport
// ---------------------------------------------------------------------------

/// Why the harvest loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestEnd {
    /// The source returned an empty page.
    Exhausted,
    /// A page fetch failed; treated as end of history.
    SourceError(String),
    /// The source returned a page that did not move the cursor.
    Stalled,
}

/// Summary of a completed harvest.
#[derive(Debug, Clone)]
pub struct HarvestReport {
    /// Non-empty pages processed.
    pub pages: usize,
    /// Messages seen, of any content kind.
    pub messages_scanned: usize,
    /// Track links matched in text messages.
    pub links_found: usize,
    /// Links written as new rows.
    pub links_saved: usize,
    /// Links whose message was already stored.
    pub links_ignored: usize,
    /// Row writes that failed and were skipped.
    pub row_failures: usize,
    /// Why the loop stopped.
    pub end: HarvestEnd,
    /// Total duration of the harvest.
    pub duration: Duration,
}

// ---------------------------------------------------------------------------
// Harvester
// ---------------------------------------------------------------------------

/// Scans one conversation and upserts the track links it finds.
pub struct Harvester {
    config: HarvestConfig,
}

impl Harvester {
    pub fn new(config: HarvestConfig) -> Self {
        Self { config }
    }

    /// Walk the conversation from the newest message back to the oldest.
    #[instrument(skip_all, fields(conversation_id = self.config.conversation_id))]
    pub async fn harvest<H: ChatHistory>(
        &self,
        source: &H,
        storage: &Storage,
        progress: &dyn ProgressReporter,
    ) -> HarvestReport {
        let start_time = Instant::now();
        let mut cursor = Cursor::Latest;
        let mut pages = 0;
        let mut messages_scanned = 0;
        let mut links_found = 0;
        let mut links_saved = 0;
        let mut links_ignored = 0;
        let mut row_failures = 0;

        info!(page_size = self.config.page_size, "starting harvest");

        let end = loop {
            let page = match source
                .fetch_history(self.config.conversation_id, cursor, self.config.page_size)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(?cursor, error = %e, "history fetch failed, ending harvest");
                    break HarvestEnd::SourceError(e.to_string());
                }
            };

            let Some(last_id) = page.last().map(|m| m.id) else {
                debug!(?cursor, "empty page, history exhausted");
                break HarvestEnd::Exhausted;
            };
            pages += 1;

            for msg in &page {
                messages_scanned += 1;
                let Some(text) = msg.text() else {
                    continue;
                };

                for link in find_track_links(text) {
                    links_found += 1;
                    let row = StoredLink {
                        message_id: msg.id,
                        link: link.to_string(),
                        posted_at: msg.date,
                    };
                    match storage.insert_link(&row).await {
                        Ok(true) => {
                            links_saved += 1;
                            info!(message_id = msg.id, link, "saved link");
                        }
                        Ok(false) => {
                            links_ignored += 1;
                            debug!(message_id = msg.id, link, "message already stored");
                        }
                        Err(e) => {
                            row_failures += 1;
                            warn!(message_id = msg.id, error = %e, "failed to store link");
                        }
                    }
                }
            }

            progress.page_scanned(pages, messages_scanned, links_saved);

            let next = Cursor::From(last_id);
            if next == cursor {
                warn!(?cursor, "history cursor did not advance, ending harvest");
                break HarvestEnd::Stalled;
            }
            cursor = next;
        };

        let report = HarvestReport {
            pages,
            messages_scanned,
            links_found,
            links_saved,
            links_ignored,
            row_failures,
            end,
            duration: start_time.elapsed(),
        };

        info!(
            pages = report.pages,
            messages = report.messages_scanned,
            found = report.links_found,
            saved = report.links_saved,
            ignored = report.links_ignored,
            failures = report.row_failures,
            end = ?report.end,
            duration_ms = report.duration.as_millis(),
            "harvest completed"
        );

        report
    }
}
