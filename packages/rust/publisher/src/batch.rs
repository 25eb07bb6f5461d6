//! Batch planning and the per-batch retry loop.

use std::ops::Range;

use chatlist_shared::{BatchStatus, PublishPolicy, TrackId};
use tracing::{info, warn};

use crate::api::PlaylistApi;

/// Split `len` items into consecutive ranges of at most `size`.
pub fn plan_batches(len: usize, size: usize) -> Vec<Range<usize>> {
    let size = size.max(1);
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}

/// Result of trying to append one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchAttempt {
    pub status: BatchStatus,
    /// Calls made, including the successful one.
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Append one batch, retrying with linear backoff.
///
/// Every failed attempt `n` is followed by a wait of `n * backoff_step`, the
/// last one included. After `max_attempts` failures the batch is given up on.
pub async fn append_with_retry<P: PlaylistApi>(
    api: &P,
    playlist_id: &str,
    tracks: &[TrackId],
    range: &Range<usize>,
    policy: &PublishPolicy,
) -> BatchAttempt {
    let (first, last) = (range.start + 1, range.end);
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        match api.add_tracks(playlist_id, tracks).await {
            Ok(()) => {
                info!(first, last, attempt, "added batch");
                return BatchAttempt {
                    status: BatchStatus::Added,
                    attempts: attempt,
                    last_error: None,
                };
            }
            Err(e) => {
                warn!(first, last, attempt, error = %e, "failed to add batch");
                last_error = Some(e.to_string());
                tokio::time::sleep(policy.backoff_step * attempt).await;
            }
        }
    }

    warn!(
        first,
        last,
        attempts = policy.max_attempts,
        "giving up on batch, its tracks were not added"
    );
    BatchAttempt {
        status: BatchStatus::Failed,
        attempts: policy.max_attempts,
        last_error,
    }
}
