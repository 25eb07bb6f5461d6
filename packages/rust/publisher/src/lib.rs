//! Playlist publishing from harvested links.
//!
//! This crate provides:
//! - [`api`] — the [`PlaylistApi`] trait the publisher drives
//! - [`spotify`] — [`SpotifyClient`], the Spotify Web API implementation
//! - [`auth`] — bearer-token acquisition
//! - [`batch`] — batch planning and the retry loop
//! - [`Publisher`] — stored links → one new playlist

pub mod api;
pub mod auth;
pub mod batch;
pub mod spotify;

use std::time::{Duration, Instant};

use chatlist_shared::{BatchStatus, ProgressReporter, PublishConfig, Result, TrackId};
use chatlist_storage::{PublishBatchRecord, Storage};
use tracing::{info, instrument, warn};

pub use api::{CreatedPlaylist, NewPlaylist, PlaylistApi};
pub use batch::{BatchAttempt, append_with_retry, plan_batches};
pub use spotify::{CurrentUser, SpotifyClient};

// ---------------------------------------------------------------------------
// PublishReport
// ---------------------------------------------------------------------------

/// What a publish run ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// A playlist was created and batches were appended.
    Published {
        playlist: CreatedPlaylist,
        /// Row in `publish_runs`; `None` when the run could not be recorded.
        run_id: Option<String>,
    },
    /// The link table was empty; nothing was created.
    NoLinks,
    /// No stored link yielded a valid track id; nothing was created.
    NoValidTracks,
}

/// Outcome of one append batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub index: usize,
    /// 1-based position of the first track.
    pub first_track: usize,
    /// 1-based position of the last track (inclusive).
    pub last_track: usize,
    pub track_count: usize,
    pub status: BatchStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Summary of a publish run.
#[derive(Debug, Clone)]
pub struct PublishReport {
    pub outcome: PublishOutcome,
    /// Rows read from storage.
    pub links_read: usize,
    /// Links dropped because no track id could be extracted.
    pub invalid_links: usize,
    pub batches: Vec<BatchOutcome>,
    pub tracks_added: usize,
    /// Tracks in abandoned batches.
    pub tracks_failed: usize,
    pub duration: Duration,
}

impl PublishReport {
    fn skipped(outcome: PublishOutcome, links_read: usize, invalid_links: usize, start: Instant) -> Self {
        Self {
            outcome,
            links_read,
            invalid_links,
            batches: Vec::new(),
            tracks_added: 0,
            tracks_failed: 0,
            duration: start.elapsed(),
        }
    }
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// Builds a new playlist from every stored link.
pub struct Publisher {
    config: PublishConfig,
}

impl Publisher {
    pub fn new(config: PublishConfig) -> Self {
        Self { config }
    }

    /// Read all links, create the playlist, and append tracks batch by batch.
    ///
    /// Errors reading storage or creating the playlist are returned. Batch
    /// failures are not: they are retried, then recorded and skipped.
    #[instrument(skip_all, fields(user_id = %self.config.user_id, name = %self.config.name))]
    pub async fn publish<P: PlaylistApi>(
        &self,
        api: &P,
        storage: &Storage,
        progress: &dyn ProgressReporter,
    ) -> Result<PublishReport> {
        let start = Instant::now();

        let links = storage.link_urls().await?;
        info!(count = links.len(), "found stored links");
        if links.is_empty() {
            warn!("no links stored, skipping playlist creation");
            return Ok(PublishReport::skipped(PublishOutcome::NoLinks, 0, 0, start));
        }

        let tracks = extract_track_ids(&links);
        let invalid_links = links.len() - tracks.len();
        if tracks.is_empty() {
            warn!(invalid_links, "no valid track ids, skipping playlist creation");
            return Ok(PublishReport::skipped(
                PublishOutcome::NoValidTracks,
                links.len(),
                invalid_links,
                start,
            ));
        }

        let playlist = api
            .create_playlist(
                &self.config.user_id,
                &NewPlaylist {
                    name: self.config.name.clone(),
                    description: self.config.description.clone(),
                    public: self.config.public,
                },
            )
            .await?;
        info!(playlist_id = %playlist.id, name = %playlist.name, "created playlist");

        // Run bookkeeping is best-effort once the playlist exists
        let run_id = match storage.insert_publish_run(&playlist.id, &playlist.name).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "failed to record publish run, batch outcomes will not be stored");
                None
            }
        };

        let policy = &self.config.policy;
        let ranges = plan_batches(tracks.len(), policy.batch_size);
        let mut batches = Vec::with_capacity(ranges.len());

        for (index, range) in ranges.iter().enumerate() {
            let batch = &tracks[range.clone()];
            let attempt = append_with_retry(api, &playlist.id, batch, range, policy).await;

            if let Some(run_id) = &run_id {
                let record = PublishBatchRecord {
                    run_id: run_id.clone(),
                    batch_index: index as u32,
                    first_track: (range.start + 1) as u32,
                    last_track: range.end as u32,
                    track_count: batch.len() as u32,
                    status: attempt.status,
                    attempts: attempt.attempts,
                    last_error: attempt.last_error.clone(),
                    track_ids: batch.iter().map(|t| t.as_str().to_string()).collect(),
                };
                if let Err(e) = storage.record_batch(&record).await {
                    warn!(batch = index, error = %e, "failed to record batch outcome");
                }
            }

            progress.batch_settled(index, ranges.len(), attempt.status);
            batches.push(BatchOutcome {
                index,
                first_track: range.start + 1,
                last_track: range.end,
                track_count: batch.len(),
                status: attempt.status,
                attempts: attempt.attempts,
                last_error: attempt.last_error,
            });

            if !policy.batch_pause.is_zero() {
                tokio::time::sleep(policy.batch_pause).await;
            }
        }

        let tracks_added = count_tracks(&batches, BatchStatus::Added);
        let tracks_failed = count_tracks(&batches, BatchStatus::Failed);

        let stats = serde_json::json!({
            "status": if tracks_failed == 0 { "completed" } else { "completed_with_failures" },
            "links_read": links.len(),
            "invalid_links": invalid_links,
            "batches": batches.len(),
            "tracks_added": tracks_added,
            "tracks_failed": tracks_failed,
        });
        if let Some(run_id) = &run_id {
            if let Err(e) = storage.finish_publish_run(run_id, &stats.to_string()).await {
                warn!(error = %e, "failed to close publish run");
            }
        }

        if tracks_failed > 0 {
            warn!(
                tracks_failed,
                run_id = run_id.as_deref().unwrap_or("unrecorded"),
                "some batches were abandoned"
            );
        }
        info!(
            tracks_added,
            tracks_failed,
            batches = batches.len(),
            "publish completed"
        );

        Ok(PublishReport {
            outcome: PublishOutcome::Published { playlist, run_id },
            links_read: links.len(),
            invalid_links,
            batches,
            tracks_added,
            tracks_failed,
            duration: start.elapsed(),
        })
    }
}

/// Keep every link that yields a valid track id, warning about the rest.
fn extract_track_ids(links: &[String]) -> Vec<TrackId> {
    links
        .iter()
        .filter_map(|link| match TrackId::from_link(link) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(link = %link, error = %e, "skipping invalid link");
                None
            }
        })
        .collect()
}

fn count_tracks(batches: &[BatchOutcome], status: BatchStatus) -> usize {
    batches
        .iter()
        .filter(|b| b.status == status)
        .map(|b| b.track_count)
        .sum()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use chatlist_shared::{ChatlistError, PublishPolicy, SilentProgress, StoredLink};
    use chrono::DateTime;
    use uuid::Uuid;

    use super::*;

    /// Records calls; append results follow a script, then succeed.
    #[derive(Default)]
    struct FakeApi {
        creates: Mutex<usize>,
        appends: Mutex<Vec<usize>>,
        append_times: Mutex<Vec<tokio::time::Instant>>,
        failures: Mutex<VecDeque<bool>>,
    }

    impl FakeApi {
        fn failing(script: &[bool]) -> Self {
            Self {
                failures: Mutex::new(script.iter().copied().collect()),
                ..Self::default()
            }
        }

        fn creates(&self) -> usize {
            *self.creates.lock().unwrap()
        }

        fn appends(&self) -> Vec<usize> {
            self.appends.lock().unwrap().clone()
        }

        /// Whole seconds from `start` to each append call.
        fn append_offsets(&self, start: tokio::time::Instant) -> Vec<u64> {
            self.append_times
                .lock()
                .unwrap()
                .iter()
                .map(|t| t.duration_since(start).as_secs())
                .collect()
        }
    }

    impl PlaylistApi for FakeApi {
        async fn create_playlist(&self, _user_id: &str, playlist: &NewPlaylist) -> Result<CreatedPlaylist> {
            *self.creates.lock().unwrap() += 1;
            Ok(CreatedPlaylist {
                id: "pl1".into(),
                name: playlist.name.clone(),
                url: None,
            })
        }

        async fn add_tracks(&self, _playlist_id: &str, tracks: &[TrackId]) -> Result<()> {
            self.appends.lock().unwrap().push(tracks.len());
            self.append_times.lock().unwrap().push(tokio::time::Instant::now());
            let fail = self.failures.lock().unwrap().pop_front().unwrap_or(false);
            if fail {
                Err(ChatlistError::api(502, "bad gateway"))
            } else {
                Ok(())
            }
        }
    }

    fn publisher_with(policy: PublishPolicy) -> Publisher {
        Publisher::new(PublishConfig {
            user_id: "listener".into(),
            name: "Wiggly O2 Legacy".into(),
            description: "Telegram Spotify links".into(),
            public: true,
            policy,
        })
    }

    fn publisher() -> Publisher {
        publisher_with(PublishPolicy {
            batch_size: 100,
            max_attempts: 3,
            backoff_step: Duration::ZERO,
            batch_pause: Duration::ZERO,
        })
    }

    async fn storage_with(links: impl IntoIterator<Item = String>) -> Storage {
        let tmp = std::env::temp_dir().join(format!("chatlist_publish_{}.db", Uuid::now_v7()));
        let storage = Storage::open(&tmp).await.expect("open test db");
        for (i, link) in links.into_iter().enumerate() {
            let row = StoredLink {
                message_id: i as i64 + 1,
                link,
                posted_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            };
            storage.insert_link(&row).await.unwrap();
        }
        storage
    }

    fn valid_links(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("https://open.spotify.com/track/{i:0>22}?si=x"))
            .collect()
    }

    #[tokio::test]
    async fn publishes_in_batches_of_one_hundred() {
        let storage = storage_with(valid_links(250)).await;
        let api = FakeApi::default();

        let report = publisher().publish(&api, &storage, &SilentProgress).await.unwrap();

        assert_eq!(api.creates(), 1);
        assert_eq!(api.appends(), vec![100, 100, 50]);
        assert_eq!(report.tracks_added, 250);
        assert_eq!(report.tracks_failed, 0);
        assert_eq!(report.batches[2].first_track, 201);
        assert_eq!(report.batches[2].last_track, 250);

        let PublishOutcome::Published {
            run_id: Some(run_id),
            ..
        } = report.outcome
        else {
            panic!("expected a recorded publish run");
        };
        let recorded = storage.list_batches(&run_id).await.unwrap();
        assert_eq!(recorded.len(), 3);
        assert!(recorded.iter().all(|b| b.status == BatchStatus::Added));
    }

    #[tokio::test]
    async fn batch_succeeds_on_third_attempt() {
        let storage = storage_with(valid_links(10)).await;
        let api = FakeApi::failing(&[true, true, false]);

        let report = publisher().publish(&api, &storage, &SilentProgress).await.unwrap();

        assert_eq!(api.appends(), vec![10, 10, 10]);
        assert_eq!(report.batches.len(), 1);
        assert_eq!(report.batches[0].status, BatchStatus::Added);
        assert_eq!(report.batches[0].attempts, 3);
        assert_eq!(report.tracks_added, 10);
    }

    #[tokio::test]
    async fn exhausted_batch_is_skipped_and_recorded() {
        let storage = storage_with(valid_links(150)).await;
        let api = FakeApi::failing(&[true, true, true]);

        let report = publisher().publish(&api, &storage, &SilentProgress).await.unwrap();

        // Three tries for the first batch, then the second batch still goes out
        assert_eq!(api.appends(), vec![100, 100, 100, 50]);
        assert_eq!(report.batches[0].status, BatchStatus::Failed);
        assert_eq!(report.batches[0].attempts, 3);
        assert!(report.batches[0].last_error.as_deref().unwrap().contains("bad gateway"));
        assert_eq!(report.batches[1].status, BatchStatus::Added);
        assert_eq!(report.tracks_added, 50);
        assert_eq!(report.tracks_failed, 100);

        let failed = storage.list_failed_batches().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].track_ids.len(), 100);
        assert_eq!(failed[0].first_track, 1);
    }

    #[tokio::test]
    async fn empty_table_creates_nothing() {
        let storage = storage_with(Vec::new()).await;
        let api = FakeApi::default();

        let report = publisher().publish(&api, &storage, &SilentProgress).await.unwrap();

        assert_eq!(report.outcome, PublishOutcome::NoLinks);
        assert_eq!(api.creates(), 0);
        assert!(api.appends().is_empty());
    }

    #[tokio::test]
    async fn invalid_links_are_dropped() {
        let mut links = valid_links(2);
        links.push("https://example.com/track/xyz".into());
        links.push("http://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC".into());
        let storage = storage_with(links).await;
        let api = FakeApi::default();

        let report = publisher().publish(&api, &storage, &SilentProgress).await.unwrap();

        assert_eq!(report.links_read, 4);
        assert_eq!(report.invalid_links, 2);
        assert_eq!(api.appends(), vec![2]);
    }

    #[tokio::test]
    async fn only_invalid_links_creates_nothing() {
        let storage = storage_with(vec!["https://example.com/track/xyz".to_string()]).await;
        let api = FakeApi::default();

        let report = publisher().publish(&api, &storage, &SilentProgress).await.unwrap();

        assert_eq!(report.outcome, PublishOutcome::NoValidTracks);
        assert_eq!(report.invalid_links, 1);
        assert_eq!(api.creates(), 0);
    }

    #[tokio::test]
    async fn unrecorded_run_still_appends_every_batch() {
        let tmp = std::env::temp_dir().join(format!("chatlist_publish_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.expect("open test db");
        for (i, link) in valid_links(5).into_iter().enumerate() {
            let row = StoredLink {
                message_id: i as i64 + 1,
                link,
                posted_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            };
            rw.insert_link(&row).await.unwrap();
        }
        drop(rw);
        let storage = Storage::open_readonly(&tmp).await.unwrap();
        let api = FakeApi::default();

        let report = publisher().publish(&api, &storage, &SilentProgress).await.unwrap();

        assert_eq!(api.creates(), 1);
        assert_eq!(api.appends(), vec![5]);
        assert_eq!(report.tracks_added, 5);
        let PublishOutcome::Published { run_id, .. } = report.outcome else {
            panic!("expected a published playlist");
        };
        assert_eq!(run_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_batch_waits_after_every_attempt() {
        let storage = storage_with(valid_links(150)).await;
        let api = FakeApi::failing(&[true, true, true]);

        let start = tokio::time::Instant::now();
        let report = publisher_with(PublishPolicy::default())
            .publish(&api, &storage, &SilentProgress)
            .await
            .unwrap();

        // Attempts at 0s, 2s, 6s; then 6s of backoff and the 1s pause
        assert_eq!(api.append_offsets(start), vec![0, 2, 6, 13]);
        assert_eq!(tokio::time::Instant::now().duration_since(start).as_secs(), 14);
        assert_eq!(report.tracks_failed, 100);
        assert_eq!(report.tracks_added, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn batches_are_paused_one_second_apart() {
        let storage = storage_with(valid_links(250)).await;
        let api = FakeApi::failing(&[true, false]);

        let start = tokio::time::Instant::now();
        publisher_with(PublishPolicy::default())
            .publish(&api, &storage, &SilentProgress)
            .await
            .unwrap();

        // First batch retried after 2s, then one batch per second
        assert_eq!(api.append_offsets(start), vec![0, 2, 3, 4]);
        assert_eq!(api.appends(), vec![100, 100, 100, 50]);
    }
}
