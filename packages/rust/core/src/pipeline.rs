//! End-to-end `run` pipeline: harvest → count check → publish.

use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use chatlist_harvester::{ChatHistory, HarvestReport, Harvester};
use chatlist_publisher::{PlaylistApi, PublishReport, Publisher};
use chatlist_shared::{AppConfig, HarvestConfig, ProgressReporter, PublishConfig, Result};
use chatlist_storage::Storage;

/// Result of the `run` pipeline.
#[derive(Debug)]
pub struct PipelineReport {
    pub harvest: HarvestReport,
    /// Rows in the link table after the harvest.
    pub stored_links: u64,
    /// `None` when the count check held publishing back.
    pub publish: Option<PublishReport>,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Run the full pipeline.
///
/// 1. Harvest the configured conversation
/// 2. Count stored links
/// 3. If `pipeline.expected_link_count` is set and differs, stop
/// 4. Publish
#[instrument(skip_all, fields(conversation_id = config.chat.conversation_id))]
pub async fn run_pipeline<H: ChatHistory, P: PlaylistApi>(
    config: &AppConfig,
    history: &H,
    api: &P,
    storage: &Storage,
    progress: &dyn ProgressReporter,
) -> Result<PipelineReport> {
    let start = Instant::now();

    // --- Phase 1: Harvest ---
    progress.phase("Harvesting chat history");
    let harvest = Harvester::new(HarvestConfig::from(config))
        .harvest(history, storage, progress)
        .await;

    // --- Phase 2: Count check ---
    let stored_links = storage.count_links().await?;
    info!(stored_links, "link table after harvest");

    if let Some(expected) = config.pipeline.expected_link_count {
        if stored_links != expected {
            warn!(
                stored_links,
                expected, "stored link count does not match, skipping publish"
            );
            progress.done();
            return Ok(PipelineReport {
                harvest,
                stored_links,
                publish: None,
                elapsed: start.elapsed(),
            });
        }
    }

    // --- Phase 3: Publish ---
    progress.phase("Publishing playlist");
    let publish = Publisher::new(PublishConfig::from(config))
        .publish(api, storage, progress)
        .await?;

    progress.done();

    let elapsed = start.elapsed();
    info!(elapsed_ms = elapsed.as_millis(), "pipeline completed");

    Ok(PipelineReport {
        harvest,
        stored_links,
        publish: Some(publish),
        elapsed,
    })
}
