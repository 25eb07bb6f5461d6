//! Shared types, error model, and configuration for chatlist.
//!
//! This crate is the foundation depended on by all other chatlist crates.
//! It provides:
//! - [`ChatlistError`] — the unified error type
//! - Domain types ([`StoredLink`], [`TrackId`], [`BatchStatus`])
//! - [`ProgressReporter`] — progress callbacks for the CLI
//! - Track-link matching ([`find_track_links`], [`TrackId::from_link`])
//! - Configuration ([`AppConfig`], [`HarvestConfig`], [`PublishConfig`], config loading)

pub mod config;
pub mod error;
pub mod progress;
pub mod track;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ChatConfig, HarvestConfig, MAX_TRACKS_PER_REQUEST, PipelineConfig, PlaylistConfig,
    PublishConfig, PublishPolicy, SpotifyConfig, SpotifyCredentials, StorageConfig, config_dir,
    config_file_path, database_path, init_config, init_config_at, load_config, load_config_from,
    resolve_spotify_credentials, validate_chat_config, validate_spotify_config,
};
pub use error::{ChatlistError, Result};
pub use progress::{ProgressReporter, SilentProgress};
pub use track::{TRACK_ID_LEN, TRACK_URL_PREFIX, TrackId, find_track_links};
pub use types::{BatchStatus, CURRENT_SCHEMA_VERSION, StoredLink};
