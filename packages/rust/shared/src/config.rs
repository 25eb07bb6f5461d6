//! Application configuration for chatlist.
//!
//! User config lives at `~/.chatlist/chatlist.toml`.
//! A `--config` path on the CLI overrides the default location; missing
//! sections fall back to defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ChatlistError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "chatlist.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".chatlist";

/// Per-call track limit of the playlist-append endpoint.
pub const MAX_TRACKS_PER_REQUEST: usize = 100;

// ---------------------------------------------------------------------------
// Config structs (matching chatlist.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database location.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Chat-history source.
    #[serde(default)]
    pub chat: ChatConfig,

    /// Spotify account and credential env vars.
    #[serde(default)]
    pub spotify: SpotifyConfig,

    /// Playlist shape and batching policy.
    #[serde(default)]
    pub playlist: PlaylistConfig,

    /// `run` command gating.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the libSQL database file. A leading `~/` expands to the home dir.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "~/.chatlist/chatlist.db".into()
}

/// `[chat]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// TDLib JSON gateway endpoint that accepts `getChatHistory` requests.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Conversation to scan. `0` means "not configured".
    #[serde(default)]
    pub conversation_id: i64,

    /// Messages requested per history page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// HTTP timeout for gateway requests.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            conversation_id: 0,
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:8088/td".into()
}
fn default_page_size() -> u32 {
    100
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[spotify]` section.
///
/// Only env var *names* are stored here, never the secrets themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyConfig {
    /// Web API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Accounts service base URL (token exchange).
    #[serde(default = "default_accounts_base")]
    pub accounts_base: String,

    /// Account that will own created playlists.
    #[serde(default)]
    pub user_id: String,

    /// Env var holding a ready-to-use bearer token.
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,

    /// Env var holding a refresh token (used when no access token is set).
    #[serde(default = "default_refresh_token_env")]
    pub refresh_token_env: String,

    /// Env var holding the OAuth client id.
    #[serde(default = "default_client_id_env")]
    pub client_id_env: String,

    /// Env var holding the OAuth client secret.
    #[serde(default = "default_client_secret_env")]
    pub client_secret_env: String,

    /// HTTP timeout for API requests.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            accounts_base: default_accounts_base(),
            user_id: String::new(),
            access_token_env: default_access_token_env(),
            refresh_token_env: default_refresh_token_env(),
            client_id_env: default_client_id_env(),
            client_secret_env: default_client_secret_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.spotify.com/v1".into()
}
fn default_accounts_base() -> String {
    "https://accounts.spotify.com".into()
}
fn default_access_token_env() -> String {
    "SPOTIFY_ACCESS_TOKEN".into()
}
fn default_refresh_token_env() -> String {
    "SPOTIFY_REFRESH_TOKEN".into()
}
fn default_client_id_env() -> String {
    "SPOTIFY_CLIENT_ID".into()
}
fn default_client_secret_env() -> String {
    "SPOTIFY_CLIENT_SECRET".into()
}

/// `[playlist]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistConfig {
    #[serde(default = "default_playlist_name")]
    pub name: String,

    #[serde(default = "default_playlist_description")]
    pub description: String,

    #[serde(default = "default_true")]
    pub public: bool,

    /// Tracks per append call (clamped to 100).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Attempts per batch before it is abandoned.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff after failed attempt `n` is `n * backoff_step_secs`.
    #[serde(default = "default_backoff_step_secs")]
    pub backoff_step_secs: u64,

    /// Pause after every batch.
    #[serde(default = "default_batch_pause_secs")]
    pub batch_pause_secs: u64,
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            name: default_playlist_name(),
            description: default_playlist_description(),
            public: true,
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            backoff_step_secs: default_backoff_step_secs(),
            batch_pause_secs: default_batch_pause_secs(),
        }
    }
}

fn default_playlist_name() -> String {
    "Wiggly O2 Legacy".into()
}
fn default_playlist_description() -> String {
    "Telegram Spotify links".into()
}
fn default_true() -> bool {
    true
}
fn default_batch_size() -> usize {
    MAX_TRACKS_PER_REQUEST
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_step_secs() -> u64 {
    2
}
fn default_batch_pause_secs() -> u64 {
    1
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// When set, `run` only publishes if the stored link count equals this value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_link_count: Option<u64>,
}

// ---------------------------------------------------------------------------
// Runtime configs (derived from AppConfig)
// ---------------------------------------------------------------------------

/// Runtime harvest configuration.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Conversation to scan.
    pub conversation_id: i64,
    /// Messages per history page.
    pub page_size: u32,
}

impl From<&AppConfig> for HarvestConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            conversation_id: config.chat.conversation_id,
            page_size: config.chat.page_size.max(1),
        }
    }
}

/// Batching and retry behaviour of the publisher.
#[derive(Debug, Clone)]
pub struct PublishPolicy {
    /// Tracks per append call, at most [`MAX_TRACKS_PER_REQUEST`].
    pub batch_size: usize,
    /// Attempts per batch.
    pub max_attempts: u32,
    /// Backoff unit; failed attempt `n` waits `n * backoff_step`.
    pub backoff_step: Duration,
    /// Pause after each batch, success or not.
    pub batch_pause: Duration,
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self::from(&PlaylistConfig::default())
    }
}

impl From<&PlaylistConfig> for PublishPolicy {
    fn from(config: &PlaylistConfig) -> Self {
        Self {
            batch_size: config.batch_size.clamp(1, MAX_TRACKS_PER_REQUEST),
            max_attempts: config.max_attempts.max(1),
            backoff_step: Duration::from_secs(config.backoff_step_secs),
            batch_pause: Duration::from_secs(config.batch_pause_secs),
        }
    }
}

/// Runtime publish configuration.
#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// Account that owns the new playlist.
    pub user_id: String,
    /// Playlist name.
    pub name: String,
    /// Playlist description.
    pub description: String,
    /// Public visibility flag.
    pub public: bool,
    /// Batching and retry policy.
    pub policy: PublishPolicy,
}

impl From<&AppConfig> for PublishConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_id: config.spotify.user_id.clone(),
            name: config.playlist.name.clone(),
            description: config.playlist.description.clone(),
            public: config.playlist.public,
            policy: PublishPolicy::from(&config.playlist),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.chatlist/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ChatlistError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.chatlist/chatlist.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ChatlistError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ChatlistError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = config_file_path()?;
    init_config_at(&path)?;
    Ok(path)
}

/// Write a default config file at `path`, creating parent directories.
pub fn init_config_at(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ChatlistError::io(dir, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ChatlistError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| ChatlistError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(())
}

/// Resolve `storage.database_path`, expanding a leading `~/`.
pub fn database_path(config: &AppConfig) -> Result<PathBuf> {
    let raw = &config.storage.database_path;
    match raw.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| ChatlistError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(raw)),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Check the `[chat]` section is usable for a harvest.
pub fn validate_chat_config(config: &AppConfig) -> Result<Url> {
    if config.chat.conversation_id == 0 {
        return Err(ChatlistError::config(
            "chat.conversation_id is not set. Add it to the [chat] section of the config file.",
        ));
    }
    Url::parse(&config.chat.gateway_url).map_err(|e| {
        ChatlistError::config(format!(
            "chat.gateway_url '{}' is not a valid URL: {e}",
            config.chat.gateway_url
        ))
    })
}

/// Check the `[spotify]` section is usable for a publish.
pub fn validate_spotify_config(config: &AppConfig) -> Result<()> {
    if config.spotify.user_id.trim().is_empty() {
        return Err(ChatlistError::config(
            "spotify.user_id is not set. Add the account id that should own the playlist.",
        ));
    }
    for (field, value) in [
        ("spotify.api_base", &config.spotify.api_base),
        ("spotify.accounts_base", &config.spotify.accounts_base),
    ] {
        Url::parse(value)
            .map_err(|e| ChatlistError::config(format!("{field} '{value}' is not a valid URL: {e}")))?;
    }
    Ok(())
}

/// How the publisher obtains its bearer token.
#[derive(Clone)]
pub enum SpotifyCredentials {
    /// A token issued elsewhere, used as-is.
    AccessToken(String),
    /// A refresh token to exchange at the accounts service.
    RefreshToken {
        refresh_token: String,
        client_id: String,
        client_secret: String,
    },
}

impl std::fmt::Debug for SpotifyCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccessToken(_) => f.write_str("AccessToken(..)"),
            Self::RefreshToken { .. } => f.write_str("RefreshToken { .. }"),
        }
    }
}

/// Read Spotify credentials from the env vars named in the config.
///
/// An access token wins; otherwise a refresh token plus client id/secret are
/// required.
pub fn resolve_spotify_credentials(config: &SpotifyConfig) -> Result<SpotifyCredentials> {
    if let Some(token) = env_non_empty(&config.access_token_env) {
        return Ok(SpotifyCredentials::AccessToken(token));
    }

    let refresh_token = env_non_empty(&config.refresh_token_env);
    let client_id = env_non_empty(&config.client_id_env);
    let client_secret = env_non_empty(&config.client_secret_env);

    match (refresh_token, client_id, client_secret) {
        (Some(refresh_token), Some(client_id), Some(client_secret)) => {
            Ok(SpotifyCredentials::RefreshToken {
                refresh_token,
                client_id,
                client_secret,
            })
        }
        _ => Err(ChatlistError::config(format!(
            "Spotify credentials not found. Set {} or all of {}, {} and {}.",
            config.access_token_env,
            config.refresh_token_env,
            config.client_id_env,
            config.client_secret_env
        ))),
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("database_path"));
        assert!(toml_str.contains("SPOTIFY_ACCESS_TOKEN"));
        assert!(!toml_str.contains("expected_link_count"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.chat.page_size, 100);
        assert_eq!(parsed.playlist.name, "Wiggly O2 Legacy");
        assert!(parsed.playlist.public);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[chat]
conversation_id = -1001322114329

[spotify]
user_id = "listener"

[pipeline]
expected_link_count = 1234
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.chat.conversation_id, -1001322114329);
        assert_eq!(config.chat.page_size, 100);
        assert_eq!(config.pipeline.expected_link_count, Some(1234));
        assert!(validate_chat_config(&config).is_ok());
        assert!(validate_spotify_config(&config).is_ok());
    }

    #[test]
    fn publish_policy_clamps_batch_size() {
        let playlist = PlaylistConfig {
            batch_size: 500,
            max_attempts: 0,
            ..PlaylistConfig::default()
        };
        let policy = PublishPolicy::from(&playlist);
        assert_eq!(policy.batch_size, MAX_TRACKS_PER_REQUEST);
        assert_eq!(policy.max_attempts, 1);

        let defaults = PublishPolicy::default();
        assert_eq!(defaults.max_attempts, 3);
        assert_eq!(defaults.backoff_step, Duration::from_secs(2));
        assert_eq!(defaults.batch_pause, Duration::from_secs(1));
    }

    #[test]
    fn unset_conversation_is_rejected() {
        let config = AppConfig::default();
        let err = validate_chat_config(&config).unwrap_err();
        assert!(err.to_string().contains("conversation_id"));
        assert!(validate_spotify_config(&config).is_err());
    }

    #[test]
    fn database_path_expands_home() {
        let mut config = AppConfig::default();
        config.storage.database_path = "~/links/x.db".into();
        let home = dirs::home_dir().expect("home dir");
        assert_eq!(database_path(&config).unwrap(), home.join("links").join("x.db"));

        config.storage.database_path = "/tmp/links.db".into();
        assert_eq!(database_path(&config).unwrap(), PathBuf::from("/tmp/links.db"));
    }

    #[test]
    fn missing_credentials_are_reported() {
        // Unique env var names so parallel tests don't interfere
        let config = SpotifyConfig {
            access_token_env: "CL_TEST_NO_ACCESS_TOKEN_91823".into(),
            refresh_token_env: "CL_TEST_NO_REFRESH_TOKEN_91823".into(),
            client_id_env: "CL_TEST_NO_CLIENT_ID_91823".into(),
            client_secret_env: "CL_TEST_NO_CLIENT_SECRET_91823".into(),
            ..SpotifyConfig::default()
        };
        let err = resolve_spotify_credentials(&config).unwrap_err();
        assert!(err.to_string().contains("credentials not found"));
    }

    #[test]
    fn init_config_at_writes_loadable_defaults() {
        let dir = std::env::temp_dir().join(format!("chatlist_config_{}", std::process::id()));
        let path = dir.join("nested").join("chatlist.toml");

        init_config_at(&path).expect("init config");
        let loaded = load_config_from(&path).expect("load written config");
        assert_eq!(loaded.playlist.name, "Wiggly O2 Legacy");
        assert_eq!(loaded.chat.page_size, 100);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
