//! Spotify Web API client.

use std::time::Duration;

use chatlist_shared::{ChatlistError, Result, SpotifyConfig, SpotifyCredentials, TrackId};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use url::Url;

use crate::api::{CreatedPlaylist, NewPlaylist, PlaylistApi};
use crate::auth;

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("chatlist/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CreatePlaylistBody<'a> {
    name: &'a str,
    description: &'a str,
    public: bool,
}

#[derive(Debug, Deserialize)]
struct PlaylistBody {
    id: String,
    name: String,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Serialize)]
struct AddTracksBody {
    uris: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// The signed-in account.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Authenticated Spotify Web API session.
pub struct SpotifyClient {
    client: Client,
    api_base: Url,
    token: String,
}

impl SpotifyClient {
    /// Build a session, exchanging a refresh token first when needed.
    pub async fn connect(config: &SpotifyConfig, credentials: &SpotifyCredentials) -> Result<Self> {
        let client = build_client(config.timeout_secs)?;
        let accounts_base = parse_base(&config.accounts_base)?;
        let token = auth::access_token(&client, &accounts_base, credentials).await?;

        Ok(Self {
            client,
            api_base: parse_base(&config.api_base)?,
            token,
        })
    }

    /// Build a session from an already issued token.
    pub fn with_token(config: &SpotifyConfig, token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            api_base: parse_base(&config.api_base)?,
            token: token.into(),
        })
    }

    /// Look up the account the token belongs to.
    #[instrument(skip(self))]
    pub async fn current_user(&self) -> Result<CurrentUser> {
        let url = self.endpoint(&["me"])?;
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ChatlistError::Network(format!("{url}: {e}")))?;

        let user: CurrentUser = check(response)
            .await?
            .json()
            .await
            .map_err(|e| ChatlistError::parse(format!("current user response: {e}")))?;

        info!(
            user_id = %user.id,
            display_name = user.display_name.as_deref().unwrap_or(""),
            "logged in"
        );
        Ok(user)
    }

    /// `api_base` joined with percent-encoded path segments.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| ChatlistError::config(format!("invalid API base URL: {}", self.api_base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

impl PlaylistApi for SpotifyClient {
    #[instrument(skip(self, playlist), fields(name = %playlist.name))]
    async fn create_playlist(&self, user_id: &str, playlist: &NewPlaylist) -> Result<CreatedPlaylist> {
        let url = self.endpoint(&["users", user_id, "playlists"])?;
        let response = self
            .client
            .post(url.clone())
            .bearer_auth(&self.token)
            .json(&CreatePlaylistBody {
                name: &playlist.name,
                description: &playlist.description,
                public: playlist.public,
            })
            .send()
            .await
            .map_err(|e| ChatlistError::Network(format!("{url}: {e}")))?;

        let body: PlaylistBody = check(response)
            .await?
            .json()
            .await
            .map_err(|e| ChatlistError::parse(format!("create playlist response: {e}")))?;

        Ok(CreatedPlaylist {
            id: body.id,
            name: body.name,
            url: body.external_urls.spotify,
        })
    }

    #[instrument(skip(self, tracks), fields(count = tracks.len()))]
    async fn add_tracks(&self, playlist_id: &str, tracks: &[TrackId]) -> Result<()> {
        let url = self.endpoint(&["playlists", playlist_id, "tracks"])?;
        let response = self
            .client
            .post(url.clone())
            .bearer_auth(&self.token)
            .json(&AddTracksBody {
                uris: tracks.iter().map(TrackId::uri).collect(),
            })
            .send()
            .await
            .map_err(|e| ChatlistError::Network(format!("{url}: {e}")))?;

        check(response).await?;
        debug!("tracks appended");
        Ok(())
    }
}

fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ChatlistError::Network(format!("failed to build HTTP client: {e}")))
}

fn parse_base(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| ChatlistError::config(format!("invalid base URL '{raw}': {e}")))
}

/// Pass successful responses through; turn the rest into [`ChatlistError::Api`].
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    Err(ChatlistError::api(status.as_u16(), message))
}
