//! Music-service playlist operations used by the publisher.

use std::future::Future;

use chatlist_shared::{Result, TrackId};

/// Parameters of a playlist to create.
#[derive(Debug, Clone)]
pub struct NewPlaylist {
    pub name: String,
    pub description: String,
    pub public: bool,
}

/// A playlist as returned by the service after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPlaylist {
    pub id: String,
    pub name: String,
    /// Shareable web link, when the service returns one.
    pub url: Option<String>,
}

/// The two playlist mutations the publisher needs.
pub trait PlaylistApi: Send + Sync {
    /// Create a playlist owned by `user_id`.
    fn create_playlist(
        &self,
        user_id: &str,
        playlist: &NewPlaylist,
    ) -> impl Future<Output = Result<CreatedPlaylist>> + Send;

    /// Append `tracks` (at most 100) to the end of a playlist.
    fn add_tracks(
        &self,
        playlist_id: &str,
        tracks: &[TrackId],
    ) -> impl Future<Output = Result<()>> + Send;
}
