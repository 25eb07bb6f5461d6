//! Spotify track links: finding them in free text and turning them into ids.
//!
//! Two different rules apply. Harvesting is lenient (`http` or `https`, any
//! alphanumeric tail) so that every shared link gets recorded. Publishing is
//! strict: the link must start with the canonical `https` prefix and carry a
//! 22-character id.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{ChatlistError, Result};

/// Canonical prefix every publishable track link starts with.
pub const TRACK_URL_PREFIX: &str = "https://open.spotify.com/track/";

/// Length of a Spotify base-62 track identifier.
pub const TRACK_ID_LEN: usize = 22;

/// Matches a track link anywhere in a message body.
static TRACK_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://open\.spotify\.com/track/[a-zA-Z0-9]+").expect("track link regex")
});

/// Return every non-overlapping track link in `text`, in order of appearance.
pub fn find_track_links(text: &str) -> Vec<&str> {
    TRACK_LINK_RE.find_iter(text).map(|m| m.as_str()).collect()
}

// ---------------------------------------------------------------------------
// TrackId
// ---------------------------------------------------------------------------

/// A validated Spotify track identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackId(String);

impl TrackId {
    /// Extract the track id from a stored link.
    ///
    /// The link must begin with [`TRACK_URL_PREFIX`]; anything from the first
    /// `?` on is discarded, and what remains must be exactly
    /// [`TRACK_ID_LEN`] characters.
    pub fn from_link(link: &str) -> Result<Self> {
        let rest = link.strip_prefix(TRACK_URL_PREFIX).ok_or_else(|| {
            ChatlistError::validation(format!("not a Spotify track link: {link}"))
        })?;

        let id = rest.split('?').next().unwrap_or_default();
        if id.chars().count() != TRACK_ID_LEN {
            return Err(ChatlistError::validation(format!(
                "track id '{id}' has {} characters, expected {TRACK_ID_LEN}",
                id.chars().count()
            )));
        }

        Ok(Self(id.to_string()))
    }

    /// The bare identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Spotify URI form used by the Web API (`spotify:track:<id>`).
    pub fn uri(&self) -> String {
        format!("spotify:track:{}", self.0)
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
