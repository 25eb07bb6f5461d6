//! Core domain types shared by the harvester, publisher, and storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current schema version of the chatlist database.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// StoredLink
// ---------------------------------------------------------------------------

/// A track link found in a chat message, as persisted in `track_links`.
///
/// Rows are keyed by `message_id`; once written they are never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredLink {
    /// Identifier of the chat message the link was found in.
    pub message_id: i64,
    /// The matched link, exactly as it appeared in the message.
    pub link: String,
    /// When the message was posted.
    pub posted_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Batch status
// ---------------------------------------------------------------------------

/// Final state of one playlist-append batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// The batch was appended to the playlist.
    Added,
    /// Every attempt failed; the batch was abandoned.
    Failed,
}

impl BatchStatus {
    /// Column value used in `publish_batches.status`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "added" => Ok(Self::Added),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown batch status '{other}'")),
        }
    }
}
