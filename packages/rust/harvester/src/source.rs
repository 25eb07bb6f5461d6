//! Chat-history source abstraction.

use std::future::Future;

use chatlist_shared::Result;
use chrono::{DateTime, Utc};

/// Position in a conversation's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// No boundary yet: start from the most recent message.
    Latest,
    /// Continue from this message id towards older messages.
    From(i64),
}

impl Cursor {
    /// Wire value for `from_message_id` (`0` means "latest").
    pub fn from_message_id(self) -> i64 {
        match self {
            Self::Latest => 0,
            Self::From(id) => id,
        }
    }
}

/// Content of a chat message. Only text is scanned for links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    Other,
}

/// One message from a history page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: i64,
    pub date: DateTime<Utc>,
    pub content: MessageContent,
}

impl ChatMessage {
    /// Text body, if this is a text message.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(text) => Some(text),
            MessageContent::Other => None,
        }
    }
}

/// Paginated, newest-first access to a conversation's messages.
pub trait ChatHistory: Send + Sync {
    /// Fetch up to `limit` messages starting at `cursor` and going back in time.
    ///
    /// An empty page means the start of the history has been reached.
    fn fetch_history(
        &self,
        conversation_id: i64,
        cursor: Cursor,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<ChatMessage>>> + Send;
}
