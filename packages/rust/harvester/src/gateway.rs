//! HTTP client for a TDLib JSON gateway.
//!
//! The gateway accepts TDLib API objects as JSON (`{"@type": "getChatHistory", ...}`)
//! and answers with the TDLib result object, either `messages` or `error`.

use std::time::Duration;

use chatlist_shared::{ChatlistError, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::source::{ChatHistory, ChatMessage, Cursor, MessageContent};

/// User-Agent string for gateway requests.
const USER_AGENT: &str = concat!("chatlist/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GetChatHistory {
    #[serde(rename = "@type")]
    kind: &'static str,
    chat_id: i64,
    from_message_id: i64,
    offset: i32,
    limit: u32,
    only_local: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "@type", rename_all = "camelCase")]
enum TdResponse {
    Messages {
        #[serde(default)]
        messages: Vec<Option<TdMessage>>,
    },
    Error {
        code: i32,
        message: String,
    },
}

#[derive(Debug, Deserialize)]
struct TdMessage {
    id: i64,
    date: i64,
    content: TdContent,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "@type")]
enum TdContent {
    #[serde(rename = "messageText")]
    Text { text: TdFormattedText },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct TdFormattedText {
    text: String,
}

impl From<TdMessage> for ChatMessage {
    fn from(msg: TdMessage) -> Self {
        let date = DateTime::<Utc>::from_timestamp(msg.date, 0).unwrap_or_else(|| {
            warn!(message_id = msg.id, date = msg.date, "message date out of range");
            DateTime::UNIX_EPOCH
        });
        let content = match msg.content {
            TdContent::Text { text } => MessageContent::Text(text.text),
            TdContent::Other => MessageContent::Other,
        };
        Self {
            id: msg.id,
            date,
            content,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// [`ChatHistory`] backed by a TDLib JSON gateway.
pub struct TdGateway {
    client: Client,
    endpoint: Url,
}

impl TdGateway {
    /// Build a gateway client for `endpoint`.
    pub fn new(endpoint: Url, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ChatlistError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, endpoint })
    }
}

impl ChatHistory for TdGateway {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn fetch_history(
        &self,
        conversation_id: i64,
        cursor: Cursor,
        limit: u32,
    ) -> Result<Vec<ChatMessage>> {
        let request = GetChatHistory {
            kind: "getChatHistory",
            chat_id: conversation_id,
            from_message_id: cursor.from_message_id(),
            offset: 0,
            limit,
            only_local: false,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| ChatlistError::Network(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatlistError::api(status.as_u16(), body));
        }

        let body: TdResponse = response
            .json()
            .await
            .map_err(|e| ChatlistError::parse(format!("getChatHistory response: {e}")))?;

        match body {
            TdResponse::Messages { messages } => {
                let page: Vec<ChatMessage> =
                    messages.into_iter().flatten().map(ChatMessage::from).collect();
                debug!(count = page.len(), "history page received");
                Ok(page)
            }
            TdResponse::Error { code, message } => Err(ChatlistError::api(
                u16::try_from(code).unwrap_or(500),
                message,
            )),
        }
    }
}
