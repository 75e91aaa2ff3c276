//! Inbound chat event envelopes.
//!
//! The chat platform posts a JSON body that is either a one-off URL
//! verification handshake or an event callback wrapping a message. Only the
//! fields needed to derive incident keys are modeled.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Top-level body of an inbound event request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEnvelope {
    /// Endpoint handshake; answer with `challenge`.
    UrlVerification { challenge: String },
    /// A delivered event. Retries of one delivery share `event_id`.
    EventCallback {
        #[serde(default)]
        event_id: Option<String>,
        event: ChatMessage,
    },
    /// Anything else the platform may send.
    #[serde(other)]
    Unsupported,
}

/// The message inside an event callback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
}

impl ChatEnvelope {
    /// Parse a raw request body.
    pub fn from_json(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }
}
