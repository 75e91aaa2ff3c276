//! Incident key derivation from chat content.
//!
//! A chat message mentions a ticket (`ISD-12345`); each thing we might do
//! about that ticket is an [`Action`], and the pair becomes an
//! [`IncidentKey`].

use std::str::FromStr;

use regex::Regex;

use crate::error::{Error, Result};
use crate::event::ChatMessage;
use crate::model::{ClaimMetadata, IncidentKey};

/// Ticket references in the service desk project.
pub const DEFAULT_TICKET_PATTERN: &str = r"ISD-\d{5}";

/// Something a caller does about a ticket. Each is deduplicated on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    CreateChannel,
    Invite { user_id: String },
    Resolve,
    /// Any other caller-defined action tag.
    Other(String),
}

/// Parses a tag as produced by [`Action::tag`]. Unknown names become
/// [`Action::Other`].
impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (name, arg) = match s.split_once(':') {
            Some((name, arg)) => (name.to_ascii_lowercase(), Some(arg)),
            None => (s.to_ascii_lowercase(), None),
        };

        match (name.as_str(), arg) {
            ("", _) => Err(Error::InvalidInput("action tag is empty".into())),
            ("create-channel", None) => Ok(Action::CreateChannel),
            ("resolve", None) => Ok(Action::Resolve),
            ("invite", Some(user_id)) if !user_id.is_empty() => Ok(Action::Invite {
                user_id: user_id.to_string(),
            }),
            ("invite", _) => Err(Error::InvalidInput(
                "invite needs a user id, e.g. invite:U024BE7LH".into(),
            )),
            (_, Some(arg)) => Ok(Action::Other(format!("{name}:{arg}"))),
            (_, None) => Ok(Action::Other(name.clone())),
        }
    }
}

impl Action {
    /// Tag appended to the ticket id to form the key.
    pub fn tag(&self) -> String {
        match self {
            Action::CreateChannel => "create-channel".to_string(),
            Action::Invite { user_id } => format!("invite:{user_id}"),
            Action::Resolve => "resolve".to_string(),
            Action::Other(tag) => tag.clone(),
        }
    }

    /// Event type recorded on the claim (secondary index B).
    pub fn event_type(&self) -> &str {
        match self {
            Action::CreateChannel => "create-channel",
            Action::Invite { .. } => "invite",
            Action::Resolve => "resolve",
            Action::Other(tag) => tag.split(':').next().unwrap_or(tag),
        }
    }

    /// Claim metadata for this action, targeting `channel_id` if known.
    pub fn metadata(&self, channel_id: Option<&str>) -> ClaimMetadata {
        let mut metadata = ClaimMetadata::new(self.event_type());
        metadata.channel_id = channel_id.map(str::to_string);
        if let Action::Invite { user_id } = self {
            metadata.user_id = Some(user_id.clone());
        }
        metadata
    }
}

/// Finds ticket references in free text.
#[derive(Debug, Clone)]
pub struct TicketMatcher {
    pattern: Regex,
}

impl TicketMatcher {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| Error::Config(format!("invalid ticket pattern: {e}")))?;
        Ok(Self { pattern })
    }

    /// First ticket id mentioned in `text`, upper-cased.
    pub fn find(&self, text: &str) -> Option<String> {
        self.pattern
            .find(text)
            .map(|m| m.as_str().to_ascii_uppercase())
    }

    /// Key for `action` on the ticket mentioned in `text`, if any.
    pub fn key_for(&self, text: &str, action: &Action) -> Result<Option<IncidentKey>> {
        self.find(text)
            .map(|ticket| IncidentKey::for_action(&ticket, &action.tag()))
            .transpose()
    }

    /// The claims a ticket mention in `message` calls for: the incident
    /// channel, then inviting the author.
    ///
    /// `incident_channel` is the channel these actions target, when the
    /// caller knows it. The channel the ticket was mentioned in is not an
    /// invite target and is never recorded.
    pub fn plan(
        &self,
        message: &ChatMessage,
        incident_channel: Option<&str>,
    ) -> Result<Vec<(IncidentKey, ClaimMetadata)>> {
        let Some(ticket) = message.text.as_deref().and_then(|t| self.find(t)) else {
            return Ok(Vec::new());
        };

        let mut actions = vec![Action::CreateChannel];
        if let Some(ref user_id) = message.user {
            actions.push(Action::Invite {
                user_id: user_id.clone(),
            });
        }

        actions
            .iter()
            .map(|action| {
                let key = IncidentKey::for_action(&ticket, &action.tag())?;
                Ok((key, action.metadata(incident_channel)))
            })
            .collect()
    }
}
