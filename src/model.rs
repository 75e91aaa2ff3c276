//! Core data model.
//!
//! An incident key names one deduplicatable unit of work (ticket + action).
//! A lock record is the durable proof that some invocation claimed it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Longest accepted incident key, in bytes.
pub const MAX_KEY_LEN: usize = 256;

/// Longest accepted event type, in bytes.
pub const MAX_EVENT_TYPE_LEN: usize = 64;

// ---------------------------------------------------------------------------
// Incident Key
// ---------------------------------------------------------------------------

/// Opaque identifier of one incident-worthy action.
///
/// Keys are per (ticket, action): `ISD-12345:create-channel` and
/// `ISD-12345:invite:U024BE7LH` are claimed independently, so a follow-up
/// action on a ticket is never suppressed by an earlier, different one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IncidentKey(String);

impl IncidentKey {
    /// Wrap an already-normalized key, validating its shape.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        validate_token("incident key", &raw, MAX_KEY_LEN)?;
        Ok(Self(raw))
    }

    /// Derive the canonical key for `action` on `ticket`.
    ///
    /// The ticket id is upper-cased and the action name lower-cased so that
    /// `isd-12345` / `Create-Channel` and `ISD-12345` / `create-channel`
    /// collapse to the same key. An argument after the action name
    /// (`invite:U024BE7LH`) keeps its case; chat ids are case-sensitive.
    pub fn for_action(ticket: &str, action: &str) -> Result<Self> {
        let ticket = ticket.trim();
        let action = action.trim();
        if ticket.is_empty() {
            return Err(Error::InvalidInput("ticket id is empty".into()));
        }
        if action.is_empty() {
            return Err(Error::InvalidInput("action tag is empty".into()));
        }
        let action = match action.split_once(':') {
            Some((name, arg)) => format!("{}:{arg}", name.to_ascii_lowercase()),
            None => action.to_ascii_lowercase(),
        };
        Self::new(format!("{}:{action}", ticket.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IncidentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parses typed-in keys, canonicalizing `isd-12345:Create-Channel` to
/// `ISD-12345:create-channel`.
impl std::str::FromStr for IncidentKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().split_once(':') {
            Some((ticket, action)) => Self::for_action(ticket, action),
            None => Self::new(s),
        }
    }
}

impl TryFrom<String> for IncidentKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<IncidentKey> for String {
    fn from(key: IncidentKey) -> Self {
        key.0
    }
}

fn validate_token(what: &str, value: &str, max_len: usize) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidInput(format!("{what} is empty")));
    }
    if value.len() > max_len {
        return Err(Error::InvalidInput(format!(
            "{what} is {} bytes, limit is {max_len}",
            value.len()
        )));
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::InvalidInput(format!(
            "{what} {value:?} contains whitespace or control characters"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Claim Metadata
// ---------------------------------------------------------------------------

/// What the caller is about to do, recorded alongside a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimMetadata {
    /// Action type, e.g. "create-channel", "invite". Secondary index B.
    pub event_type: String,
    /// Chat channel the action targets. Secondary index A (with `user_id`).
    pub channel_id: Option<String>,
    /// Chat user the action targets.
    pub user_id: Option<String>,
}

impl ClaimMetadata {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            channel_id: None,
            user_id: None,
        }
    }

    pub fn channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Reject metadata that must never reach the store.
    pub fn validate(&self) -> Result<()> {
        validate_token("event type", &self.event_type, MAX_EVENT_TYPE_LEN)?;
        if let Some(ref channel) = self.channel_id {
            validate_token("channel id", channel, MAX_KEY_LEN)?;
        }
        if let Some(ref user) = self.user_id {
            validate_token("user id", user, MAX_KEY_LEN)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Lock Record
// ---------------------------------------------------------------------------

/// Status of a durable claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    /// Held by the invocation that created it.
    Claimed,
    /// The incident's lifecycle finished (e.g. resolve command).
    Resolved,
}

impl std::fmt::Display for LockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LockStatus::Claimed => "claimed",
            LockStatus::Resolved => "resolved",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for LockStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "claimed" => Ok(LockStatus::Claimed),
            "resolved" => Ok(LockStatus::Resolved),
            other => Err(Error::Other(format!("unknown lock status: {other}"))),
        }
    }
}

/// The durable record of a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub incident_key: IncidentKey,
    pub status: LockStatus,
    /// Invocation id of the claimer.
    pub owner: String,
    /// Identifies one `try_claim` call; shared by all of its attempts.
    pub claim_id: Uuid,
    pub event_type: String,
    pub channel_id: Option<String>,
    pub user_id: Option<String>,
    pub claimed_at: DateTime<Utc>,
    /// After this instant the record no longer blocks a fresh claim.
    pub expiration_time: DateTime<Utc>,
}

impl LockRecord {
    /// Build a fresh CLAIMED record expiring `window` after `now`.
    pub fn claimed(
        key: &IncidentKey,
        metadata: &ClaimMetadata,
        owner: &str,
        claim_id: Uuid,
        now: DateTime<Utc>,
        window: chrono::Duration,
    ) -> Self {
        Self {
            incident_key: key.clone(),
            status: LockStatus::Claimed,
            owner: owner.to_string(),
            claim_id,
            event_type: metadata.event_type.clone(),
            channel_id: metadata.channel_id.clone(),
            user_id: metadata.user_id.clone(),
            claimed_at: now,
            expiration_time: now + window,
        }
    }

    /// Whether the record still blocks claims at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expiration_time
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// What a caller should do with an incident action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// This invocation owns the claim.
    Proceed,
    /// Someone (this process or another) already handled it.
    Skip,
    /// The store was unreachable; proceeding on local knowledge only.
    ProceedDegraded,
}

impl Decision {
    pub fn should_proceed(self) -> bool {
        matches!(self, Decision::Proceed | Decision::ProceedDegraded)
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Decision::Proceed => "proceed",
            Decision::Skip => "skip",
            Decision::ProceedDegraded => "proceed_degraded",
        };
        write!(f, "{s}")
    }
}
