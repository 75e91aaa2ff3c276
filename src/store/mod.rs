//! Durable lock store: cross-instance truth for who claimed what.
//!
//! A claim is an atomic create-if-absent of a [`LockRecord`] keyed by its
//! incident key, stamped with `expiration_time = claimed_at + dedup window`.
//! Expired records count as absent, so a recurring incident (or a crashed
//! claimer) never blocks forever. Nothing here deletes records; reaping is
//! the backend's own business.
//!
//! Every backend call goes through an explicit bounded retry loop with a
//! per-attempt timeout. Once the budget is spent the claim is reported as
//! [`ClaimResult::Unavailable`], never as "already claimed". All attempts of
//! one claim share a claim id, so an attempt that committed but timed out is
//! recognized as granted when a later attempt finds its record.

pub mod memory;
pub mod retry;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::model::{ClaimMetadata, IncidentKey, LockRecord};

pub use memory::MemoryBackend;
pub use retry::RetryPolicy;

/// Default time a claim blocks re-claims of the same key (6 hours).
pub const DEFAULT_DEDUP_WINDOW: std::time::Duration = std::time::Duration::from_secs(6 * 60 * 60);

/// Outcome of a conditional create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutResult {
    /// No live record existed; ours is now stored.
    Created,
    /// A live record already holds the key. Carries that record when the
    /// backend could read it back.
    Exists(Option<LockRecord>),
}

/// Outcome of [`LockStore::try_claim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimResult {
    /// This invocation now owns the claim.
    Granted(LockRecord),
    /// Another live claim holds the key. Routine, not an error.
    AlreadyClaimed,
    /// The store could not be reached within the retry budget.
    Unavailable { reason: String },
}

/// A keyed store offering atomic create-if-absent.
///
/// `now` is passed in rather than read by the backend so that liveness is
/// judged against the same clock that stamped the record.
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Store `record` iff no live record (expiration after `now`) shares its key.
    /// An expired record is replaced in the same atomic step.
    async fn put_if_absent(&self, record: &LockRecord, now: DateTime<Utc>) -> Result<PutResult>;

    /// Fetch the live record for `key`, if any.
    async fn get(&self, key: &IncidentKey, now: DateTime<Utc>) -> Result<Option<LockRecord>>;

    /// Transition a live CLAIMED record to RESOLVED. Returns whether a record changed.
    async fn resolve(&self, key: &IncidentKey, now: DateTime<Utc>) -> Result<bool>;

    /// Live records for a (channel, user) pair. Secondary index A.
    async fn find_by_channel_user(
        &self,
        channel_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<LockRecord>>;

    /// Live records of one event type, ordered by incident key. Secondary index B.
    async fn find_by_event_type(
        &self,
        event_type: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<LockRecord>>;

    /// Physically remove records expired at `now`. The claim path never calls this.
    async fn reap_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// The durable tier: TTL stamping and bounded retries over a [`LockBackend`].
#[derive(Clone)]
pub struct LockStore {
    backend: Arc<dyn LockBackend>,
    clock: Arc<dyn Clock>,
    dedup_window: chrono::Duration,
    retry: RetryPolicy,
}

impl std::fmt::Debug for LockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockStore")
            .field("dedup_window", &self.dedup_window)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl LockStore {
    pub fn new(
        backend: Arc<dyn LockBackend>,
        clock: Arc<dyn Clock>,
        dedup_window: std::time::Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let dedup_window = chrono::Duration::from_std(dedup_window)
            .map_err(|e| Error::Config(format!("dedup window out of range: {e}")))?;
        if dedup_window <= chrono::Duration::zero() {
            return Err(Error::Config("dedup window must be positive".into()));
        }
        Ok(Self {
            backend,
            clock,
            dedup_window,
            retry,
        })
    }

    pub fn dedup_window(&self) -> chrono::Duration {
        self.dedup_window
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Atomically claim `key` for `owner`.
    pub async fn try_claim(
        &self,
        key: &IncidentKey,
        metadata: &ClaimMetadata,
        owner: &str,
    ) -> ClaimResult {
        let claim_id = Uuid::new_v4();
        let result = self
            .retry
            .run("put_if_absent", || {
                let now = self.clock.now();
                let record =
                    LockRecord::claimed(key, metadata, owner, claim_id, now, self.dedup_window);
                async move {
                    let put = self.backend.put_if_absent(&record, now).await?;
                    Ok::<_, Error>((put, record))
                }
            })
            .await;

        match result {
            Ok((PutResult::Created, record)) => {
                debug!(key = %key, expires = %record.expiration_time, "claim granted");
                ClaimResult::Granted(record)
            }
            Ok((PutResult::Exists(Some(existing)), _)) if existing.claim_id == claim_id => {
                info!(key = %key, "earlier attempt committed the claim");
                ClaimResult::Granted(existing)
            }
            Ok((PutResult::Exists(_), _)) => {
                debug!(key = %key, "claim already held");
                ClaimResult::AlreadyClaimed
            }
            Err(e) => {
                warn!(key = %key, error = %e, "lock store unavailable");
                ClaimResult::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Read the live record for `key`.
    pub async fn get(&self, key: &IncidentKey) -> Result<Option<LockRecord>> {
        self.retry
            .run("get", || self.backend.get(key, self.clock.now()))
            .await
    }

    /// Mark the live claim on `key` RESOLVED.
    pub async fn resolve(&self, key: &IncidentKey) -> Result<bool> {
        self.retry
            .run("resolve", || self.backend.resolve(key, self.clock.now()))
            .await
    }

    /// Live claims targeting `user_id` in `channel_id`.
    pub async fn find_by_channel_user(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<Vec<LockRecord>> {
        self.retry
            .run("find_by_channel_user", || {
                self.backend
                    .find_by_channel_user(channel_id, user_id, self.clock.now())
            })
            .await
    }

    /// Live claims of one event type.
    pub async fn find_by_event_type(&self, event_type: &str) -> Result<Vec<LockRecord>> {
        self.retry
            .run("find_by_event_type", || {
                self.backend.find_by_event_type(event_type, self.clock.now())
            })
            .await
    }

    /// Ask the backend to drop expired records.
    pub async fn reap_expired(&self) -> Result<u64> {
        let removed = self
            .retry
            .run("reap_expired", || self.backend.reap_expired(self.clock.now()))
            .await?;
        info!(removed, "reaped expired claims");
        Ok(removed)
    }
}
