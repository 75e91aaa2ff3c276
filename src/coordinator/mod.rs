//! Claim coordination: the one question callers ask before acting.
//!
//! `claim_once` consults the local cache, then the durable store, and falls
//! back to the degradation policy when the store is unreachable. The cache
//! only ever short-circuits to `Skip`; a `Proceed` always comes from a
//! successful conditional write.

pub mod degradation;

use std::sync::Arc;

use opentelemetry::KeyValue;
use tracing::{Instrument, info, warn};
use uuid::Uuid;

use crate::cache::LocalCache;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{ClaimMetadata, Decision, IncidentKey, LockRecord, LockStatus};
use crate::store::{ClaimResult, LockBackend, LockStore};
use crate::telemetry::claim::{record_decision, start_claim_span};
use crate::telemetry::metrics;

pub use degradation::DegradationPolicy;

/// Per-invocation coordinator.
///
/// Construct one when the invocation starts and drop it at teardown; the
/// local cache lives and dies with it. Share across tasks with `Arc`.
#[derive(Debug)]
pub struct Coordinator {
    invocation_id: String,
    cache: LocalCache,
    store: LockStore,
    policy: DegradationPolicy,
}

impl Coordinator {
    pub fn new(store: LockStore, cache: LocalCache, policy: DegradationPolicy) -> Self {
        Self {
            invocation_id: Uuid::new_v4().to_string(),
            cache,
            store,
            policy,
        }
    }

    /// Wire a coordinator from configuration over the given backend.
    pub fn from_config(config: &Config, backend: Arc<dyn LockBackend>) -> Result<Self> {
        Self::from_config_with_clock(config, backend, Arc::new(SystemClock))
    }

    pub fn from_config_with_clock(
        config: &Config,
        backend: Arc<dyn LockBackend>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let cache = LocalCache::with_clock(config.cache_capacity, clock.clone());
        let store = LockStore::new(backend, clock, config.dedup_window, config.retry)?;
        Ok(Self::new(store, cache, config.degraded_mode))
    }

    /// Identifier recorded as `owner` on claims made by this coordinator.
    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub fn policy(&self) -> DegradationPolicy {
        self.policy
    }

    /// Decide whether the caller should perform the action named by `key`.
    ///
    /// Only malformed metadata produces an error, and it does so before any
    /// store call. Contention and store outages are answered with a
    /// [`Decision`].
    pub async fn claim_once(&self, key: &IncidentKey, metadata: &ClaimMetadata) -> Result<Decision> {
        metadata.validate()?;

        let span = start_claim_span(key, &metadata.event_type, &self.invocation_id);
        let (tier, decision) = self
            .decide(key, metadata)
            .instrument(span.clone())
            .await;
        record_decision(&span, tier, decision);

        metrics::claims().add(
            1,
            &[
                KeyValue::new("event_type", metadata.event_type.clone()),
                KeyValue::new("decision", decision.to_string()),
            ],
        );
        Ok(decision)
    }

    async fn decide(&self, key: &IncidentKey, metadata: &ClaimMetadata) -> (&'static str, Decision) {
        if self.cache.seen(key) {
            return ("cache", Decision::Skip);
        }

        match self
            .store
            .try_claim(key, metadata, &self.invocation_id)
            .await
        {
            ClaimResult::Granted(_) => {
                self.cache.mark(key);
                ("store", Decision::Proceed)
            }
            ClaimResult::AlreadyClaimed => {
                self.cache.mark(key);
                ("store", Decision::Skip)
            }
            ClaimResult::Unavailable { reason } => {
                let decision = self.policy.on_store_unavailable(key, &self.cache);
                warn!(
                    key = %key,
                    policy = %self.policy,
                    decision = %decision,
                    reason,
                    "lock store unavailable, degraded decision"
                );
                metrics::degraded().add(1, &[KeyValue::new("decision", decision.to_string())]);
                ("degraded", decision)
            }
        }
    }

    /// Mark the live claim on `key` RESOLVED. Returns `false` if there is no
    /// live CLAIMED record to transition.
    pub async fn resolve(&self, key: &IncidentKey) -> Result<bool> {
        let changed = self.store.resolve(key).await.map_err(unavailable)?;
        info!(key = %key, changed, "resolve");
        Ok(changed)
    }

    /// Has `user_id` already been invited to `channel_id` within the dedup window?
    pub async fn already_invited(&self, channel_id: &str, user_id: &str) -> Result<bool> {
        if channel_id.is_empty() || user_id.is_empty() {
            return Err(Error::InvalidInput(
                "channel id and user id are required".into(),
            ));
        }
        let records = self
            .store
            .find_by_channel_user(channel_id, user_id)
            .await
            .map_err(unavailable)?;
        Ok(!records.is_empty())
    }

    /// Live claims of one action type, ordered by key.
    pub async fn claims_for_event_type(&self, event_type: &str) -> Result<Vec<LockRecord>> {
        ClaimMetadata::new(event_type).validate()?;
        self.store
            .find_by_event_type(event_type)
            .await
            .map_err(unavailable)
    }

    /// The live record for `key`, if one exists.
    pub async fn lookup(&self, key: &IncidentKey) -> Result<Option<LockRecord>> {
        self.store.get(key).await.map_err(unavailable)
    }

    /// Whether `key` has a live record in RESOLVED state.
    pub async fn is_resolved(&self, key: &IncidentKey) -> Result<bool> {
        Ok(self
            .lookup(key)
            .await?
            .is_some_and(|r| r.status == LockStatus::Resolved))
    }
}

/// Store failures on the read side surface as one error kind, whatever the
/// backend reported.
fn unavailable(e: Error) -> Error {
    match e {
        Error::InvalidInput(_) | Error::StoreUnavailable(_) => e,
        other => Error::StoreUnavailable(other.to_string()),
    }
}
