//! In-process lock backend.
//!
//! Shared through an `Arc` it stands in for the durable store across many
//! simulated invocations. Fault injection covers the unavailability cases:
//! a full outage, a number of failing calls, added latency, and a write that
//! commits but is acknowledged late.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{LockBackend, PutResult};
use crate::error::{Error, Result};
use crate::model::{IncidentKey, LockRecord, LockStatus};

/// Thread-safe map of lock records with injectable failures.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: RwLock<HashMap<IncidentKey, LockRecord>>,
    unavailable: AtomicBool,
    fail_next: AtomicU32,
    latency_ms: AtomicU64,
    stalled_ack_ms: AtomicU64,
    calls: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail the next `n` calls, then recover.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Delay every call by `latency` before it touches the map.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Let the next `put_if_absent` commit, then hold its answer for `delay`.
    pub fn stall_next_ack(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.stalled_ack_ms.store(ms, Ordering::SeqCst);
    }

    /// Number of calls received, failed ones included.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Records currently stored, expired ones included.
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable("memory backend is offline".into()));
        }
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::StoreUnavailable("injected failure".into()));
        }
        Ok(())
    }

    fn live<'a>(
        records: &'a HashMap<IncidentKey, LockRecord>,
        now: DateTime<Utc>,
    ) -> impl Iterator<Item = &'a LockRecord> {
        records.values().filter(move |r| r.is_live(now))
    }
}

#[async_trait]
impl LockBackend for MemoryBackend {
    async fn put_if_absent(&self, record: &LockRecord, now: DateTime<Utc>) -> Result<PutResult> {
        self.enter().await?;
        let result = {
            let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
            match records
                .get(&record.incident_key)
                .filter(|existing| existing.is_live(now))
            {
                Some(existing) => PutResult::Exists(Some(existing.clone())),
                None => {
                    records.insert(record.incident_key.clone(), record.clone());
                    PutResult::Created
                }
            }
        };

        let stall = self.stalled_ack_ms.swap(0, Ordering::SeqCst);
        if stall > 0 {
            tokio::time::sleep(Duration::from_millis(stall)).await;
        }
        Ok(result)
    }

    async fn get(&self, key: &IncidentKey, now: DateTime<Utc>) -> Result<Option<LockRecord>> {
        self.enter().await?;
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(key).filter(|r| r.is_live(now)).cloned())
    }

    async fn resolve(&self, key: &IncidentKey, now: DateTime<Utc>) -> Result<bool> {
        self.enter().await?;
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        match records.get_mut(key) {
            Some(record) if record.is_live(now) && record.status == LockStatus::Claimed => {
                record.status = LockStatus::Resolved;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_by_channel_user(
        &self,
        channel_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<LockRecord>> {
        self.enter().await?;
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut found: Vec<LockRecord> = Self::live(&records, now)
            .filter(|r| {
                r.channel_id.as_deref() == Some(channel_id) && r.user_id.as_deref() == Some(user_id)
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.incident_key.cmp(&b.incident_key));
        Ok(found)
    }

    async fn find_by_event_type(
        &self,
        event_type: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<LockRecord>> {
        self.enter().await?;
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut found: Vec<LockRecord> = Self::live(&records, now)
            .filter(|r| r.event_type == event_type)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.incident_key.cmp(&b.incident_key));
        Ok(found)
    }

    async fn reap_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        self.enter().await?;
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let before = records.len();
        records.retain(|_, r| r.is_live(now));
        Ok((before - records.len()) as u64)
    }
}
