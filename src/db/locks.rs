//! Lock record operations: conditional claim, resolve, index queries, reaping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::model::{IncidentKey, LockRecord};
use crate::store::{LockBackend, PutResult};

const SELECT_COLUMNS: &str = "SELECT incident_key, status, owner, claim_id, event_type, channel_id, user_id, claimed_at, expiration_time
     FROM incident_locks";

#[async_trait]
impl LockBackend for super::Db {
    async fn put_if_absent(&self, record: &LockRecord, now: DateTime<Utc>) -> Result<PutResult> {
        // The upsert only fires when the existing row has expired, so a live
        // claim makes the statement return no row. Both branches are decided
        // under the primary-key row lock.
        let inserted: Option<(String,)> = sqlx::query_as(
            "INSERT INTO incident_locks (incident_key, status, owner, claim_id, event_type, channel_id, user_id, claimed_at, expiration_time)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (incident_key) DO UPDATE SET
                status = EXCLUDED.status,
                owner = EXCLUDED.owner,
                claim_id = EXCLUDED.claim_id,
                event_type = EXCLUDED.event_type,
                channel_id = EXCLUDED.channel_id,
                user_id = EXCLUDED.user_id,
                claimed_at = EXCLUDED.claimed_at,
                expiration_time = EXCLUDED.expiration_time
             WHERE incident_locks.expiration_time <= $10
             RETURNING incident_key",
        )
        .bind(record.incident_key.as_str())
        .bind(record.status.to_string())
        .bind(&record.owner)
        .bind(record.claim_id)
        .bind(&record.event_type)
        .bind(record.channel_id.as_deref())
        .bind(record.user_id.as_deref())
        .bind(record.claimed_at)
        .bind(record.expiration_time)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        if inserted.is_some() {
            return Ok(PutResult::Created);
        }

        // Read the holder in a fresh statement: a row committed by a
        // concurrent claimer is invisible to the upsert's own snapshot.
        let holder = self.get(&record.incident_key, now).await?;
        Ok(PutResult::Exists(holder))
    }

    async fn get(&self, key: &IncidentKey, now: DateTime<Utc>) -> Result<Option<LockRecord>> {
        let row: Option<LockRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE incident_key = $1 AND expiration_time > $2"
        ))
        .bind(key.as_str())
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        row.map(LockRow::try_into_record).transpose()
    }

    async fn resolve(&self, key: &IncidentKey, now: DateTime<Utc>) -> Result<bool> {
        let rows_affected = sqlx::query(
            "UPDATE incident_locks SET status = 'resolved'
             WHERE incident_key = $1 AND status = 'claimed' AND expiration_time > $2",
        )
        .bind(key.as_str())
        .bind(now)
        .execute(self.pool())
        .await?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    async fn find_by_channel_user(
        &self,
        channel_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<LockRecord>> {
        let rows: Vec<LockRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS}
             WHERE channel_id = $1 AND user_id = $2 AND expiration_time > $3
             ORDER BY incident_key"
        ))
        .bind(channel_id)
        .bind(user_id)
        .bind(now)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(LockRow::try_into_record).collect()
    }

    async fn find_by_event_type(
        &self,
        event_type: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<LockRecord>> {
        let rows: Vec<LockRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS}
             WHERE event_type = $1 AND expiration_time > $2
             ORDER BY incident_key"
        ))
        .bind(event_type)
        .bind(now)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(LockRow::try_into_record).collect()
    }

    async fn reap_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let removed = sqlx::query("DELETE FROM incident_locks WHERE expiration_time <= $1")
            .bind(now)
            .execute(self.pool())
            .await?
            .rows_affected();
        Ok(removed)
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct LockRow {
    incident_key: String,
    status: String,
    owner: String,
    claim_id: Uuid,
    event_type: String,
    channel_id: Option<String>,
    user_id: Option<String>,
    claimed_at: DateTime<Utc>,
    expiration_time: DateTime<Utc>,
}

impl LockRow {
    fn try_into_record(self) -> Result<LockRecord> {
        Ok(LockRecord {
            incident_key: IncidentKey::new(self.incident_key)?,
            status: self.status.parse()?,
            owner: self.owner,
            claim_id: self.claim_id,
            event_type: self.event_type,
            channel_id: self.channel_id,
            user_id: self.user_id,
            claimed_at: self.claimed_at,
            expiration_time: self.expiration_time,
        })
    }
}
