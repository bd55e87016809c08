// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduled message queue.
//!
//! Claims are leases: a claimed row keeps `status = 'queued'` but carries
//! `claimed_by` and `locked_until`, which hides it from every other claimer
//! until the lease runs out. A worker that dies mid-dispatch therefore only
//! delays the message, it never loses it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use concierge_core::ConciergeError;
use concierge_core::types::{ScheduledMessage, ScheduledStatus};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, unsupported};
use crate::models::{SCHEDULED_COLUMNS, scheduled_from_row, ts};

pub async fn insert_scheduled_message(
    db: &Database,
    scheduled: &ScheduledMessage,
) -> Result<(), ConciergeError> {
    if !db.capabilities().scheduling {
        return Err(unsupported("scheduled messages"));
    }
    let s = scheduled.clone();
    let payload = serde_json::to_string(&s.payload).map_err(|e| {
        ConciergeError::Validation(format!("scheduled payload is not valid JSON: {e}"))
    })?;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO scheduled_messages (id, thread_id, template_id, channel, run_at,
                     payload, status, last_error, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    s.id,
                    s.thread_id,
                    s.template_id,
                    s.channel.to_string(),
                    ts(&s.run_at),
                    payload,
                    s.status.to_string(),
                    s.last_error,
                    ts(&s.created_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_scheduled_message(
    db: &Database,
    id: &str,
) -> Result<Option<ScheduledMessage>, ConciergeError> {
    if !db.capabilities().scheduling {
        return Ok(None);
    }
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {SCHEDULED_COLUMNS} FROM scheduled_messages WHERE id = ?1");
            conn.query_row(&sql, params![id], scheduled_from_row)
                .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Claim up to `limit` queued rows due at `now` for `worker_id`, in `run_at`
/// order. One `UPDATE ... RETURNING` statement, so two workers never claim
/// the same row.
pub async fn claim_due_scheduled_messages(
    db: &Database,
    now: DateTime<Utc>,
    limit: usize,
    worker_id: &str,
    lease: Duration,
) -> Result<Vec<ScheduledMessage>, ConciergeError> {
    if !db.capabilities().scheduling {
        return Err(unsupported("scheduled messages"));
    }
    if limit == 0 {
        return Ok(Vec::new());
    }
    let lease = chrono::Duration::from_std(lease)
        .map_err(|e| ConciergeError::Validation(format!("invalid scheduler lease: {e}")))?;
    let now_ts = ts(&now);
    let locked_until = ts(&(now + lease));
    let worker_id = worker_id.to_string();
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);

    db.connection()
        .call(move |conn| {
            let sql = format!(
                "UPDATE scheduled_messages
                 SET claimed_by = ?1, locked_until = ?2, updated_at = ?3
                 WHERE id IN (
                     SELECT id FROM scheduled_messages
                     WHERE status = 'queued' AND run_at <= ?3
                       AND (locked_until IS NULL OR locked_until < ?3)
                     ORDER BY run_at ASC
                     LIMIT ?4
                 )
                 RETURNING {SCHEDULED_COLUMNS}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![worker_id, locked_until, now_ts, limit],
                scheduled_from_row,
            )?;
            let mut claimed = rows.collect::<Result<Vec<_>, _>>()?;
            claimed.sort_by(|a, b| a.run_at.cmp(&b.run_at).then_with(|| a.id.cmp(&b.id)));
            Ok(claimed)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Extend `worker_id`'s lease on `id` to `now + lease`.
///
/// Matches only while the row is still queued, claimed by `worker_id` and
/// its lease has not run out; `false` means the claim was lost and the row
/// must not be sent.
pub async fn renew_scheduled_lease(
    db: &Database,
    id: &str,
    worker_id: &str,
    now: DateTime<Utc>,
    lease: Duration,
) -> Result<bool, ConciergeError> {
    if !db.capabilities().scheduling {
        return Err(unsupported("scheduled messages"));
    }
    let lease = chrono::Duration::from_std(lease)
        .map_err(|e| ConciergeError::Validation(format!("invalid scheduler lease: {e}")))?;
    let now_ts = ts(&now);
    let locked_until = ts(&(now + lease));
    let id = id.to_string();
    let worker_id = worker_id.to_string();
    db.connection()
        .call(move |conn| {
            let updated = conn.execute(
                "UPDATE scheduled_messages
                 SET locked_until = ?1, updated_at = ?2
                 WHERE id = ?3 AND claimed_by = ?4 AND status = 'queued'
                   AND locked_until > ?2",
                params![locked_until, now_ts, id, worker_id],
            )?;
            Ok(updated == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record the outcome of a dispatch and release the lease.
///
/// Only the worker holding the claim may complete the row; `false` means
/// another worker took it over.
pub async fn complete_scheduled_message(
    db: &Database,
    id: &str,
    worker_id: &str,
    status: ScheduledStatus,
    last_error: Option<&str>,
) -> Result<bool, ConciergeError> {
    if !db.capabilities().scheduling {
        return Err(unsupported("scheduled messages"));
    }
    let id = id.to_string();
    let worker_id = worker_id.to_string();
    let last_error = last_error.map(str::to_string);
    db.connection()
        .call(move |conn| {
            let updated = conn.execute(
                "UPDATE scheduled_messages
                 SET status = ?1, last_error = ?2, locked_until = NULL, updated_at = ?3
                 WHERE id = ?4 AND claimed_by = ?5 AND status = 'queued'",
                params![status.to_string(), last_error, ts(&Utc::now()), id, worker_id],
            )?;
            Ok(updated == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
